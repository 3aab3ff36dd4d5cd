pub mod net;
pub mod pipeline;
pub mod scene;
pub mod snapshot;

pub use net::{
    bits_required, sequence_greater_than, AckPacket, Address, CompressionMode, DecodeError,
    NetworkSimulator, Packet, SequenceBuffer, SimulatorState, SlidingWindow, SnapshotContext,
    SnapshotPacket, Stream, StreamError, StreamMode, TimeBase, LEFT_PORT, MAX_SNAPSHOTS,
    NUM_COMPRESSION_MODES, RIGHT_PORT,
};
pub use pipeline::{mode_data_for, SnapshotPipeline};
pub use scene::CubeScene;
pub use snapshot::{
    CubeState, InterpolationMode, ObjectUpdate, PlayoutBuffer, QuantizedCubeState, QuantizedQuat,
    QuantizedSnapshot, Snapshot, SnapshotModeData, NUM_CUBES, PLAYOUT_BUFFER_SIZE, UNITS_PER_METER,
};
