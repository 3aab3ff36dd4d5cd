mod packet;
mod simulator;
mod stream;
mod window;

pub use packet::{
    AckPacket, CompressionMode, DecodeError, Packet, SnapshotContext, SnapshotPacket,
    NUM_COMPRESSION_MODES, NUM_PACKET_TYPES, PACKET_ACK, PACKET_SNAPSHOT,
};
pub use simulator::{
    rand_percent, Address, NetworkSimulator, SimulatorState, TimeBase, LEFT_PORT, RIGHT_PORT,
};
pub use stream::{bits_required, Stream, StreamError, StreamMode};
pub use window::{sequence_greater_than, SequenceBuffer, SlidingWindow, MAX_SNAPSHOTS};
