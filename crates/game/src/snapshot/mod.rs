mod playout;
mod state;

pub use playout::{
    hermite_interpolate, InterpolationMode, ObjectUpdate, PlayoutBuffer, SnapshotModeData,
    PLAYOUT_BUFFER_SIZE,
};
pub use state::{
    CubeState, QuantizedCubeState, QuantizedQuat, QuantizedSnapshot, Snapshot, AT_REST_EPSILON,
    NUM_CUBES, POSITION_BOUND_XY, POSITION_BOUND_Z, QUANTIZED_POSITION_BOUND_XY,
    QUANTIZED_POSITION_BOUND_Z, QUATERNION_BITS, UNITS_PER_METER,
};
