use glam::Vec3;

use super::stream::{Stream, StreamError};
use super::window::{SequenceBuffer, SlidingWindow};
use crate::snapshot::{
    CubeState, QuantizedCubeState, QuantizedSnapshot, Snapshot, NUM_CUBES,
    QUANTIZED_POSITION_BOUND_XY, QUANTIZED_POSITION_BOUND_Z, QUATERNION_BITS,
};

pub const PACKET_SNAPSHOT: i32 = 0;
pub const PACKET_ACK: i32 = 1;
pub const NUM_PACKET_TYPES: i32 = 2;

const RELATIVE_POSITION_BOUND_SMALL: i32 = 63;
const RELATIVE_POSITION_BOUND_MEDIUM: i32 = 511;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(i32)]
pub enum CompressionMode {
    Uncompressed = 0,
    Orientation = 1,
    AtRest = 2,
    QuantizePosition = 3,
    DeltaNotChanged = 4,
    DeltaRelativePosition = 5,
    // reserved: same body as DeltaRelativePosition
    DeltaRelativeOrientation = 6,
    // reserved: same body as DeltaRelativePosition
    DeltaChangedIndices = 7,
}

pub const NUM_COMPRESSION_MODES: i32 = 8;

impl CompressionMode {
    pub const ALL: [CompressionMode; 8] = [
        CompressionMode::Uncompressed,
        CompressionMode::Orientation,
        CompressionMode::AtRest,
        CompressionMode::QuantizePosition,
        CompressionMode::DeltaNotChanged,
        CompressionMode::DeltaRelativePosition,
        CompressionMode::DeltaRelativeOrientation,
        CompressionMode::DeltaChangedIndices,
    ];

    pub fn from_index(index: i32) -> Option<Self> {
        match index {
            0 => Some(CompressionMode::Uncompressed),
            1 => Some(CompressionMode::Orientation),
            2 => Some(CompressionMode::AtRest),
            3 => Some(CompressionMode::QuantizePosition),
            4 => Some(CompressionMode::DeltaNotChanged),
            5 => Some(CompressionMode::DeltaRelativePosition),
            6 => Some(CompressionMode::DeltaRelativeOrientation),
            7 => Some(CompressionMode::DeltaChangedIndices),
            _ => None,
        }
    }

    pub fn index(self) -> i32 {
        self as i32
    }

    pub fn description(self) -> &'static str {
        match self {
            CompressionMode::Uncompressed => "Uncompressed",
            CompressionMode::Orientation => "Orientation",
            CompressionMode::AtRest => "At rest",
            CompressionMode::QuantizePosition => "Quantize position",
            CompressionMode::DeltaNotChanged => "Delta not changed",
            CompressionMode::DeltaRelativePosition => "Delta relative position",
            CompressionMode::DeltaRelativeOrientation => "Delta relative orientation",
            CompressionMode::DeltaChangedIndices => "Delta changed indices",
        }
    }

    /// Modes from QuantizePosition up run on quantized snapshots; the three
    /// below it serialize raw cube states.
    pub fn is_quantized(self) -> bool {
        self >= CompressionMode::QuantizePosition
    }

    pub fn is_delta(self) -> bool {
        self >= CompressionMode::DeltaNotChanged
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error("no baseline snapshot for base sequence {base_sequence}")]
    MissingBaseline { base_sequence: u16 },
    #[error("invalid packet type tag {0}")]
    InvalidPacketType(i32),
    #[error("invalid compression mode {0}")]
    InvalidMode(i32),
}

/// The buffers a snapshot packet schema reaches through while serializing.
///
/// The two arms are the redesigned version of the original's opaque stream
/// context array: the sender only ever reads its sliding windows, the
/// receiver inserts into its sequence buffers, and the borrow checker makes
/// the two target-slot paths impossible to mix up.
pub enum SnapshotContext<'a> {
    Sender {
        snapshots: &'a SlidingWindow<Snapshot>,
        quantized: &'a SlidingWindow<QuantizedSnapshot>,
        initial: &'a QuantizedSnapshot,
    },
    Receiver {
        snapshots: &'a mut SequenceBuffer<Snapshot>,
        quantized: &'a mut SequenceBuffer<QuantizedSnapshot>,
        initial: &'a QuantizedSnapshot,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotPacket {
    pub sequence: u16,
    pub base_sequence: u16,
    pub initial: bool,
    pub mode: CompressionMode,
}

impl Default for SnapshotPacket {
    fn default() -> Self {
        Self {
            sequence: 0,
            base_sequence: 0,
            initial: false,
            mode: CompressionMode::Uncompressed,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AckPacket {
    pub ack: u16,
}

impl AckPacket {
    pub fn serialize(&mut self, stream: &mut Stream) -> Result<(), StreamError> {
        stream.serialize_u16(&mut self.ack)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Packet {
    Snapshot(SnapshotPacket),
    Ack(AckPacket),
}

impl Packet {
    pub fn type_tag(&self) -> i32 {
        match self {
            Packet::Snapshot(_) => PACKET_SNAPSHOT,
            Packet::Ack(_) => PACKET_ACK,
        }
    }

    pub fn encode(&self, context: &mut SnapshotContext) -> Result<Vec<u8>, DecodeError> {
        debug_assert!(matches!(context, SnapshotContext::Sender { .. }));
        let mut stream = Stream::writer();
        let mut tag = self.type_tag();
        stream.serialize_int(&mut tag, 0, NUM_PACKET_TYPES - 1)?;
        match self {
            Packet::Snapshot(packet) => {
                let mut packet = *packet;
                packet.serialize(&mut stream, context)?;
            }
            Packet::Ack(packet) => {
                let mut packet = *packet;
                packet.serialize(&mut stream)?;
            }
        }
        Ok(stream.into_bytes())
    }

    /// Decodes a packet, writing any carried snapshot into the receiver-side
    /// sequence buffer reached through `context`.
    pub fn decode(bytes: &[u8], context: &mut SnapshotContext) -> Result<Packet, DecodeError> {
        debug_assert!(matches!(context, SnapshotContext::Receiver { .. }));
        let mut stream = Stream::reader(bytes);
        let mut tag = 0i32;
        stream.serialize_int(&mut tag, 0, NUM_PACKET_TYPES - 1)?;
        match tag {
            PACKET_SNAPSHOT => {
                let mut packet = SnapshotPacket::default();
                packet.serialize(&mut stream, context)?;
                Ok(Packet::Snapshot(packet))
            }
            PACKET_ACK => {
                let mut packet = AckPacket::default();
                packet.serialize(&mut stream)?;
                Ok(Packet::Ack(packet))
            }
            _ => Err(DecodeError::InvalidPacketType(tag)),
        }
    }
}

impl SnapshotPacket {
    /// One schema, both directions. Target cubes come from the sender's
    /// sliding window when writing and from a freshly inserted receiver slot
    /// when reading; delta baselines come from the sliding window when
    /// writing and must already exist in the receiver's sequence buffer when
    /// reading.
    pub fn serialize(
        &mut self,
        stream: &mut Stream,
        context: &mut SnapshotContext,
    ) -> Result<(), DecodeError> {
        stream.serialize_u16(&mut self.sequence)?;

        let mut mode_index = self.mode.index();
        stream.serialize_int(&mut mode_index, 0, NUM_COMPRESSION_MODES - 1)?;
        if stream.is_reading() {
            self.mode = CompressionMode::from_index(mode_index)
                .ok_or(DecodeError::InvalidMode(mode_index))?;
        }

        stream.serialize_bool(&mut self.initial)?;
        if !self.initial {
            stream.serialize_u16(&mut self.base_sequence)?;
        }

        if !self.mode.is_quantized() {
            match context {
                SnapshotContext::Sender { snapshots, .. } => {
                    let mut cubes = snapshots.get(self.sequence).cubes.clone();
                    self.serialize_raw_cubes(stream, &mut cubes)?;
                }
                SnapshotContext::Receiver { snapshots, .. } => {
                    let entry = snapshots.insert(self.sequence);
                    debug_assert_eq!(entry.cubes.len(), NUM_CUBES);
                    self.serialize_raw_cubes(stream, &mut entry.cubes)?;
                }
            }
        } else {
            match context {
                SnapshotContext::Sender {
                    quantized, initial, ..
                } => {
                    let mut cubes = quantized.get(self.sequence).cubes.clone();
                    let base = if !self.mode.is_delta() {
                        None
                    } else if self.initial {
                        Some(initial.cubes.as_slice())
                    } else {
                        Some(quantized.get(self.base_sequence).cubes.as_slice())
                    };
                    self.serialize_quantized_cubes(stream, &mut cubes, base)?;
                }
                SnapshotContext::Receiver {
                    quantized, initial, ..
                } => {
                    // clone the baseline out before claiming the target slot:
                    // both may live in the same ring
                    let base = if !self.mode.is_delta() {
                        None
                    } else if self.initial {
                        Some(initial.cubes.clone())
                    } else {
                        let found = quantized.find(self.base_sequence).ok_or(
                            DecodeError::MissingBaseline {
                                base_sequence: self.base_sequence,
                            },
                        )?;
                        Some(found.cubes.clone())
                    };
                    let entry = quantized.insert(self.sequence);
                    debug_assert_eq!(entry.cubes.len(), NUM_CUBES);
                    self.serialize_quantized_cubes(stream, &mut entry.cubes, base.as_deref())?;
                }
            }
        }
        Ok(())
    }

    fn serialize_raw_cubes(
        &self,
        stream: &mut Stream,
        cubes: &mut [CubeState],
    ) -> Result<(), StreamError> {
        match self.mode {
            CompressionMode::Uncompressed => {
                for cube in cubes {
                    stream.serialize_bool(&mut cube.interacting)?;
                    stream.serialize_vector(&mut cube.position)?;
                    stream.serialize_quaternion(&mut cube.orientation)?;
                    stream.serialize_vector(&mut cube.linear_velocity)?;
                }
            }
            CompressionMode::Orientation => {
                for cube in cubes {
                    stream.serialize_bool(&mut cube.interacting)?;
                    stream.serialize_vector(&mut cube.position)?;
                    stream.serialize_compressed_quaternion(&mut cube.orientation, QUATERNION_BITS)?;
                    stream.serialize_vector(&mut cube.linear_velocity)?;
                }
            }
            CompressionMode::AtRest => {
                for cube in cubes {
                    stream.serialize_bool(&mut cube.interacting)?;
                    stream.serialize_vector(&mut cube.position)?;
                    stream.serialize_compressed_quaternion(&mut cube.orientation, QUATERNION_BITS)?;

                    let mut at_rest = false;
                    if stream.is_writing() {
                        at_rest = cube.at_rest();
                    }
                    stream.serialize_bool(&mut at_rest)?;
                    if !at_rest {
                        stream.serialize_vector(&mut cube.linear_velocity)?;
                    } else if stream.is_reading() {
                        cube.linear_velocity = Vec3::ZERO;
                    }
                }
            }
            _ => unreachable!("quantized mode in raw cube path"),
        }
        Ok(())
    }

    fn serialize_quantized_cubes(
        &self,
        stream: &mut Stream,
        cubes: &mut [QuantizedCubeState],
        base: Option<&[QuantizedCubeState]>,
    ) -> Result<(), StreamError> {
        match self.mode {
            CompressionMode::QuantizePosition => serialize_absolute_cubes(stream, cubes),
            CompressionMode::DeltaNotChanged => {
                serialize_delta_not_changed(stream, cubes, base.expect("delta mode needs baseline"))
            }
            CompressionMode::DeltaRelativePosition
            | CompressionMode::DeltaRelativeOrientation
            | CompressionMode::DeltaChangedIndices => serialize_delta_relative_position(
                stream,
                cubes,
                base.expect("delta mode needs baseline"),
            ),
            _ => unreachable!("raw mode in quantized cube path"),
        }
    }
}

fn serialize_quantized_position(
    stream: &mut Stream,
    cube: &mut QuantizedCubeState,
) -> Result<(), StreamError> {
    stream.serialize_int(
        &mut cube.position_x,
        -QUANTIZED_POSITION_BOUND_XY,
        QUANTIZED_POSITION_BOUND_XY,
    )?;
    stream.serialize_int(
        &mut cube.position_y,
        -QUANTIZED_POSITION_BOUND_XY,
        QUANTIZED_POSITION_BOUND_XY,
    )?;
    stream.serialize_int(&mut cube.position_z, 0, QUANTIZED_POSITION_BOUND_Z)?;
    Ok(())
}

fn serialize_absolute_cubes(
    stream: &mut Stream,
    cubes: &mut [QuantizedCubeState],
) -> Result<(), StreamError> {
    for cube in cubes {
        stream.serialize_bool(&mut cube.interacting)?;
        serialize_quantized_position(stream, cube)?;
        cube.orientation.serialize(stream)?;
    }
    Ok(())
}

fn serialize_delta_not_changed(
    stream: &mut Stream,
    cubes: &mut [QuantizedCubeState],
    base: &[QuantizedCubeState],
) -> Result<(), StreamError> {
    for i in 0..cubes.len() {
        let mut changed = false;
        if stream.is_writing() {
            changed = cubes[i] != base[i];
        }
        stream.serialize_bool(&mut changed)?;

        if changed {
            stream.serialize_bool(&mut cubes[i].interacting)?;
            serialize_quantized_position(stream, &mut cubes[i])?;
            cubes[i].orientation.serialize(stream)?;
        } else if stream.is_reading() {
            cubes[i] = base[i];
        }
    }
    Ok(())
}

fn serialize_delta_relative_position(
    stream: &mut Stream,
    cubes: &mut [QuantizedCubeState],
    base: &[QuantizedCubeState],
) -> Result<(), StreamError> {
    for i in 0..cubes.len() {
        let mut changed = false;
        if stream.is_writing() {
            changed = cubes[i] != base[i];
        }
        stream.serialize_bool(&mut changed)?;

        if changed {
            stream.serialize_bool(&mut cubes[i].interacting)?;

            let mut small_delta = false;
            let mut medium_delta = false;

            if stream.is_writing() {
                let dx = cubes[i].position_x - base[i].position_x;
                let dy = cubes[i].position_y - base[i].position_y;
                let dz = cubes[i].position_z - base[i].position_z;

                small_delta = dx.abs() <= RELATIVE_POSITION_BOUND_SMALL
                    && dy.abs() <= RELATIVE_POSITION_BOUND_SMALL
                    && dz.abs() <= RELATIVE_POSITION_BOUND_SMALL;

                medium_delta = dx.abs() <= RELATIVE_POSITION_BOUND_MEDIUM
                    && dy.abs() <= RELATIVE_POSITION_BOUND_MEDIUM
                    && dz.abs() <= RELATIVE_POSITION_BOUND_MEDIUM;
            }

            stream.serialize_bool(&mut small_delta)?;

            if small_delta {
                serialize_position_offsets(stream, &mut cubes[i], &base[i], RELATIVE_POSITION_BOUND_SMALL)?;
            } else {
                stream.serialize_bool(&mut medium_delta)?;

                if medium_delta {
                    serialize_position_offsets(
                        stream,
                        &mut cubes[i],
                        &base[i],
                        RELATIVE_POSITION_BOUND_MEDIUM,
                    )?;
                } else {
                    serialize_quantized_position(stream, &mut cubes[i])?;

                    if stream.is_reading() {
                        cubes[i].interacting = false;
                    }
                }
            }

            cubes[i].orientation.serialize(stream)?;
        } else if stream.is_reading() {
            cubes[i] = base[i];
        }
    }
    Ok(())
}

fn serialize_position_offsets(
    stream: &mut Stream,
    cube: &mut QuantizedCubeState,
    base: &QuantizedCubeState,
    bound: i32,
) -> Result<(), StreamError> {
    let mut offset_x = 0;
    let mut offset_y = 0;
    let mut offset_z = 0;

    if stream.is_writing() {
        offset_x = cube.position_x - base.position_x;
        offset_y = cube.position_y - base.position_y;
        offset_z = cube.position_z - base.position_z;
    }

    stream.serialize_int(&mut offset_x, -bound, bound)?;
    stream.serialize_int(&mut offset_y, -bound, bound)?;
    stream.serialize_int(&mut offset_z, -bound, bound)?;

    cube.position_x = base.position_x + offset_x;
    cube.position_y = base.position_y + offset_y;
    cube.position_z = base.position_z + offset_z;
    Ok(())
}
