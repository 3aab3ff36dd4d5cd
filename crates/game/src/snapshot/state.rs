use glam::{Quat, Vec3};

use crate::net::{Stream, StreamError};

/// Number of rigid bodies in a snapshot.
pub const NUM_CUBES: usize = 900;

/// Fixed-point resolution of quantized positions.
pub const UNITS_PER_METER: i32 = 512;

/// Playable volume, in meters: x and y in [-64, +64], z in [0, 32].
pub const POSITION_BOUND_XY: i32 = 64;
pub const POSITION_BOUND_Z: i32 = 32;

pub const QUANTIZED_POSITION_BOUND_XY: i32 = UNITS_PER_METER * POSITION_BOUND_XY;
pub const QUANTIZED_POSITION_BOUND_Z: i32 = UNITS_PER_METER * POSITION_BOUND_Z;

/// Cubes slower than this (squared speed) are considered at rest.
pub const AT_REST_EPSILON: f32 = 1e-6;

pub const QUATERNION_BITS: u32 = 9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CubeState {
    pub interacting: bool,
    pub position: Vec3,
    pub orientation: Quat,
    pub linear_velocity: Vec3,
}

impl Default for CubeState {
    fn default() -> Self {
        Self {
            interacting: false,
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            linear_velocity: Vec3::ZERO,
        }
    }
}

impl CubeState {
    pub fn at_rest(&self) -> bool {
        self.linear_velocity.length_squared() <= AT_REST_EPSILON
    }
}

/// Smallest-three quantized unit quaternion: the 2-bit index of the dropped
/// (largest) component and the remaining three scaled to signed integers in
/// [-M, +M], M = (1 << QUATERNION_BITS) - 1. The dropped component's sign is
/// implicitly positive. Comparing two of these compares the integers, so two
/// orientations that quantize identically are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantizedQuat {
    pub largest: u32,
    pub a: i32,
    pub b: i32,
    pub c: i32,
}

impl Default for QuantizedQuat {
    fn default() -> Self {
        // identity: w largest, all others zero
        Self {
            largest: 3,
            a: 0,
            b: 0,
            c: 0,
        }
    }
}

impl QuantizedQuat {
    pub const MAX_INTEGER: i32 = (1 << QUATERNION_BITS) - 1;

    const SCALE: f32 = core::f32::consts::SQRT_2 * Self::MAX_INTEGER as f32;

    pub fn quantize(q: Quat) -> Self {
        let components = [q.x, q.y, q.z, q.w];
        let mut largest = 0usize;
        for i in 1..4 {
            if components[i].abs() > components[largest].abs() {
                largest = i;
            }
        }
        let sign = if components[largest] < 0.0 { -1.0 } else { 1.0 };

        let mut integers = [0i32; 3];
        let mut slot = 0;
        for (i, component) in components.iter().enumerate() {
            if i == largest {
                continue;
            }
            let scaled = (component * sign * Self::SCALE).round() as i32;
            integers[slot] = scaled.clamp(-Self::MAX_INTEGER, Self::MAX_INTEGER);
            slot += 1;
        }

        Self {
            largest: largest as u32,
            a: integers[0],
            b: integers[1],
            c: integers[2],
        }
    }

    pub fn dequantize(&self) -> Quat {
        let inv_scale = 1.0 / Self::SCALE;
        let a = self.a as f32 * inv_scale;
        let b = self.b as f32 * inv_scale;
        let c = self.c as f32 * inv_scale;
        let d = (1.0 - a * a - b * b - c * c).max(0.0).sqrt();
        match self.largest {
            0 => Quat::from_xyzw(d, a, b, c),
            1 => Quat::from_xyzw(a, d, b, c),
            2 => Quat::from_xyzw(a, b, d, c),
            _ => Quat::from_xyzw(a, b, c, d),
        }
    }

    pub fn serialize(&mut self, stream: &mut Stream) -> Result<(), StreamError> {
        stream.serialize_bits(&mut self.largest, 2)?;
        stream.serialize_int(&mut self.a, -Self::MAX_INTEGER, Self::MAX_INTEGER)?;
        stream.serialize_int(&mut self.b, -Self::MAX_INTEGER, Self::MAX_INTEGER)?;
        stream.serialize_int(&mut self.c, -Self::MAX_INTEGER, Self::MAX_INTEGER)?;
        Ok(())
    }
}

/// Lossy fixed-point projection of a cube state. Linear velocity is not
/// carried; the quantized path never transmits it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QuantizedCubeState {
    pub interacting: bool,
    pub position_x: i32,
    pub position_y: i32,
    pub position_z: i32,
    pub orientation: QuantizedQuat,
}

impl QuantizedCubeState {
    pub fn quantize(state: &CubeState) -> Self {
        let units = UNITS_PER_METER as f32;
        Self {
            interacting: state.interacting,
            position_x: ((state.position.x * units).round() as i32)
                .clamp(-QUANTIZED_POSITION_BOUND_XY, QUANTIZED_POSITION_BOUND_XY),
            position_y: ((state.position.y * units).round() as i32)
                .clamp(-QUANTIZED_POSITION_BOUND_XY, QUANTIZED_POSITION_BOUND_XY),
            position_z: ((state.position.z * units).round() as i32)
                .clamp(0, QUANTIZED_POSITION_BOUND_Z),
            orientation: QuantizedQuat::quantize(state.orientation),
        }
    }

    pub fn dequantize(&self) -> CubeState {
        let inv_units = 1.0 / UNITS_PER_METER as f32;
        CubeState {
            interacting: self.interacting,
            position: Vec3::new(
                self.position_x as f32 * inv_units,
                self.position_y as f32 * inv_units,
                self.position_z as f32 * inv_units,
            ),
            orientation: self.orientation.dequantize(),
            linear_velocity: Vec3::ZERO,
        }
    }
}

/// State of every cube at one simulation tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub cubes: Vec<CubeState>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            cubes: vec![CubeState::default(); NUM_CUBES],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantizedSnapshot {
    pub cubes: Vec<QuantizedCubeState>,
}

impl Default for QuantizedSnapshot {
    fn default() -> Self {
        Self {
            cubes: vec![QuantizedCubeState::default(); NUM_CUBES],
        }
    }
}

impl QuantizedSnapshot {
    pub fn quantize(snapshot: &Snapshot) -> Self {
        Self {
            cubes: snapshot.cubes.iter().map(QuantizedCubeState::quantize).collect(),
        }
    }

    pub fn quantize_into(&mut self, snapshot: &Snapshot) {
        self.cubes.clear();
        self.cubes
            .extend(snapshot.cubes.iter().map(QuantizedCubeState::quantize));
    }

    pub fn dequantize(&self) -> Snapshot {
        Snapshot {
            cubes: self.cubes.iter().map(QuantizedCubeState::dequantize).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_quantization_error_is_bounded() {
        let state = CubeState {
            interacting: true,
            position: Vec3::new(13.3712, -41.0087, 2.5001),
            orientation: Quat::IDENTITY,
            linear_velocity: Vec3::new(1.0, 0.0, 0.0),
        };

        let quantized = QuantizedCubeState::quantize(&state);
        let restored = quantized.dequantize();

        let error = (restored.position - state.position).abs();
        assert!(error.max_element() <= 1.0 / UNITS_PER_METER as f32);
        assert!(restored.interacting);
        assert_eq!(restored.linear_velocity, Vec3::ZERO);
    }

    #[test]
    fn position_is_clamped_to_bounds() {
        let state = CubeState {
            position: Vec3::new(1000.0, -1000.0, -5.0),
            ..Default::default()
        };

        let quantized = QuantizedCubeState::quantize(&state);
        assert_eq!(quantized.position_x, QUANTIZED_POSITION_BOUND_XY);
        assert_eq!(quantized.position_y, -QUANTIZED_POSITION_BOUND_XY);
        assert_eq!(quantized.position_z, 0);
    }

    #[test]
    fn quantized_quat_roundtrip_is_idempotent() {
        let rotations = [
            Quat::IDENTITY,
            Quat::from_rotation_y(0.73),
            Quat::from_rotation_x(-1.91) * Quat::from_rotation_z(0.4),
        ];

        for q in rotations {
            let quantized = QuantizedQuat::quantize(q);
            let restored = quantized.dequantize();
            assert!((restored.length() - 1.0).abs() < 1e-4);
            assert!(q.dot(restored).abs() > 0.9999);
            assert_eq!(QuantizedQuat::quantize(restored), quantized);
        }
    }

    #[test]
    fn negated_quaternion_quantizes_identically() {
        let q = Quat::from_rotation_y(1.2);
        let negated = Quat::from_xyzw(-q.x, -q.y, -q.z, -q.w);
        assert_eq!(QuantizedQuat::quantize(q), QuantizedQuat::quantize(negated));
    }

    #[test]
    fn quantized_equality_is_fieldwise() {
        let a = QuantizedCubeState {
            interacting: false,
            position_x: 100,
            position_y: -50,
            position_z: 10,
            orientation: QuantizedQuat::default(),
        };
        let mut b = a;
        assert_eq!(a, b);
        b.position_z += 1;
        assert_ne!(a, b);
    }

    #[test]
    fn snapshot_quantize_covers_every_cube() {
        let mut snapshot = Snapshot::default();
        snapshot.cubes[17].position = Vec3::new(1.0, 2.0, 3.0);
        snapshot.cubes[17].interacting = true;

        let quantized = QuantizedSnapshot::quantize(&snapshot);
        assert_eq!(quantized.cubes.len(), NUM_CUBES);
        assert!(quantized.cubes[17].interacting);
        assert_eq!(quantized.cubes[17].position_x, UNITS_PER_METER);
    }
}
