use glam::{Quat, Vec3};

use crate::snapshot::{CubeState, Snapshot, NUM_CUBES};

const GRID_COLUMNS: usize = 30;
const GRID_SPACING: f32 = 2.5;
const REST_HEIGHT: f32 = 0.5;
const ORBIT_RADIUS: f32 = 1.0;
const ORBIT_RATE: f32 = 0.9;
const BOB_AMPLITUDE: f32 = 0.25;
const BOB_RATE: f32 = 1.3;
const TUMBLE_RATE: f32 = 1.7;

/// Deterministic stand-in for the physics simulation: a grid of cubes, most
/// at rest, with every tenth cube (the "player" cube 0 included) orbiting its
/// grid cell, bobbing and tumbling. Positions always stay inside the
/// quantization bounds, so every snapshot it produces is encodable in every
/// compression mode.
pub struct CubeScene {
    time: f64,
    snapshot: Snapshot,
}

impl Default for CubeScene {
    fn default() -> Self {
        Self::new()
    }
}

impl CubeScene {
    pub fn new() -> Self {
        let mut scene = Self {
            time: 0.0,
            snapshot: Snapshot::default(),
        };
        scene.rebuild();
        scene
    }

    pub fn update(&mut self, delta_time: f32) {
        self.time += delta_time as f64;
        self.rebuild();
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    fn rebuild(&mut self) {
        let time = self.time as f32;
        for (i, cube) in self.snapshot.cubes.iter_mut().enumerate() {
            let column = (i % GRID_COLUMNS) as f32;
            let row = (i / GRID_COLUMNS) as f32;
            let center = Vec3::new(
                (column - (GRID_COLUMNS - 1) as f32 / 2.0) * GRID_SPACING,
                (row - (GRID_COLUMNS - 1) as f32 / 2.0) * GRID_SPACING,
                REST_HEIGHT,
            );
            let phase = i as f32 * 0.37;

            if i % 10 == 0 {
                let angle = time * ORBIT_RATE + phase;
                cube.position = center
                    + Vec3::new(
                        angle.cos() * ORBIT_RADIUS,
                        angle.sin() * ORBIT_RADIUS,
                        BOB_AMPLITUDE * (1.0 + (angle * BOB_RATE).sin()),
                    );
                cube.linear_velocity = Vec3::new(
                    -angle.sin() * ORBIT_RADIUS * ORBIT_RATE,
                    angle.cos() * ORBIT_RADIUS * ORBIT_RATE,
                    BOB_AMPLITUDE * BOB_RATE * ORBIT_RATE * (angle * BOB_RATE).cos(),
                );
                cube.orientation =
                    Quat::from_rotation_z(angle * TUMBLE_RATE) * Quat::from_rotation_x(phase);
                cube.interacting = true;
            } else {
                cube.position = center;
                cube.linear_velocity = Vec3::ZERO;
                cube.orientation = Quat::from_rotation_z(phase);
                cube.interacting = false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{POSITION_BOUND_XY, POSITION_BOUND_Z};

    #[test]
    fn positions_stay_inside_quantization_bounds() {
        let mut scene = CubeScene::new();
        for _ in 0..600 {
            scene.update(1.0 / 60.0);
            for cube in &scene.snapshot().cubes {
                assert!(cube.position.x.abs() <= POSITION_BOUND_XY as f32);
                assert!(cube.position.y.abs() <= POSITION_BOUND_XY as f32);
                assert!(cube.position.z >= 0.0 && cube.position.z <= POSITION_BOUND_Z as f32);
            }
        }
    }

    #[test]
    fn only_every_tenth_cube_moves() {
        let mut scene = CubeScene::new();
        let before = scene.snapshot().clone();
        scene.update(1.0 / 60.0);
        let after = scene.snapshot();

        for i in 0..NUM_CUBES {
            if i % 10 == 0 {
                assert_ne!(before.cubes[i].position, after.cubes[i].position);
                assert!(after.cubes[i].interacting);
                assert!(!after.cubes[i].at_rest());
            } else {
                assert_eq!(before.cubes[i], after.cubes[i]);
                assert!(after.cubes[i].at_rest());
            }
        }
    }

    #[test]
    fn identical_times_produce_identical_snapshots() {
        let mut a = CubeScene::new();
        let mut b = CubeScene::new();
        for _ in 0..10 {
            a.update(1.0 / 60.0);
            b.update(1.0 / 60.0);
        }
        assert_eq!(a.snapshot(), b.snapshot());
    }
}
