use glam::{Quat, Vec3};

use crate::net::sequence_greater_than;

use super::state::{CubeState, NUM_CUBES};

pub const PLAYOUT_BUFFER_SIZE: usize = 256;

const EMPTY_SLOT: u32 = 0xFFFF_FFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpolationMode {
    Linear,
    Hermite,
}

/// Per-mode tuning knobs: how long to buffer before playout, how often to
/// send, the simulated network conditions, and how to interpolate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnapshotModeData {
    pub playout_delay: f32,
    pub send_rate: f32,
    pub latency: f32,
    pub jitter: f32,
    pub packet_loss: f32,
    pub interpolation: InterpolationMode,
}

impl Default for SnapshotModeData {
    fn default() -> Self {
        Self {
            // one lost packet = no problem. two lost packets in a row = hitch
            playout_delay: 0.1,
            send_rate: 60.0,
            latency: 0.0,
            packet_loss: 5.0,
            jitter: 2.0 / 60.0,
            interpolation: InterpolationMode::Linear,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ObjectUpdate {
    pub index: usize,
    pub position: Vec3,
    pub orientation: Quat,
    pub linear_velocity: Vec3,
    pub interacting: bool,
}

#[derive(Debug, Clone)]
struct PlayoutEntry {
    time: f64,
    cubes: Vec<CubeState>,
}

/// Fixed-latency interpolation buffer. Decoded snapshots are inserted by
/// sequence; playback runs `playout_delay` seconds behind receipt and
/// interpolates each cube between the two snapshots straddling the playback
/// time. A gap in the sequence space is bridged by interpolating across it;
/// running out of snapshots entirely stalls playback until more arrive.
#[derive(Debug)]
pub struct PlayoutBuffer {
    entries: Vec<PlayoutEntry>,
    sequences: Vec<u32>,
    oldest_sequence: Option<u16>,
    interpolating: bool,
    // sequence of the snapshot currently interpolated from
    cursor: u16,
}

impl Default for PlayoutBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl PlayoutBuffer {
    pub fn new() -> Self {
        Self {
            entries: (0..PLAYOUT_BUFFER_SIZE)
                .map(|_| PlayoutEntry {
                    time: 0.0,
                    cubes: vec![CubeState::default(); NUM_CUBES],
                })
                .collect(),
            sequences: vec![EMPTY_SLOT; PLAYOUT_BUFFER_SIZE],
            oldest_sequence: None,
            interpolating: false,
            cursor: 0,
        }
    }

    pub fn reset(&mut self) {
        for slot in &mut self.sequences {
            *slot = EMPTY_SLOT;
        }
        self.oldest_sequence = None;
        self.interpolating = false;
        self.cursor = 0;
    }

    pub fn is_interpolating(&self) -> bool {
        self.interpolating
    }

    pub fn add_snapshot(&mut self, time: f64, sequence: u16, cubes: &[CubeState]) {
        debug_assert_eq!(cubes.len(), NUM_CUBES);
        let index = sequence as usize % PLAYOUT_BUFFER_SIZE;
        self.sequences[index] = sequence as u32;
        let entry = &mut self.entries[index];
        entry.time = time;
        entry.cubes.clear();
        entry.cubes.extend_from_slice(cubes);

        match self.oldest_sequence {
            None => self.oldest_sequence = Some(sequence),
            Some(oldest) if sequence_greater_than(oldest, sequence) => {
                self.oldest_sequence = Some(sequence);
            }
            _ => {}
        }
    }

    fn find(&self, sequence: u16) -> Option<&PlayoutEntry> {
        let index = sequence as usize % PLAYOUT_BUFFER_SIZE;
        if self.sequences[index] == sequence as u32 {
            Some(&self.entries[index])
        } else {
            None
        }
    }

    /// Next stored snapshot after `sequence`, skipping sequences lost in
    /// transit.
    fn next_after(&self, sequence: u16) -> Option<u16> {
        for step in 1..PLAYOUT_BUFFER_SIZE as u16 {
            let candidate = sequence.wrapping_add(step);
            if self.find(candidate).is_some() {
                return Some(candidate);
            }
        }
        None
    }

    pub fn get_view_update(&mut self, mode_data: &SnapshotModeData, time: f64) -> Vec<ObjectUpdate> {
        let playback_time = time - mode_data.playout_delay as f64;

        if !self.interpolating {
            let Some(oldest) = self.oldest_sequence else {
                return Vec::new();
            };
            let Some(entry) = self.find(oldest) else {
                return Vec::new();
            };
            if entry.time > playback_time || self.next_after(oldest).is_none() {
                return Vec::new();
            }
            self.interpolating = true;
            self.cursor = oldest;
        }

        if self.find(self.cursor).is_none() {
            log::warn!(
                "snapshot {} fell out of the playout buffer, restarting interpolation",
                self.cursor
            );
            self.reset();
            return Vec::new();
        }

        // advance the cursor past every snapshot playback has caught up with
        let to_sequence = loop {
            match self.next_after(self.cursor) {
                Some(next) => {
                    let next_time = self.find(next).expect("next_after returned a stored sequence").time;
                    if next_time <= playback_time {
                        self.cursor = next;
                    } else {
                        break next;
                    }
                }
                None => {
                    log::warn!("no snapshot to interpolate towards");
                    return Vec::new();
                }
            }
        };

        let from_entry = self.find(self.cursor).expect("cursor entry present");
        let to_entry = self.find(to_sequence).expect("target entry present");

        let duration = to_entry.time - from_entry.time;
        let t = if duration > 0.0 {
            (((playback_time - from_entry.time) / duration) as f32).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let hermite_neighbors = if mode_data.interpolation == InterpolationMode::Hermite {
            // Hermite needs the snapshots either side of the pair for
            // tangents; otherwise drop back to linear
            match (
                self.find(self.cursor.wrapping_sub(1)),
                self.find(to_sequence.wrapping_add(1)),
            ) {
                (Some(before), Some(after)) => Some((before, after)),
                _ => None,
            }
        } else {
            None
        };

        let mut updates = Vec::with_capacity(NUM_CUBES);
        for i in 0..NUM_CUBES {
            let a = &from_entry.cubes[i];
            let b = &to_entry.cubes[i];

            let position = match hermite_neighbors {
                Some((before, after)) => hermite_interpolate(
                    before.cubes[i].position,
                    a.position,
                    b.position,
                    after.cubes[i].position,
                    t,
                ),
                None => a.position.lerp(b.position, t),
            };

            updates.push(ObjectUpdate {
                index: i,
                position,
                orientation: slerp_shortest(a.orientation, b.orientation, t),
                linear_velocity: a.linear_velocity.lerp(b.linear_velocity, t),
                interacting: if t < 0.5 { a.interacting } else { b.interacting },
            });
        }
        updates
    }
}

fn slerp_shortest(from: Quat, to: Quat, t: f32) -> Quat {
    if from.dot(to) < 0.0 {
        from.slerp(-to, t)
    } else {
        from.slerp(to, t)
    }
}

/// Catmull-Rom cubic through p1..p2 with tangents from p0 and p3.
pub fn hermite_interpolate(p0: Vec3, p1: Vec3, p2: Vec3, p3: Vec3, t: f32) -> Vec3 {
    let t2 = t * t;
    let t3 = t2 * t;

    let c0 = -0.5 * t3 + t2 - 0.5 * t;
    let c1 = 1.5 * t3 - 2.5 * t2 + 1.0;
    let c2 = -1.5 * t3 + 2.0 * t2 + 0.5 * t;
    let c3 = 0.5 * t3 - 0.5 * t2;

    p0 * c0 + p1 * c1 + p2 * c2 + p3 * c3
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICK: f64 = 1.0 / 60.0;

    fn cubes_at(x: f32) -> Vec<CubeState> {
        let mut cubes = vec![CubeState::default(); NUM_CUBES];
        for cube in &mut cubes {
            cube.position = Vec3::new(x, 0.0, 1.0);
        }
        cubes
    }

    fn linear_mode() -> SnapshotModeData {
        SnapshotModeData::default()
    }

    #[test]
    fn no_updates_until_playout_delay_elapses() {
        let mut buffer = PlayoutBuffer::new();
        buffer.add_snapshot(0.0, 0, &cubes_at(0.0));
        buffer.add_snapshot(TICK, 1, &cubes_at(1.0));

        let updates = buffer.get_view_update(&linear_mode(), 0.05);
        assert!(updates.is_empty());
        assert!(!buffer.is_interpolating());
    }

    #[test]
    fn interpolates_between_straddling_snapshots() {
        let mut buffer = PlayoutBuffer::new();
        buffer.add_snapshot(0.0, 0, &cubes_at(0.0));
        buffer.add_snapshot(0.1, 1, &cubes_at(10.0));

        // playback time 0.05 sits midway between the two snapshots
        let updates = buffer.get_view_update(&linear_mode(), 0.15);
        assert_eq!(updates.len(), NUM_CUBES);
        assert!((updates[0].position.x - 5.0).abs() < 1e-3);
        assert!(buffer.is_interpolating());
    }

    #[test]
    fn bridges_a_lost_sequence() {
        let mut buffer = PlayoutBuffer::new();
        buffer.add_snapshot(0.0, 0, &cubes_at(0.0));
        // sequence 1 lost in transit
        buffer.add_snapshot(2.0 * TICK, 2, &cubes_at(2.0));

        let updates = buffer.get_view_update(&linear_mode(), 0.1 + TICK);
        assert_eq!(updates.len(), NUM_CUBES);
        assert!((updates[0].position.x - 1.0).abs() < 1e-3);
    }

    #[test]
    fn stalls_without_a_snapshot_to_interpolate_towards() {
        let mut buffer = PlayoutBuffer::new();
        buffer.add_snapshot(0.0, 0, &cubes_at(0.0));
        buffer.add_snapshot(TICK, 1, &cubes_at(1.0));

        // start interpolating...
        assert!(!buffer.get_view_update(&linear_mode(), 0.1 + TICK / 2.0).is_empty());
        // ...then run far past the newest snapshot
        let updates = buffer.get_view_update(&linear_mode(), 1.0);
        assert!(updates.is_empty());
        assert!(buffer.is_interpolating());
    }

    #[test]
    fn hermite_falls_back_to_linear_at_the_edges() {
        let mut mode = linear_mode();
        mode.interpolation = InterpolationMode::Hermite;

        let mut buffer = PlayoutBuffer::new();
        buffer.add_snapshot(0.0, 0, &cubes_at(0.0));
        buffer.add_snapshot(0.1, 1, &cubes_at(10.0));

        // no sequence -1 / 2 present, so this is plain lerp
        let updates = buffer.get_view_update(&mode, 0.15);
        assert!((updates[0].position.x - 5.0).abs() < 1e-3);
    }

    #[test]
    fn hermite_uses_neighbor_snapshots_when_present() {
        let mut mode = linear_mode();
        mode.interpolation = InterpolationMode::Hermite;

        let mut buffer = PlayoutBuffer::new();
        // constant velocity: hermite through collinear points stays on the line
        for sequence in 0u16..4 {
            buffer.add_snapshot(
                sequence as f64 * 0.1,
                sequence,
                &cubes_at(sequence as f32 * 10.0),
            );
        }

        // playback lands midway between sequences 1 and 2
        let updates = buffer.get_view_update(&mode, 0.1 + 0.15);
        assert!((updates[0].position.x - 15.0).abs() < 1e-2);
    }

    #[test]
    fn orientation_interpolates_along_shortest_arc() {
        let mut buffer = PlayoutBuffer::new();

        let mut start = cubes_at(0.0);
        for cube in &mut start {
            cube.orientation = Quat::IDENTITY;
        }
        let mut end = cubes_at(0.0);
        for cube in &mut end {
            // -q is the same rotation; slerp must not take the long way round
            let q = Quat::from_rotation_y(0.5);
            cube.orientation = Quat::from_xyzw(-q.x, -q.y, -q.z, -q.w);
        }

        buffer.add_snapshot(0.0, 0, &start);
        buffer.add_snapshot(0.1, 1, &end);

        let updates = buffer.get_view_update(&SnapshotModeData::default(), 0.15);
        let expected = Quat::from_rotation_y(0.25);
        assert!(updates[0].orientation.dot(expected).abs() > 0.9999);
    }
}
