use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::net::Ipv6Addr;

pub const LEFT_PORT: u16 = 1000;
pub const RIGHT_PORT: u16 = 1001;

const BANDWIDTH_WINDOW: f64 = 1.0;

/// Host time as driven by the tick loop.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimeBase {
    pub time: f64,
    pub delta_time: f32,
}

impl TimeBase {
    pub fn advance(&mut self) {
        self.time += self.delta_time as f64;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    pub ip: Ipv6Addr,
    pub port: u16,
}

impl Address {
    pub fn loopback(port: u16) -> Self {
        Self {
            ip: Ipv6Addr::LOCALHOST,
            port,
        }
    }
}

/// Network conditions applied to packets in flight. Latency and jitter are in
/// seconds, packet loss in percent.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SimulatorState {
    pub latency: f32,
    pub jitter: f32,
    pub packet_loss: f32,
}

#[derive(Debug)]
struct DelayedPacket {
    delivery_time: f64,
    arrival_order: u64,
    to: Address,
    payload: Vec<u8>,
}

impl PartialEq for DelayedPacket {
    fn eq(&self, other: &Self) -> bool {
        self.delivery_time == other.delivery_time && self.arrival_order == other.arrival_order
    }
}

impl Eq for DelayedPacket {}

impl PartialOrd for DelayedPacket {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DelayedPacket {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap; arrival order keeps same-time packets FIFO
        other
            .delivery_time
            .total_cmp(&self.delivery_time)
            .then(other.arrival_order.cmp(&self.arrival_order))
    }
}

/// Lossy, jittery, latency-afflicted transport between the two simulated
/// endpoints. Packets are opaque length-delimited byte blobs; delivery times
/// advance with the simulation clock fed through `update`, so a run with zero
/// loss and jitter is fully deterministic.
#[derive(Debug, Default)]
pub struct NetworkSimulator {
    states: Vec<SimulatorState>,
    queue: BinaryHeap<DelayedPacket>,
    time: f64,
    arrival_counter: u64,
    bandwidth_exclude: bool,
    send_samples: VecDeque<(f64, usize)>,
    packets_sent: u64,
    packets_dropped: u64,
}

impl NetworkSimulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.queue.clear();
        self.send_samples.clear();
        self.time = 0.0;
        self.arrival_counter = 0;
        self.bandwidth_exclude = false;
        self.packets_sent = 0;
        self.packets_dropped = 0;
    }

    pub fn clear_states(&mut self) {
        self.states.clear();
    }

    pub fn add_state(&mut self, state: SimulatorState) {
        self.states.push(state);
    }

    /// Excludes subsequent sends from bandwidth accounting until turned off
    /// again (used for ack packets).
    pub fn set_bandwidth_exclude(&mut self, exclude: bool) {
        self.bandwidth_exclude = exclude;
    }

    pub fn send_packet(&mut self, to: Address, payload: Vec<u8>) {
        if !self.bandwidth_exclude {
            self.send_samples.push_back((self.time, payload.len()));
        }
        self.packets_sent += 1;

        let state = self.pick_state();

        if state.packet_loss > 0.0 && rand_percent() * 100.0 < state.packet_loss {
            self.packets_dropped += 1;
            return;
        }

        let jitter = if state.jitter > 0.0 {
            (rand_percent() * 2.0 - 1.0) * state.jitter
        } else {
            0.0
        };
        let delay = (state.latency + jitter).max(0.0) as f64;

        self.arrival_counter += 1;
        self.queue.push(DelayedPacket {
            delivery_time: self.time + delay,
            arrival_order: self.arrival_counter,
            to,
            payload,
        });
    }

    pub fn update(&mut self, time_base: TimeBase) {
        self.time = time_base.time;
        let cutoff = self.time - BANDWIDTH_WINDOW;
        while self
            .send_samples
            .front()
            .is_some_and(|&(sent, _)| sent < cutoff)
        {
            self.send_samples.pop_front();
        }
    }

    /// Next packet whose scheduled delivery time has elapsed, in delivery
    /// order; `None` when the wire is quiet.
    pub fn receive_packet(&mut self) -> Option<(Address, Vec<u8>)> {
        if self
            .queue
            .peek()
            .is_some_and(|packet| packet.delivery_time <= self.time)
        {
            let packet = self.queue.pop().unwrap();
            Some((packet.to, packet.payload))
        } else {
            None
        }
    }

    /// Measured send bandwidth in kbps over the last second of sim time.
    pub fn bandwidth_kbps(&self) -> f32 {
        let bytes: usize = self.send_samples.iter().map(|&(_, len)| len).sum();
        (bytes as f64 * 8.0 / BANDWIDTH_WINDOW / 1000.0) as f32
    }

    pub fn packets_sent(&self) -> u64 {
        self.packets_sent
    }

    pub fn packets_dropped(&self) -> u64 {
        self.packets_dropped
    }

    fn pick_state(&self) -> SimulatorState {
        match self.states.len() {
            0 => SimulatorState::default(),
            1 => self.states[0],
            n => self.states[(rand_percent() * n as f32) as usize % n],
        }
    }
}

pub fn rand_percent() -> f32 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let state = RandomState::new();
    let mut hasher = state.build_hasher();
    hasher.write_u64(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos() as u64,
    );
    (hasher.finish() % 10000) as f32 / 10000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(time: f64) -> TimeBase {
        TimeBase {
            time,
            delta_time: 1.0 / 60.0,
        }
    }

    #[test]
    fn zero_latency_delivers_after_update() {
        let mut sim = NetworkSimulator::new();
        let to = Address::loopback(RIGHT_PORT);

        sim.send_packet(to, vec![1, 2, 3]);
        sim.update(at(0.0));

        let (addr, payload) = sim.receive_packet().unwrap();
        assert_eq!(addr, to);
        assert_eq!(payload, vec![1, 2, 3]);
        assert!(sim.receive_packet().is_none());
    }

    #[test]
    fn latency_holds_packets_until_due() {
        let mut sim = NetworkSimulator::new();
        sim.add_state(SimulatorState {
            latency: 0.05,
            jitter: 0.0,
            packet_loss: 0.0,
        });

        sim.send_packet(Address::loopback(RIGHT_PORT), vec![7]);

        sim.update(at(0.016));
        assert!(sim.receive_packet().is_none());

        sim.update(at(0.066));
        assert!(sim.receive_packet().is_some());
    }

    #[test]
    fn same_time_packets_are_fifo() {
        let mut sim = NetworkSimulator::new();
        let to = Address::loopback(RIGHT_PORT);

        for i in 0..5u8 {
            sim.send_packet(to, vec![i]);
        }
        sim.update(at(0.0));

        for i in 0..5u8 {
            let (_, payload) = sim.receive_packet().unwrap();
            assert_eq!(payload, vec![i]);
        }
    }

    #[test]
    fn total_loss_drops_everything() {
        let mut sim = NetworkSimulator::new();
        sim.add_state(SimulatorState {
            latency: 0.0,
            jitter: 0.0,
            packet_loss: 100.0,
        });

        for _ in 0..20 {
            sim.send_packet(Address::loopback(RIGHT_PORT), vec![0; 32]);
        }
        sim.update(at(1.0));

        assert!(sim.receive_packet().is_none());
        assert_eq!(sim.packets_dropped(), 20);
    }

    #[test]
    fn bandwidth_excludes_marked_sends() {
        let mut sim = NetworkSimulator::new();
        let to = Address::loopback(LEFT_PORT);

        sim.send_packet(to, vec![0; 125]); // 1000 bits
        sim.set_bandwidth_exclude(true);
        sim.send_packet(to, vec![0; 10_000]);
        sim.set_bandwidth_exclude(false);
        sim.update(at(0.5));

        assert!((sim.bandwidth_kbps() - 1.0).abs() < 1e-3);
    }

    #[test]
    fn bandwidth_window_ages_out() {
        let mut sim = NetworkSimulator::new();
        sim.send_packet(Address::loopback(LEFT_PORT), vec![0; 1000]);
        sim.update(at(0.0));
        assert!(sim.bandwidth_kbps() > 0.0);

        sim.update(at(5.0));
        assert_eq!(sim.bandwidth_kbps(), 0.0);
    }
}
