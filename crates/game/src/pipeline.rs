use crate::net::{
    sequence_greater_than, AckPacket, Address, CompressionMode, NetworkSimulator, Packet,
    SequenceBuffer, SimulatorState, SlidingWindow, SnapshotContext, SnapshotPacket, TimeBase,
    LEFT_PORT, MAX_SNAPSHOTS, RIGHT_PORT,
};
use crate::snapshot::{
    InterpolationMode, ObjectUpdate, PlayoutBuffer, QuantizedSnapshot, Snapshot, SnapshotModeData,
};

/// Default per-mode tuning: linear interpolation everywhere except the three
/// uncompressed modes, which carry velocity and can afford Hermite.
pub fn mode_data_for(mode: CompressionMode) -> SnapshotModeData {
    let mut data = SnapshotModeData::default();
    if matches!(
        mode,
        CompressionMode::Uncompressed | CompressionMode::Orientation | CompressionMode::AtRest
    ) {
        data.interpolation = InterpolationMode::Hermite;
    }
    data
}

/// Both ends of the snapshot link plus the simulated wire between them,
/// advanced one tick at a time.
///
/// The left side produces a snapshot per send interval, retains it in its
/// sliding window and streams it to the right side; the right side decodes
/// into its sequence buffer, feeds the playout buffer and acks the highest
/// sequence seen. Both sides run inside one `update` call, serially, with the
/// simulator as the only source of delay and reordering between them.
pub struct SnapshotPipeline {
    mode: CompressionMode,
    mode_data: SnapshotModeData,
    simulator: NetworkSimulator,
    snapshot_window: SlidingWindow<Snapshot>,
    snapshot_buffer: SequenceBuffer<Snapshot>,
    quantized_window: SlidingWindow<QuantizedSnapshot>,
    quantized_buffer: SequenceBuffer<QuantizedSnapshot>,
    initial_snapshot: QuantizedSnapshot,
    playout: PlayoutBuffer,
    send_accumulator: f32,
    received_ack: bool,
}

impl SnapshotPipeline {
    pub fn new(mode: CompressionMode, initial_snapshot: QuantizedSnapshot) -> Self {
        Self::with_mode_data(mode, mode_data_for(mode), initial_snapshot)
    }

    pub fn with_mode_data(
        mode: CompressionMode,
        mode_data: SnapshotModeData,
        initial_snapshot: QuantizedSnapshot,
    ) -> Self {
        let mut pipeline = Self {
            mode,
            mode_data,
            simulator: NetworkSimulator::new(),
            snapshot_window: SlidingWindow::new(MAX_SNAPSHOTS),
            snapshot_buffer: SequenceBuffer::new(MAX_SNAPSHOTS),
            quantized_window: SlidingWindow::new(MAX_SNAPSHOTS),
            quantized_buffer: SequenceBuffer::new(MAX_SNAPSHOTS),
            initial_snapshot,
            playout: PlayoutBuffer::new(),
            send_accumulator: 0.0,
            received_ack: false,
        };
        pipeline.reset();
        pipeline
    }

    pub fn reset(&mut self) {
        self.playout.reset();
        self.simulator.reset();
        self.simulator.clear_states();
        self.simulator.add_state(SimulatorState {
            latency: self.mode_data.latency,
            jitter: self.mode_data.jitter,
            packet_loss: self.mode_data.packet_loss,
        });
        self.snapshot_window.reset();
        self.snapshot_buffer.reset();
        self.quantized_window.reset();
        self.quantized_buffer.reset();
        // primed so the first tick sends immediately
        self.send_accumulator = 1.0;
        self.received_ack = false;
    }

    /// Switches compression mode, resetting both ends: the first packet under
    /// the new mode is an initial packet until an ack comes back.
    pub fn set_mode(&mut self, mode: CompressionMode) {
        self.mode = mode;
        self.mode_data = mode_data_for(mode);
        self.reset();
    }

    pub fn mode(&self) -> CompressionMode {
        self.mode
    }

    /// Swaps the simulated network conditions without resetting either end;
    /// packets already in flight keep their scheduled delivery times.
    pub fn set_network_conditions(&mut self, state: SimulatorState) {
        self.mode_data.latency = state.latency;
        self.mode_data.jitter = state.jitter;
        self.mode_data.packet_loss = state.packet_loss;
        self.simulator.clear_states();
        self.simulator.add_state(state);
    }

    pub fn mode_data(&self) -> &SnapshotModeData {
        &self.mode_data
    }

    pub fn received_ack(&self) -> bool {
        self.received_ack
    }

    /// The sender's ack cursor for the active snapshot window.
    pub fn ack_sequence(&self) -> u16 {
        if self.mode.is_quantized() {
            self.quantized_window.get_ack()
        } else {
            self.snapshot_window.get_ack()
        }
    }

    pub fn send_sequence(&self) -> u16 {
        if self.mode.is_quantized() {
            self.quantized_window.send_sequence()
        } else {
            self.snapshot_window.send_sequence()
        }
    }

    pub fn bandwidth_kbps(&self) -> f32 {
        self.simulator.bandwidth_kbps()
    }

    pub fn is_interpolating(&self) -> bool {
        self.playout.is_interpolating()
    }

    /// One tick: maybe send a snapshot of `source`, advance the wire, drain
    /// and decode arrivals, ack, and pull interpolated view updates for the
    /// receiving side.
    pub fn update(&mut self, time_base: TimeBase, source: &Snapshot) -> Vec<ObjectUpdate> {
        self.send_snapshot(time_base, source);

        self.simulator.update(time_base);

        self.drain_received(time_base);

        self.playout.get_view_update(&self.mode_data, time_base.time)
    }

    fn send_snapshot(&mut self, time_base: TimeBase, source: &Snapshot) {
        self.send_accumulator += time_base.delta_time;
        if self.send_accumulator < 1.0 / self.mode_data.send_rate {
            return;
        }
        self.send_accumulator = 0.0;

        let packet = if self.mode.is_quantized() {
            let base_sequence = self.quantized_window.get_ack().wrapping_add(1);
            let (sequence, entry) = self.quantized_window.insert();
            entry.quantize_into(source);
            SnapshotPacket {
                sequence,
                base_sequence,
                initial: !self.received_ack,
                mode: self.mode,
            }
        } else {
            let base_sequence = self.snapshot_window.get_ack().wrapping_add(1);
            let (sequence, entry) = self.snapshot_window.insert();
            entry.cubes.clone_from(&source.cubes);
            SnapshotPacket {
                sequence,
                base_sequence,
                initial: !self.received_ack,
                mode: self.mode,
            }
        };

        let mut context = SnapshotContext::Sender {
            snapshots: &self.snapshot_window,
            quantized: &self.quantized_window,
            initial: &self.initial_snapshot,
        };
        match Packet::Snapshot(packet).encode(&mut context) {
            Ok(bytes) => {
                self.simulator
                    .send_packet(Address::loopback(RIGHT_PORT), bytes);
            }
            Err(err) => {
                log::warn!("failed to encode snapshot {}: {}", packet.sequence, err);
            }
        }
    }

    fn drain_received(&mut self, time_base: TimeBase) {
        let mut received_snapshot_this_frame = false;
        let mut ack_sequence = 0u16;

        while let Some((address, bytes)) = self.simulator.receive_packet() {
            let mut context = SnapshotContext::Receiver {
                snapshots: &mut self.snapshot_buffer,
                quantized: &mut self.quantized_buffer,
                initial: &self.initial_snapshot,
            };
            let packet = match Packet::decode(&bytes, &mut context) {
                Ok(packet) => packet,
                Err(err) => {
                    // dropped without acking; the sender keeps deltaing
                    // against its last acked baseline
                    log::warn!("dropping undecodable packet: {}", err);
                    continue;
                }
            };

            match (packet, address.port) {
                (Packet::Snapshot(snapshot_packet), RIGHT_PORT) => {
                    self.deliver_to_playout(time_base, &snapshot_packet);
                    if !received_snapshot_this_frame
                        || sequence_greater_than(snapshot_packet.sequence, ack_sequence)
                    {
                        received_snapshot_this_frame = true;
                        ack_sequence = snapshot_packet.sequence;
                    }
                }
                (Packet::Ack(ack_packet), LEFT_PORT) => {
                    // deliberately ack - 1: the acked sequence itself stays
                    // available as a delta baseline
                    let floor = ack_packet.ack.wrapping_sub(1);
                    if self.mode.is_quantized() {
                        self.quantized_window.ack(floor);
                    } else {
                        self.snapshot_window.ack(floor);
                    }
                    self.received_ack = true;
                }
                (packet, port) => {
                    log::warn!("unexpected {:?} on port {}", packet.type_tag(), port);
                }
            }
        }

        if received_snapshot_this_frame {
            self.send_ack(ack_sequence);
        }
    }

    fn deliver_to_playout(&mut self, time_base: TimeBase, packet: &SnapshotPacket) {
        if packet.mode.is_quantized() {
            let quantized = self
                .quantized_buffer
                .find(packet.sequence)
                .expect("decode populated the sequence buffer");
            let snapshot = quantized.dequantize();
            self.playout
                .add_snapshot(time_base.time, packet.sequence, &snapshot.cubes);
        } else {
            let snapshot = self
                .snapshot_buffer
                .find(packet.sequence)
                .expect("decode populated the sequence buffer");
            self.playout
                .add_snapshot(time_base.time, packet.sequence, &snapshot.cubes);
        }
    }

    fn send_ack(&mut self, ack_sequence: u16) {
        let ack = Packet::Ack(AckPacket { ack: ack_sequence });
        let mut context = SnapshotContext::Sender {
            snapshots: &self.snapshot_window,
            quantized: &self.quantized_window,
            initial: &self.initial_snapshot,
        };
        match ack.encode(&mut context) {
            Ok(bytes) => {
                self.simulator.set_bandwidth_exclude(true);
                self.simulator
                    .send_packet(Address::loopback(LEFT_PORT), bytes);
                self.simulator.set_bandwidth_exclude(false);
            }
            Err(err) => log::warn!("failed to encode ack {}: {}", ack_sequence, err),
        }
    }
}
