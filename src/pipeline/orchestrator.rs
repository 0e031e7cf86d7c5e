//! The pipeline event loop
//!
//! This module contains the worker that runs on the pipeline thread and owns
//! every mutable piece of the pipeline: the sample source (and with it the
//! buffer pairs), the converter, the framer's sequence counter, the
//! flow-control gate, and the state machine.
//!
//! # Concurrency model
//!
//! There is no locking. Commands from the embedder and completion events from
//! the collaborators are multiplexed through `crossbeam_channel::select!`, so
//! exactly one handler runs at a time and all pipeline state has a single
//! owner. "Waiting for an ack" means not arming and not sending; no thread
//! ever blocks on the wire.
//!
//! # State machine (differential mode)
//!
//! ```text
//! Idle --Start: arm A--> Sampling(A)
//! Sampling(A) --SampleReady(A): store value, arm B--> Sampling(B)
//! Sampling(B) --SampleReady(B): combine, frame, send--> WaitingForAck
//! WaitingForAck --ack token: send reply, arm A--> Sampling(A)
//! ```
//!
//! Single-channel mode collapses the middle: every completion converts,
//! frames, and sends, and the ack re-arms the same channel.

use crate::acquisition::{AdcCapability, SampleSource};
use crate::config::PipelineConfig;
use crate::convert::{combine, UnitConverter};
use crate::error::Result;
use crate::framer::TelemetryFramer;
use crate::pipeline::{PipelineCommand, PipelineEvent, PipelineMessage};
use crate::transport::{AckOutcome, ByteTransport, FlowControlledLink};
use crate::types::{ChannelId, FrameValue, PipelineState, PipelineStats, SampleBuffer};
use crossbeam_channel::{select, tick, Receiver, Sender};
use std::time::Duration;

/// How often a stats message is pushed to the embedder
const STATS_INTERVAL: Duration = Duration::from_millis(500);

/// Operating mode, derived from the configured channel count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineMode {
    /// One channel; every reading becomes a frame
    Continuous,
    /// Two channels; frames carry `value(A) - value(B)`
    Differential,
}

/// The worker that owns all pipeline state and runs the event loop
pub struct PipelineOrchestrator {
    mode: PipelineMode,
    source: SampleSource,
    converter: UnitConverter,
    framer: TelemetryFramer,
    link: FlowControlledLink,
    state: PipelineState,
    /// Channel A's calibrated value, held while channel B samples
    pending: Option<crate::types::CalibratedValue>,
    stats: PipelineStats,
    channel_a: ChannelId,
    channel_b: Option<ChannelId>,
    command_rx: Receiver<PipelineCommand>,
    event_rx: Receiver<PipelineEvent>,
    message_tx: Sender<PipelineMessage>,
    running: bool,
}

impl PipelineOrchestrator {
    /// Build the orchestrator and bind both collaborators to the event
    /// channel. Fails on an invalid configuration.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &PipelineConfig,
        adc: Box<dyn AdcCapability>,
        transport: Box<dyn ByteTransport>,
        event_tx: Sender<PipelineEvent>,
        event_rx: Receiver<PipelineEvent>,
        command_rx: Receiver<PipelineCommand>,
        message_tx: Sender<PipelineMessage>,
    ) -> Result<Self> {
        config.validate()?;
        let channels = config.channels();
        let mode = if channels.len() == 1 {
            PipelineMode::Continuous
        } else {
            PipelineMode::Differential
        };
        let channel_a = channels[0].id;
        let channel_b = channels.get(1).map(|c| c.id);

        let mut source = SampleSource::new(adc, channels, config.buffer_size);
        source.bind(event_tx.clone());
        let mut link = FlowControlledLink::new(transport);
        link.bind(event_tx);

        Ok(Self {
            mode,
            source,
            converter: UnitConverter::new(),
            framer: TelemetryFramer::new(),
            link,
            state: PipelineState::Idle,
            pending: None,
            stats: PipelineStats::default(),
            channel_a,
            channel_b,
            command_rx,
            event_rx,
            message_tx,
            running: true,
        })
    }

    /// Current operating mode
    pub fn mode(&self) -> PipelineMode {
        self.mode
    }

    /// Run the event loop until shutdown
    pub fn run(&mut self) {
        tracing::info!(
            "pipeline started: {:?} mode, device '{}', transport '{}'",
            self.mode,
            self.source.describe(),
            self.link.describe(),
        );
        let _ = self.message_tx.send(PipelineMessage::Started);

        let stats_tick = tick(STATS_INTERVAL);
        while self.running {
            select! {
                recv(self.command_rx) -> cmd => match cmd {
                    Ok(cmd) => self.handle_command(cmd),
                    Err(_) => break,
                },
                recv(self.event_rx) -> event => match event {
                    Ok(event) => self.handle_event(event),
                    Err(_) => break,
                },
                recv(stats_tick) -> _ => self.send_stats(),
            }
        }

        let _ = self.message_tx.send(PipelineMessage::Shutdown);
        tracing::info!("pipeline stopped");
    }

    /// Handle a single embedder command
    pub fn handle_command(&mut self, cmd: PipelineCommand) {
        match cmd {
            PipelineCommand::Start => {
                if self.state != PipelineState::Idle {
                    tracing::warn!("start ignored in state {}", self.state);
                    return;
                }
                self.pending = None;
                self.arm(self.channel_a);
            }
            PipelineCommand::Stop => {
                tracing::info!("streaming stopped");
                self.pending = None;
                // Abandon any unacknowledged frame so a late ack cannot
                // restart acquisition behind the embedder's back
                self.link.reset();
                self.state = PipelineState::Idle;
            }
            PipelineCommand::RequestStats => self.send_stats(),
            PipelineCommand::Shutdown => self.running = false,
        }
    }

    /// Handle a single completion event
    pub fn handle_event(&mut self, event: PipelineEvent) {
        match event {
            PipelineEvent::SampleReady {
                channel,
                buffer,
                count,
            } => self.on_sample_ready(channel, buffer, count),
            PipelineEvent::BytesReceived(bytes) => self.on_bytes_received(&bytes),
            PipelineEvent::WriteComplete => {
                // Swallowed: the send already returned, nothing to do
                self.stats.writes_completed += 1;
            }
        }
    }

    fn on_sample_ready(&mut self, channel: ChannelId, buffer: SampleBuffer, count: usize) {
        if let Err(e) = self.source.complete(channel) {
            tracing::error!("completion for unknown channel {}: {}", channel, e);
            return;
        }
        self.stats.conversions_completed += 1;
        tracing::trace!("channel {} completed with {} samples", channel, count);

        match self.state {
            PipelineState::Sampling(expected) if expected == channel => {}
            _ => {
                // A window arrived while a frame was unacknowledged (or after
                // stop). Reclaim the buffer so acquisition can continue, drop
                // the value to keep frames strictly ordered.
                let _ = self.source.release(channel, buffer);
                self.stats.overruns += 1;
                tracing::warn!(
                    "dropped sample window from channel {} in state {}",
                    channel,
                    self.state
                );
                return;
            }
        }

        let value = {
            let chan = match self.source.channel(channel) {
                Ok(chan) => chan.clone(),
                Err(e) => {
                    tracing::error!("{}", e);
                    return;
                }
            };
            self.converter.convert(&buffer, &chan)
        };
        // Hand the buffer back before arming or sending anything; the pair
        // must be whole again or the next arm on this channel stalls.
        let _ = self.source.release(channel, buffer);

        let value = match value {
            Ok(value) => value,
            Err(e) => {
                self.state = PipelineState::Idle;
                tracing::error!("conversion failed on channel {}: {}", channel, e);
                let _ = self.message_tx.send(PipelineMessage::DeviceError {
                    channel,
                    error: e.to_string(),
                });
                return;
            }
        };

        match self.mode {
            PipelineMode::Continuous => self.emit_frame(value.into()),
            PipelineMode::Differential => {
                if channel == self.channel_a {
                    self.pending = Some(value);
                    // Differential mode implies a second channel
                    if let Some(channel_b) = self.channel_b {
                        self.arm(channel_b);
                    }
                } else {
                    match self.pending.take() {
                        Some(value_a) => {
                            self.emit_frame(FrameValue::Signed(combine(value_a, value)))
                        }
                        None => {
                            // Unreachable through the state machine
                            tracing::error!(
                                "channel B completed with no pending channel A value"
                            );
                            self.arm(self.channel_a);
                        }
                    }
                }
            }
        }
    }

    fn on_bytes_received(&mut self, bytes: &[u8]) {
        match self.link.on_bytes_received(bytes) {
            AckOutcome::Acknowledged => {
                if self.state != PipelineState::WaitingForAck {
                    // Gate and state machine disagree; drop the token rather
                    // than resume a stream nobody is waiting on
                    self.stats.ignored_rx_windows += 1;
                    tracing::warn!("ack token in state {}; dropped", self.state);
                    return;
                }
                self.stats.acks_received += 1;
                let sequence = self.framer.sequence().wrapping_sub(1);
                tracing::debug!("frame {} acknowledged", sequence);

                if let Err(e) = self.link.send_raw(self.framer.ack_reply()) {
                    self.fail_transport(e.to_string());
                    return;
                }
                let _ = self
                    .message_tx
                    .try_send(PipelineMessage::AckReceived { sequence });

                // The gate is open again; resume acquisition
                self.arm(self.channel_a);
            }
            AckOutcome::Ignored => {
                self.stats.ignored_rx_windows += 1;
                tracing::trace!("ignored {} inbound bytes", bytes.len());
            }
        }
    }

    /// Frame `value`, send it, and close the gate
    fn emit_frame(&mut self, value: FrameValue) {
        let sequence = self.framer.sequence();
        let bytes = self.framer.frame(value);
        match self.link.send_frame(&bytes) {
            Ok(()) => {
                self.state = PipelineState::WaitingForAck;
                self.stats.frames_sent += 1;
                tracing::debug!("frame {} sent ({} bytes)", sequence, bytes.len());
                let _ = self
                    .message_tx
                    .try_send(PipelineMessage::FrameSent { sequence, value });
            }
            Err(e) => {
                self.stats.send_failures += 1;
                self.fail_transport(e.to_string());
            }
        }
    }

    /// Arm `channel`, updating state; on failure stop streaming and report
    fn arm(&mut self, channel: ChannelId) {
        match self.source.arm(channel) {
            Ok(()) => self.state = PipelineState::Sampling(channel),
            Err(e) => {
                self.stats.arm_failures += 1;
                self.state = PipelineState::Idle;
                tracing::error!("arm failed on channel {}: {}", channel, e);
                let _ = self.message_tx.send(PipelineMessage::DeviceError {
                    channel,
                    error: e.to_string(),
                });
            }
        }
    }

    fn fail_transport(&mut self, error: String) {
        self.state = PipelineState::Idle;
        tracing::error!("transport failed: {}", error);
        let _ = self
            .message_tx
            .send(PipelineMessage::TransportError(error));
    }

    fn send_stats(&mut self) {
        let _ = self
            .message_tx
            .try_send(PipelineMessage::Stats(self.stats.clone()));
    }

    /// Current pipeline state (test hook)
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Current stats snapshot (test hook)
    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::SimAdcBackend;
    use crate::types::BufferSlot;
    use crossbeam_channel::bounded;
    use std::sync::{Arc, Mutex};

    /// Transport stub that records sends; inbound bytes are injected by the
    /// tests through the event channel directly.
    struct RecordingTransport {
        sent: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl ByteTransport for RecordingTransport {
        fn bind(&mut self, _events: Sender<PipelineEvent>) {}
        fn send(&mut self, bytes: &[u8]) -> Result<()> {
            self.sent.lock().unwrap().push(bytes.to_vec());
            Ok(())
        }
        fn describe(&self) -> &str {
            "recording transport"
        }
    }

    struct Harness {
        orchestrator: PipelineOrchestrator,
        event_rx_probe: Receiver<PipelineEvent>,
        message_rx: Receiver<PipelineMessage>,
        sent: Arc<Mutex<Vec<Vec<u8>>>>,
        armed: Arc<Mutex<Vec<(ChannelId, BufferSlot)>>>,
    }

    impl Harness {
        fn new(config: PipelineConfig, sim: SimAdcBackend) -> Self {
            let (event_tx, event_rx) = bounded(64);
            let (_cmd_tx, cmd_rx) = bounded::<PipelineCommand>(16);
            let (msg_tx, msg_rx) = bounded(256);
            let sent = Arc::new(Mutex::new(Vec::new()));
            let armed = sim.armed_log();

            let orchestrator = PipelineOrchestrator::new(
                &config,
                Box::new(sim),
                Box::new(RecordingTransport { sent: sent.clone() }),
                event_tx,
                event_rx.clone(),
                cmd_rx,
                msg_tx,
            )
            .unwrap();

            Self {
                orchestrator,
                event_rx_probe: event_rx,
                message_rx: msg_rx,
                sent,
                armed,
            }
        }

        /// Dispatch queued completion events until the loop would block
        fn pump(&mut self) {
            while let Ok(event) = self.event_rx_probe.try_recv() {
                self.orchestrator.handle_event(event);
            }
        }

        fn inject_rx(&mut self, bytes: &[u8]) {
            self.orchestrator
                .handle_event(PipelineEvent::BytesReceived(bytes.to_vec()));
            self.pump();
        }

        fn sent(&self) -> Vec<Vec<u8>> {
            self.sent.lock().unwrap().clone()
        }

        fn messages(&self) -> Vec<PipelineMessage> {
            let mut out = Vec::new();
            while let Ok(msg) = self.message_rx.try_recv() {
                out.push(msg);
            }
            out
        }
    }

    fn single_channel_config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.channels.truncate(1);
        config
    }

    #[test]
    fn test_mode_from_channel_count() {
        let harness = Harness::new(single_channel_config(), SimAdcBackend::new());
        assert_eq!(harness.orchestrator.mode(), PipelineMode::Continuous);

        let harness = Harness::new(PipelineConfig::default(), SimAdcBackend::new());
        assert_eq!(harness.orchestrator.mode(), PipelineMode::Differential);
    }

    #[test]
    fn test_differential_round() {
        let sim = SimAdcBackend::new()
            .with_readings(ChannelId(0), vec![vec![100]])
            .with_readings(ChannelId(1), vec![vec![60]]);
        let mut harness = Harness::new(PipelineConfig::default(), sim);

        harness.orchestrator.handle_command(PipelineCommand::Start);
        harness.pump();

        // One frame on the wire, gate closed
        assert_eq!(harness.sent(), vec![b"0,40;\0".to_vec()]);
        assert_eq!(harness.orchestrator.state(), PipelineState::WaitingForAck);

        // Both channels sampled their first buffer
        assert_eq!(
            *harness.armed.lock().unwrap(),
            vec![
                (ChannelId(0), BufferSlot::One),
                (ChannelId(1), BufferSlot::One)
            ]
        );

        // Ack: reply goes out and channel A re-arms on its other buffer
        harness.inject_rx(b"end");
        assert_eq!(
            harness.sent(),
            vec![b"0,40;\0".to_vec(), b"\r\n\0".to_vec()]
        );
        assert_eq!(
            harness.armed.lock().unwrap().last().unwrap(),
            &(ChannelId(0), BufferSlot::Two)
        );
        assert_eq!(
            harness.orchestrator.state(),
            PipelineState::Sampling(ChannelId(0))
        );
    }

    #[test]
    fn test_partial_token_does_not_release_gate() {
        let sim = SimAdcBackend::new()
            .with_readings(ChannelId(0), vec![vec![100]])
            .with_readings(ChannelId(1), vec![vec![60]]);
        let mut harness = Harness::new(PipelineConfig::default(), sim);

        harness.orchestrator.handle_command(PipelineCommand::Start);
        harness.pump();

        for window in [&b"e"[..], b"en", b"enX"] {
            harness.inject_rx(window);
            assert_eq!(harness.orchestrator.state(), PipelineState::WaitingForAck);
        }
        // Still only the one frame, no reply
        assert_eq!(harness.sent().len(), 1);
        assert_eq!(harness.orchestrator.stats().ignored_rx_windows, 3);
    }

    #[test]
    fn test_continuous_sequence_and_gating() {
        let readings: Vec<Vec<u16>> = vec![vec![10], vec![20], vec![30], vec![40], vec![50]];
        let sim = SimAdcBackend::new().with_readings(ChannelId(0), readings);
        let mut harness = Harness::new(single_channel_config(), sim);

        harness.orchestrator.handle_command(PipelineCommand::Start);
        harness.pump();

        for (i, value) in [10u16, 20, 30, 40, 50].iter().enumerate() {
            let frames = harness.sent();
            // Data frames sit at even indices, ack replies between them
            assert_eq!(
                frames.last().unwrap(),
                &format!("{},{};\0", i, value).into_bytes()
            );
            assert_eq!(harness.orchestrator.state(), PipelineState::WaitingForAck);
            harness.inject_rx(b"end");
        }

        assert_eq!(harness.orchestrator.stats().frames_sent, 5);
        assert_eq!(harness.orchestrator.stats().acks_received, 5);
        // 5 frames + 5 replies
        assert_eq!(harness.sent().len(), 10);

        // Strict ping-pong alternation on the single pair
        let armed = harness.armed.lock().unwrap();
        for pair in armed.windows(2) {
            assert_eq!(pair[1].1, pair[0].1.other());
        }
    }

    #[test]
    fn test_stop_reclaims_inflight_window() {
        let sim = SimAdcBackend::new().with_readings(ChannelId(0), vec![vec![10], vec![20]]);
        let mut harness = Harness::new(single_channel_config(), sim);

        harness.orchestrator.handle_command(PipelineCommand::Start);
        // Stop before the completion is dispatched
        harness.orchestrator.handle_command(PipelineCommand::Stop);
        harness.pump();

        assert_eq!(harness.orchestrator.state(), PipelineState::Idle);
        assert_eq!(harness.orchestrator.stats().overruns, 1);
        assert!(harness.sent().is_empty());

        // The buffer came back: a fresh start arms cleanly
        harness.orchestrator.handle_command(PipelineCommand::Start);
        harness.pump();
        assert_eq!(harness.sent(), vec![b"0,20;\0".to_vec()]);
    }

    #[test]
    fn test_ack_after_stop_does_not_resume() {
        let sim = SimAdcBackend::new()
            .with_readings(ChannelId(0), vec![vec![100]])
            .with_readings(ChannelId(1), vec![vec![60]]);
        let mut harness = Harness::new(PipelineConfig::default(), sim);

        harness.orchestrator.handle_command(PipelineCommand::Start);
        harness.pump();
        assert_eq!(harness.sent().len(), 1);
        assert_eq!(harness.orchestrator.state(), PipelineState::WaitingForAck);

        harness.orchestrator.handle_command(PipelineCommand::Stop);
        assert_eq!(harness.orchestrator.state(), PipelineState::Idle);

        // The peer acks the frame it already received; valid input, but the
        // stream was stopped and must stay stopped
        let armed_before = harness.armed.lock().unwrap().len();
        harness.inject_rx(b"end");
        assert_eq!(harness.orchestrator.state(), PipelineState::Idle);
        assert_eq!(harness.sent().len(), 1, "no reply, no new frame");
        assert_eq!(harness.orchestrator.stats().acks_received, 0);
        assert_eq!(harness.orchestrator.stats().ignored_rx_windows, 1);
        assert_eq!(harness.armed.lock().unwrap().len(), armed_before);
    }

    #[test]
    fn test_frame_sent_messages_carry_sequence() {
        let sim = SimAdcBackend::new()
            .with_readings(ChannelId(0), vec![vec![100]])
            .with_readings(ChannelId(1), vec![vec![60]]);
        let mut harness = Harness::new(PipelineConfig::default(), sim);

        harness.orchestrator.handle_command(PipelineCommand::Start);
        harness.pump();
        harness.inject_rx(b"end");

        let messages = harness.messages();
        assert!(messages.contains(&PipelineMessage::FrameSent {
            sequence: 0,
            value: FrameValue::Signed(40)
        }));
        assert!(messages.contains(&PipelineMessage::AckReceived { sequence: 0 }));
    }

    #[test]
    fn test_write_complete_is_swallowed() {
        let mut harness = Harness::new(single_channel_config(), SimAdcBackend::new());
        harness
            .orchestrator
            .handle_event(PipelineEvent::WriteComplete);
        assert_eq!(harness.orchestrator.stats().writes_completed, 1);
        assert_eq!(harness.orchestrator.state(), PipelineState::Idle);
    }
}
