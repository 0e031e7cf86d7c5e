//! Pipeline wiring: commands, messages, events, and the worker entry point
//!
//! The pipeline runs on its own thread, communicating with the embedding
//! process via channels:
//!
//! - [`PipelineCommand`] - sent from the embedder to the pipeline (start,
//!   stop, stats, shutdown)
//! - [`PipelineMessage`] - sent from the pipeline to the embedder (readiness,
//!   frames, acks, errors, stats)
//! - [`PipelineEvent`] - completion callbacks from the acquisition device and
//!   the transport, multiplexed onto one channel so that exactly one handler
//!   runs at a time
//! - [`PipelineHandle`] - embedder-side handle for commands and messages
//!
//! # Example
//!
//! ```ignore
//! use adcstream_rs::acquisition::{SimAdcBackend, SimPattern};
//! use adcstream_rs::config::PipelineConfig;
//! use adcstream_rs::pipeline::TelemetryPipeline;
//!
//! let config = PipelineConfig::default();
//! let adc = SimAdcBackend::new().with_pattern(SimPattern::Ramp { start: 0, step: 1 });
//! let (pipeline, handle) = TelemetryPipeline::new(config, Box::new(adc), transport);
//!
//! std::thread::spawn(move || pipeline.run());
//! handle.start();
//! for msg in handle.drain() { /* ... */ }
//! ```

pub mod orchestrator;

pub use orchestrator::{PipelineMode, PipelineOrchestrator};

use crate::acquisition::AdcCapability;
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::transport::ByteTransport;
use crate::types::{ChannelId, FrameValue, PipelineStats, SampleBuffer};
use crossbeam_channel::{bounded, Receiver, Sender};

/// Completion callback from a collaborator, dispatched on the pipeline thread
#[derive(Debug)]
pub enum PipelineEvent {
    /// A conversion finished; the filled buffer comes back with it
    SampleReady {
        /// Channel the conversion ran on
        channel: ChannelId,
        /// The buffer that was armed, now holding `count` samples
        buffer: SampleBuffer,
        /// Number of valid sample words
        count: usize,
    },
    /// One inbound receive window from the transport
    BytesReceived(Vec<u8>),
    /// A send finished; exists to satisfy the transport contract, no action
    WriteComplete,
}

/// Message sent from the embedder to the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineCommand {
    /// Arm the first channel and begin streaming
    Start,
    /// Stop arming; in-flight completions are reclaimed and dropped
    Stop,
    /// Request an immediate stats message
    RequestStats,
    /// Exit the pipeline loop
    Shutdown,
}

/// Message sent from the pipeline to the embedder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineMessage {
    /// Setup finished; the pipeline is ready for `Start`
    Started,
    /// A data frame was handed to the transport
    FrameSent { sequence: u32, value: FrameValue },
    /// The ack token was observed and the reply sent
    AckReceived { sequence: u32 },
    /// The acquisition device failed in steady state; arming stopped
    DeviceError { channel: ChannelId, error: String },
    /// The transport failed in steady state; arming stopped
    TransportError(String),
    /// Statistics update
    Stats(PipelineStats),
    /// Unrecoverable setup failure; the pipeline is aborting
    Fatal(String),
    /// The pipeline loop has exited
    Shutdown,
}

/// Embedder-side handle for the pipeline thread
pub struct PipelineHandle {
    /// Receiver for pipeline messages
    pub receiver: Receiver<PipelineMessage>,
    /// Sender for commands to the pipeline
    pub command_sender: Sender<PipelineCommand>,
}

impl PipelineHandle {
    /// Try to receive a message without blocking
    pub fn try_recv(&self) -> Option<PipelineMessage> {
        self.receiver.try_recv().ok()
    }

    /// Receive all pending messages
    pub fn drain(&self) -> Vec<PipelineMessage> {
        let mut messages = Vec::new();
        while let Ok(msg) = self.receiver.try_recv() {
            messages.push(msg);
        }
        messages
    }

    /// Send a command to the pipeline
    pub fn send_command(&self, cmd: PipelineCommand) -> bool {
        self.command_sender.send(cmd).is_ok()
    }

    /// Begin streaming
    pub fn start(&self) {
        let _ = self.command_sender.send(PipelineCommand::Start);
    }

    /// Stop arming new conversions
    pub fn stop(&self) {
        let _ = self.command_sender.send(PipelineCommand::Stop);
    }

    /// Request an immediate stats message
    pub fn request_stats(&self) {
        let _ = self.command_sender.send(PipelineCommand::RequestStats);
    }

    /// Request shutdown
    pub fn shutdown(&self) {
        let _ = self.command_sender.send(PipelineCommand::Shutdown);
    }
}

/// The telemetry pipeline, run on a dedicated thread
pub struct TelemetryPipeline {
    config: PipelineConfig,
    adc: Box<dyn AdcCapability>,
    transport: Box<dyn ByteTransport>,
    command_receiver: Receiver<PipelineCommand>,
    message_sender: Sender<PipelineMessage>,
}

impl TelemetryPipeline {
    /// Create a pipeline with its communication channels
    pub fn new(
        config: PipelineConfig,
        adc: Box<dyn AdcCapability>,
        transport: Box<dyn ByteTransport>,
    ) -> (Self, PipelineHandle) {
        let (cmd_tx, cmd_rx) = bounded(256);
        // Bounded message channel for backpressure if the embedder lags
        let (msg_tx, msg_rx) = bounded(10_000);

        let pipeline = Self {
            config,
            adc,
            transport,
            command_receiver: cmd_rx,
            message_sender: msg_tx,
        };

        let handle = PipelineHandle {
            receiver: msg_rx,
            command_sender: cmd_tx,
        };

        (pipeline, handle)
    }

    /// Run the pipeline loop until shutdown.
    ///
    /// Setup failures emit [`PipelineMessage::Fatal`] and return the error;
    /// this is the process's fatal-abort hook.
    pub fn run(self) -> Result<()> {
        // Events from both collaborators share one channel; buffers ride
        // along, so the channel is the ownership hand-off point.
        let (event_tx, event_rx) = bounded(256);

        let mut orchestrator = match PipelineOrchestrator::new(
            &self.config,
            self.adc,
            self.transport,
            event_tx,
            event_rx,
            self.command_receiver,
            self.message_sender.clone(),
        ) {
            Ok(orchestrator) => orchestrator,
            Err(e) => {
                tracing::error!("pipeline setup failed: {}", e);
                let _ = self
                    .message_sender
                    .send(PipelineMessage::Fatal(e.to_string()));
                return Err(e);
            }
        };

        orchestrator.run();
        Ok(())
    }
}
