//! # adcstream-rs: flow-controlled ADC telemetry pipeline
//!
//! A continuous-sampling pipeline that reads blocks of raw ADC samples
//! through double-buffered (ping-pong) acquisition, converts them to
//! calibrated units, and streams them to a consumer as sequence-numbered
//! ASCII frames gated by an explicit acknowledgement token.
//!
//! ## Architecture
//!
//! - **Acquisition**: an [`acquisition::AdcCapability`] device fills one
//!   buffer of a per-channel ping-pong pair while the pipeline consumes the
//!   other; buffers travel by move through a crossbeam channel
//! - **Conversion**: [`convert::UnitConverter`] applies per-channel
//!   calibration; two-channel setups combine a pair of readings into one
//!   signed differential value
//! - **Framing**: [`framer::TelemetryFramer`] renders `"<seq>,<value>;"`
//!   ASCII frames with a trailing NUL
//! - **Flow control**: [`transport::FlowControlledLink`] holds exactly one
//!   frame in flight until the consumer sends the `end` token
//! - **Orchestration**: a single worker thread multiplexes commands and
//!   completion events with `crossbeam_channel::select!`; no locks
//!
//! ## Example
//!
//! ```no_run
//! use adcstream_rs::{
//!     acquisition::{SimAdcBackend, SimPattern},
//!     config::PipelineConfig,
//!     pipeline::{PipelineMessage, TelemetryPipeline},
//!     transport::tcp::TcpTransport,
//! };
//! use std::net::TcpListener;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = PipelineConfig::default();
//!
//!     let listener = TcpListener::bind(&config.listen_addr)?;
//!     let (stream, _peer) = listener.accept()?;
//!
//!     let adc = SimAdcBackend::new().with_pattern(SimPattern::Ramp { start: 0, step: 1 });
//!     let transport = TcpTransport::new(stream)?;
//!
//!     let (pipeline, handle) = TelemetryPipeline::new(config, Box::new(adc), Box::new(transport));
//!     let worker = std::thread::spawn(move || pipeline.run());
//!
//!     handle.start();
//!     loop {
//!         for message in handle.drain() {
//!             if matches!(message, PipelineMessage::Shutdown) {
//!                 worker.join().ok();
//!                 return Ok(());
//!             }
//!         }
//!         std::thread::sleep(std::time::Duration::from_millis(50));
//!     }
//! }
//! ```

pub mod acquisition;
pub mod config;
pub mod convert;
pub mod error;
pub mod framer;
pub mod pipeline;
pub mod transport;
pub mod types;

// Re-export commonly used types
pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use pipeline::{
    PipelineCommand, PipelineEvent, PipelineHandle, PipelineMessage, TelemetryPipeline,
};
pub use types::{CalibratedValue, Channel, ChannelId, FrameValue, PipelineState, PipelineStats};
