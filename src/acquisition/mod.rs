//! Acquisition seam: the device trait and the sample source
//!
//! This module provides a common trait for acquisition devices, enabling both
//! real hardware front ends and the simulated backend used by tests and the
//! demo daemon, plus [`SampleSource`], which owns the ping-pong buffer pairs
//! and enforces the one-outstanding-conversion-per-channel invariant.
//!
//! # Completion contract
//!
//! A capability completes each accepted [`ConversionRequest`] exactly once by
//! sending [`PipelineEvent::SampleReady`] carrying the filled buffer back.
//! The completion handler must return the buffer to the pair (via
//! [`SampleSource::release`]) before anything else can be armed on that slot;
//! failing to do so stalls the acquisition stream and silently drops the next
//! sample window.

pub mod sim;

pub use sim::{SimAdcBackend, SimPattern};

use crate::error::{PipelineError, Result};
use crate::pipeline::PipelineEvent;
use crate::types::{Channel, ChannelId, PingPongPair, SampleBuffer};
use crossbeam_channel::Sender;

/// A (channel, target buffer) pair submitted to the acquisition device
#[derive(Debug)]
pub struct ConversionRequest {
    /// Logical channel to sample
    pub channel: ChannelId,
    /// Buffer the device fills; returned by the completion event
    pub buffer: SampleBuffer,
}

/// A conversion the device refused, with the untouched request handed back
/// so the buffer can rejoin its pair.
#[derive(Debug)]
pub struct RejectedRequest {
    /// The request exactly as submitted
    pub request: ConversionRequest,
    /// Why the device refused it
    pub error: PipelineError,
}

/// Unified interface for acquisition devices.
///
/// Implementations must be `Send` so the pipeline can own them on its worker
/// thread. `convert` is asynchronous: it enqueues the request and returns;
/// completion arrives later as a [`PipelineEvent::SampleReady`]. A rejected
/// request must produce no completion event and must return the request in
/// the [`RejectedRequest`], keeping the buffer owned somewhere at all times.
pub trait AdcCapability: Send {
    /// Tell the capability where completion events go. Called once at setup,
    /// before the first `convert`.
    fn bind(&mut self, events: Sender<PipelineEvent>);

    /// Begin filling the request's buffer with samples
    fn convert(&mut self, request: ConversionRequest)
        -> std::result::Result<(), RejectedRequest>;

    /// Human-readable device description for diagnostics
    fn describe(&self) -> &str;
}

struct ChannelRuntime {
    channel: Channel,
    pair: PingPongPair,
    outstanding: bool,
}

/// Owns the acquisition capability and one ping-pong pair per channel.
///
/// All mutation happens on the pipeline thread; the source is the sole
/// authority on buffer ownership and on whether a conversion is in flight.
pub struct SampleSource {
    capability: Box<dyn AdcCapability>,
    channels: Vec<ChannelRuntime>,
}

impl SampleSource {
    /// Create a source for the given channels, each with a fresh buffer pair
    pub fn new(
        capability: Box<dyn AdcCapability>,
        channels: Vec<Channel>,
        buffer_size: usize,
    ) -> Self {
        let channels = channels
            .into_iter()
            .map(|channel| ChannelRuntime {
                pair: PingPongPair::new(channel.id, buffer_size),
                channel,
                outstanding: false,
            })
            .collect();
        Self {
            capability,
            channels,
        }
    }

    /// Forward the event sender to the capability
    pub fn bind(&mut self, events: Sender<PipelineEvent>) {
        self.capability.bind(events);
    }

    /// Device description for diagnostics
    pub fn describe(&self) -> &str {
        self.capability.describe()
    }

    fn runtime(&self, id: ChannelId) -> Result<&ChannelRuntime> {
        self.channels
            .iter()
            .find(|rt| rt.channel.id == id)
            .ok_or_else(|| PipelineError::Channel(format!("unknown channel {}", id)))
    }

    fn runtime_mut(&mut self, id: ChannelId) -> Result<&mut ChannelRuntime> {
        self.channels
            .iter_mut()
            .find(|rt| rt.channel.id == id)
            .ok_or_else(|| PipelineError::Channel(format!("unknown channel {}", id)))
    }

    /// The configuration of a channel
    pub fn channel(&self, id: ChannelId) -> Result<&Channel> {
        self.runtime(id).map(|rt| &rt.channel)
    }

    /// True if a conversion is in flight on the channel
    pub fn is_outstanding(&self, id: ChannelId) -> bool {
        self.runtime(id).map(|rt| rt.outstanding).unwrap_or(false)
    }

    /// Arm the channel: take its filling buffer and submit a conversion.
    ///
    /// Fails with [`PipelineError::AcquisitionBusy`] if a request is already
    /// outstanding (the state machine makes this unreachable), or with a
    /// device error if the capability rejects the request. A rejected request
    /// hands its buffer back to the pair and clears the outstanding flag, so
    /// the channel can be re-armed after a later `Start`.
    pub fn arm(&mut self, id: ChannelId) -> Result<()> {
        let rt = self.runtime_mut(id)?;
        if rt.outstanding {
            return Err(PipelineError::AcquisitionBusy { channel: id });
        }
        let buffer = rt
            .pair
            .take_filling()
            .ok_or(PipelineError::AcquisitionBusy { channel: id })?;
        rt.outstanding = true;
        match self.capability.convert(ConversionRequest {
            channel: id,
            buffer,
        }) {
            Ok(()) => Ok(()),
            Err(rejected) => {
                let rt = self.runtime_mut(id)?;
                rt.outstanding = false;
                rt.pair.put_back(rejected.request.buffer);
                Err(PipelineError::Device(format!(
                    "arm failed on channel {}: {}",
                    id, rejected.error
                )))
            }
        }
    }

    /// Record the completion of the channel's in-flight conversion
    pub fn complete(&mut self, id: ChannelId) -> Result<()> {
        let rt = self.runtime_mut(id)?;
        if !rt.outstanding {
            tracing::warn!("completion for channel {} with no request in flight", id);
        }
        rt.outstanding = false;
        Ok(())
    }

    /// Return a consumed buffer to its pair, flipping the filling tag so the
    /// next arm uses the other slot.
    pub fn release(&mut self, id: ChannelId, buffer: SampleBuffer) -> Result<()> {
        let rt = self.runtime_mut(id)?;
        rt.pair.store(buffer);
        Ok(())
    }
}
