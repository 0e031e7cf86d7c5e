//! Simulated acquisition backend
//!
//! A software stand-in for the analog front end, used by the test suite and
//! as the demo daemon's default device. It can either replay scripted per-
//! channel reading blocks (deterministic tests) or generate samples from a
//! pattern (open-ended streaming).
//!
//! Completions are emitted synchronously from `convert`, which models a fast
//! device and keeps tests deterministic: the pipeline thread picks the event
//! up on its next loop iteration, so the single-handler-at-a-time invariant
//! holds unchanged.
//!
//! # Example
//!
//! ```ignore
//! let sim = SimAdcBackend::new()
//!     .with_readings(ChannelId(0), vec![vec![100]])
//!     .with_readings(ChannelId(1), vec![vec![60]]);
//! let armed = sim.armed_log();
//! // ... run the pipeline, then assert on armed slots
//! ```

use crate::acquisition::{AdcCapability, ConversionRequest, RejectedRequest};
use crate::error::PipelineError;
use crate::pipeline::PipelineEvent;
use crate::types::{BufferSlot, ChannelId};
use crossbeam_channel::Sender;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// Pattern for generating simulated sample words
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimPattern {
    /// Every sample word is the same value
    Constant(u16),
    /// Samples count up from `start` by `step`, wrapping at u16
    Ramp { start: u16, step: u16 },
}

/// Simulated acquisition device.
///
/// Scripted readings take precedence over the pattern; a channel with neither
/// accepts the arm but never completes, which parks the pipeline in its
/// sampling state.
pub struct SimAdcBackend {
    events: Option<Sender<PipelineEvent>>,
    scripted: HashMap<ChannelId, VecDeque<Vec<u16>>>,
    pattern: Option<SimPattern>,
    ramp_state: HashMap<ChannelId, u16>,
    armed_log: Arc<Mutex<Vec<(ChannelId, BufferSlot)>>>,
}

impl SimAdcBackend {
    /// Create a backend with no scripted readings and no pattern
    pub fn new() -> Self {
        Self {
            events: None,
            scripted: HashMap::new(),
            pattern: None,
            ramp_state: HashMap::new(),
            armed_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue scripted reading blocks for a channel, replayed in order
    pub fn with_readings(mut self, channel: ChannelId, readings: Vec<Vec<u16>>) -> Self {
        self.scripted
            .entry(channel)
            .or_default()
            .extend(readings);
        self
    }

    /// Generate samples from `pattern` once a channel's script runs out
    pub fn with_pattern(mut self, pattern: SimPattern) -> Self {
        self.pattern = Some(pattern);
        self
    }

    /// Shared log of every (channel, slot) this device was armed with, in
    /// order. Tests use it to assert strict ping-pong alternation.
    pub fn armed_log(&self) -> Arc<Mutex<Vec<(ChannelId, BufferSlot)>>> {
        self.armed_log.clone()
    }

    fn next_block(&mut self, channel: ChannelId, capacity: usize) -> Option<Vec<u16>> {
        if let Some(queue) = self.scripted.get_mut(&channel) {
            if let Some(block) = queue.pop_front() {
                return Some(block);
            }
        }
        match self.pattern? {
            SimPattern::Constant(v) => Some(vec![v; capacity]),
            SimPattern::Ramp { start, step } => {
                let next = self.ramp_state.entry(channel).or_insert(start);
                let block = (0..capacity)
                    .map(|_| {
                        let v = *next;
                        *next = next.wrapping_add(step);
                        v
                    })
                    .collect();
                Some(block)
            }
        }
    }
}

impl Default for SimAdcBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AdcCapability for SimAdcBackend {
    fn bind(&mut self, events: Sender<PipelineEvent>) {
        self.events = Some(events);
    }

    fn convert(
        &mut self,
        request: ConversionRequest,
    ) -> std::result::Result<(), RejectedRequest> {
        let Some(events) = self.events.clone() else {
            return Err(RejectedRequest {
                error: PipelineError::Setup("sim device armed before bind".to_string()),
                request,
            });
        };

        let ConversionRequest {
            channel,
            mut buffer,
        } = request;

        self.armed_log
            .lock()
            .expect("armed log poisoned")
            .push((channel, buffer.slot()));

        let Some(block) = self.next_block(channel, buffer.capacity()) else {
            // Nothing scripted and no pattern: accept the arm, never complete
            tracing::debug!("sim channel {} has no more readings", channel);
            return Ok(());
        };

        let count = buffer.fill(&block);
        if let Err(undelivered) = events.send(PipelineEvent::SampleReady {
            channel,
            buffer,
            count,
        }) {
            // Recover the buffer from the undelivered event
            let PipelineEvent::SampleReady { channel, buffer, .. } = undelivered.0 else {
                unreachable!("convert only sends SampleReady");
            };
            return Err(RejectedRequest {
                request: ConversionRequest { channel, buffer },
                error: PipelineError::Channel("event channel closed".to_string()),
            });
        }
        Ok(())
    }

    fn describe(&self) -> &str {
        "simulated acquisition device"
    }
}
