//! Core data types for the sampling pipeline
//!
//! This module contains the fundamental data structures used throughout
//! the crate for representing channels, sample buffers, and pipeline state.
//!
//! # Main Types
//!
//! - [`Channel`] - One logical analog input with its calibration parameters
//! - [`SampleBuffer`] - A fixed-capacity block of raw sample words
//! - [`PingPongPair`] - Two buffers alternately owned by hardware and software
//! - [`FrameValue`] - The value carried by one telemetry frame
//! - [`PipelineState`] - The pipeline's process-lifetime state machine
//! - [`PipelineStats`] - Running counters for pipeline activity
//!
//! # Buffer Ownership
//!
//! A [`PingPongPair`] holds each buffer in an `Option` slot. Arming takes the
//! filling buffer *out* of the pair and moves it to the acquisition device;
//! completion moves it back via [`PingPongPair::store`], which flips the
//! filling tag so the next arm uses the other slot. Because buffers move, the
//! block handed to the converter can never alias the one being filled.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one logical analog input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub u8);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Offset/gain parameters turning raw sample words into physical units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Calibration {
    /// Added after scaling, in output units
    pub offset: i64,
    /// Multiplier applied to the raw sample word
    pub gain: i64,
}

impl Default for Calibration {
    fn default() -> Self {
        Self { offset: 0, gain: 1 }
    }
}

impl Calibration {
    /// Apply the calibration to one raw sample word.
    ///
    /// The result is truncated to the unsigned 32-bit storage the wire format
    /// uses; out-of-range results wrap rather than clamp, at every width.
    pub fn apply(&self, raw: u16) -> u32 {
        (raw as i64)
            .wrapping_mul(self.gain)
            .wrapping_add(self.offset) as u32
    }
}

/// One configured logical input. Immutable after configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    /// Logical identifier used throughout the pipeline
    pub id: ChannelId,
    /// Device-level channel index (the mux input on the front end)
    pub adc_channel: u8,
    /// Calibration parameters for this input
    pub calibration: Calibration,
}

/// Which half of a ping-pong pair a buffer is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferSlot {
    One,
    Two,
}

impl BufferSlot {
    /// The other half of the pair
    pub fn other(self) -> Self {
        match self {
            BufferSlot::One => BufferSlot::Two,
            BufferSlot::Two => BufferSlot::One,
        }
    }
}

/// A fixed-capacity container of raw sample words for exactly one channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleBuffer {
    channel: ChannelId,
    slot: BufferSlot,
    data: Vec<u16>,
    len: usize,
}

impl SampleBuffer {
    /// Create an empty buffer with the given capacity
    pub fn new(channel: ChannelId, slot: BufferSlot, capacity: usize) -> Self {
        Self {
            channel,
            slot,
            data: vec![0; capacity],
            len: 0,
        }
    }

    /// The channel this buffer belongs to
    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    /// Which half of the pair this buffer is
    pub fn slot(&self) -> BufferSlot {
        self.slot
    }

    /// Fixed capacity in sample words
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of valid sample words
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if no samples have been written
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The valid sample words
    pub fn samples(&self) -> &[u16] {
        &self.data[..self.len]
    }

    /// Overwrite the buffer contents with `samples`, truncating to capacity.
    /// Returns the number of words stored.
    pub fn fill(&mut self, samples: &[u16]) -> usize {
        let n = samples.len().min(self.data.len());
        self.data[..n].copy_from_slice(&samples[..n]);
        self.len = n;
        n
    }

    /// Discard the contents, keeping the allocation
    pub fn clear(&mut self) {
        self.len = 0;
    }
}

/// Two uniquely-owned buffer slots forming a ping-pong pair.
///
/// At any instant at most one buffer may be out of the pair (armed for
/// hardware fill); the other is available for software. The `filling` tag is
/// the only permitted ownership transfer point.
#[derive(Debug)]
pub struct PingPongPair {
    one: Option<SampleBuffer>,
    two: Option<SampleBuffer>,
    filling: BufferSlot,
}

impl PingPongPair {
    /// Create a pair of empty buffers for `channel`
    pub fn new(channel: ChannelId, capacity: usize) -> Self {
        Self {
            one: Some(SampleBuffer::new(channel, BufferSlot::One, capacity)),
            two: Some(SampleBuffer::new(channel, BufferSlot::Two, capacity)),
            filling: BufferSlot::One,
        }
    }

    /// Which slot the next arm will hand to hardware
    pub fn filling(&self) -> BufferSlot {
        self.filling
    }

    /// True if a buffer is currently out of the pair
    pub fn outstanding(&self) -> bool {
        self.one.is_none() || self.two.is_none()
    }

    /// Take the buffer currently tagged for filling, or `None` if it is
    /// already out with the hardware.
    pub fn take_filling(&mut self) -> Option<SampleBuffer> {
        match self.filling {
            BufferSlot::One => self.one.take(),
            BufferSlot::Two => self.two.take(),
        }
    }

    /// Restore an unconsumed buffer to its slot without flipping the filling
    /// tag. Used when a submission is rejected and the buffer never reached
    /// the hardware, so the next arm retries the same slot.
    pub fn put_back(&mut self, buffer: SampleBuffer) {
        let slot = buffer.slot();
        match slot {
            BufferSlot::One => {
                debug_assert!(self.one.is_none(), "slot One restored twice");
                self.one = Some(buffer);
            }
            BufferSlot::Two => {
                debug_assert!(self.two.is_none(), "slot Two restored twice");
                self.two = Some(buffer);
            }
        }
    }

    /// Return a completed buffer to its slot and flip the filling tag so the
    /// next arm uses the other buffer.
    pub fn store(&mut self, buffer: SampleBuffer) {
        let slot = buffer.slot();
        match slot {
            BufferSlot::One => {
                debug_assert!(self.one.is_none(), "slot One stored twice");
                self.one = Some(buffer);
            }
            BufferSlot::Two => {
                debug_assert!(self.two.is_none(), "slot Two stored twice");
                self.two = Some(buffer);
            }
        }
        self.filling = slot.other();
    }
}

/// A raw sample block transformed into physical units (microvolt counts)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibratedValue(pub u32);

impl fmt::Display for CalibratedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The value carried by one telemetry frame.
///
/// Single-channel mode emits the calibrated reading unsigned; differential
/// mode emits the combined value signed (negatives get a leading `-`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameValue {
    Unsigned(u32),
    Signed(i64),
}

impl fmt::Display for FrameValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameValue::Unsigned(v) => write!(f, "{}", v),
            FrameValue::Signed(v) => write!(f, "{}", v),
        }
    }
}

impl From<CalibratedValue> for FrameValue {
    fn from(v: CalibratedValue) -> Self {
        FrameValue::Unsigned(v.0)
    }
}

impl From<i64> for FrameValue {
    fn from(v: i64) -> Self {
        FrameValue::Signed(v)
    }
}

/// Process-lifetime state machine of the pipeline.
///
/// With two channels configured, `Sampling(a)` / `Sampling(b)` are the
/// waiting-for-channel states; with one channel the machine collapses to
/// `Idle` / `Sampling` / `WaitingForAck`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Not armed; before start, after stop, or after a steady-state failure
    Idle,
    /// A conversion is outstanding on the given channel
    Sampling(ChannelId),
    /// A frame is on the wire; emission is gated until the ack token arrives
    WaitingForAck,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Idle => write!(f, "idle"),
            PipelineState::Sampling(ch) => write!(f, "sampling(ch{})", ch),
            PipelineState::WaitingForAck => write!(f, "waiting-for-ack"),
        }
    }
}

/// Running counters for pipeline activity
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Completed conversions delivered to the converter
    pub conversions_completed: u64,
    /// Frames handed to the transport
    pub frames_sent: u64,
    /// Exact ack tokens observed
    pub acks_received: u64,
    /// Sample windows dropped because a frame was still unacknowledged
    pub overruns: u64,
    /// Inbound windows discarded without an ack match
    pub ignored_rx_windows: u64,
    /// Write-completion callbacks swallowed
    pub writes_completed: u64,
    /// Failed arm attempts in steady state
    pub arm_failures: u64,
    /// Failed sends in steady state
    pub send_failures: u64,
}
