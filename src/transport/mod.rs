//! Byte transport seam and the flow-control gate
//!
//! [`ByteTransport`] abstracts the byte-oriented link (a TCP stream here, a
//! UART on real hardware); [`FlowControlledLink`] wraps it with the ack gate:
//! after a data frame goes out, no further frame may be sent until the peer
//! echoes the fixed [`ACK_TOKEN`]. Waiting is realized by *not sending*, never
//! by blocking a thread; there is no timeout at this layer.
//!
//! Inbound bytes arrive in fixed windows of the token length. Matching is
//! single-shot and byte-for-byte: a token split across windows is not
//! recognized, and deployed peers already send the token unfragmented.

pub mod tcp;

pub use tcp::TcpTransport;

use crate::error::{PipelineError, Result};
use crate::pipeline::PipelineEvent;
use crossbeam_channel::Sender;

/// The fixed byte pattern the peer echoes to release the next frame
pub const ACK_TOKEN: &[u8] = b"end";

/// Inbound receive window size, exactly the token length
pub const RECV_WINDOW: usize = ACK_TOKEN.len();

/// Unified interface for asynchronous byte transports.
///
/// `send` enqueues bytes and returns; the transport reports write completion
/// with [`PipelineEvent::WriteComplete`] and delivers inbound windows as
/// [`PipelineEvent::BytesReceived`].
pub trait ByteTransport: Send {
    /// Tell the transport where inbound windows and write completions go.
    /// Called once at setup, before the first `send`.
    fn bind(&mut self, events: Sender<PipelineEvent>);

    /// Enqueue bytes for transmission
    fn send(&mut self, bytes: &[u8]) -> Result<()>;

    /// Human-readable transport description for diagnostics
    fn describe(&self) -> &str;
}

/// Result of offering an inbound window to the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// The window matched the token while a frame was unacknowledged
    Acknowledged,
    /// Discarded: no match, or no frame was pending
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkState {
    Idle,
    WaitingForAck,
}

/// Wraps a byte transport with the one-frame-in-flight ack gate.
///
/// State machine: `Idle --frame sent--> WaitingForAck --token matched--> Idle`.
pub struct FlowControlledLink {
    transport: Box<dyn ByteTransport>,
    state: LinkState,
}

impl FlowControlledLink {
    /// Create a link in the idle state
    pub fn new(transport: Box<dyn ByteTransport>) -> Self {
        Self {
            transport,
            state: LinkState::Idle,
        }
    }

    /// Forward the event sender to the transport
    pub fn bind(&mut self, events: Sender<PipelineEvent>) {
        self.transport.bind(events);
    }

    /// Transport description for diagnostics
    pub fn describe(&self) -> &str {
        self.transport.describe()
    }

    /// True if a frame is on the wire awaiting acknowledgment
    pub fn is_waiting(&self) -> bool {
        self.state == LinkState::WaitingForAck
    }

    /// Send a data frame and close the gate until the token arrives.
    ///
    /// Fails if the previous frame is still unacknowledged; the pipeline's
    /// state machine makes that unreachable.
    pub fn send_frame(&mut self, bytes: &[u8]) -> Result<()> {
        if self.state == LinkState::WaitingForAck {
            return Err(PipelineError::Transport(
                "frame sent while a previous frame is unacknowledged".to_string(),
            ));
        }
        self.transport.send(bytes)?;
        self.state = LinkState::WaitingForAck;
        Ok(())
    }

    /// Send bytes outside the gate (the ack reply)
    pub fn send_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.transport.send(bytes)
    }

    /// Reopen the gate, abandoning any unacknowledged frame.
    ///
    /// Called when streaming stops: a late ack for the abandoned frame then
    /// falls through as `Ignored` instead of releasing a gate nobody is
    /// waiting on.
    pub fn reset(&mut self) {
        self.state = LinkState::Idle;
    }

    /// Offer one inbound window to the gate.
    ///
    /// Only an exact token match while a frame is pending opens the gate;
    /// everything else is discarded with no buffering of partial matches.
    pub fn on_bytes_received(&mut self, bytes: &[u8]) -> AckOutcome {
        if self.state == LinkState::WaitingForAck && bytes == ACK_TOKEN {
            self.state = LinkState::Idle;
            AckOutcome::Acknowledged
        } else {
            AckOutcome::Ignored
        }
    }
}
