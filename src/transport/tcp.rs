//! TCP byte transport for the demo daemon
//!
//! Serves one accepted client connection. A reader thread delivers inbound
//! bytes in fixed windows of the ack-token length; writes happen inline and
//! report completion with a [`PipelineEvent::WriteComplete`] event so the
//! pipeline can account for finished writes.

use crate::error::{PipelineError, Result};
use crate::pipeline::PipelineEvent;
use crate::transport::{ByteTransport, RECV_WINDOW};
use crossbeam_channel::Sender;
use std::io::{Read, Write};
use std::net::TcpStream;

/// Byte transport over one TCP stream
pub struct TcpTransport {
    stream: TcpStream,
    /// Read half, handed to the reader thread at bind time
    reader: Option<TcpStream>,
    events: Option<Sender<PipelineEvent>>,
    peer: String,
}

impl TcpTransport {
    /// Wrap an accepted stream. Fails setup if the read half cannot be
    /// cloned, rather than leaving the link deaf to acks later on.
    pub fn new(stream: TcpStream) -> Result<Self> {
        stream.set_nodelay(true)?;
        let reader = stream
            .try_clone()
            .map_err(|e| PipelineError::Setup(format!("could not clone stream: {}", e)))?;
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown peer".to_string());
        Ok(Self {
            stream,
            reader: Some(reader),
            events: None,
            peer,
        })
    }
}

impl ByteTransport for TcpTransport {
    fn bind(&mut self, events: Sender<PipelineEvent>) {
        self.events = Some(events.clone());

        // Reader thread: fixed windows of the token length until EOF
        let peer = self.peer.clone();
        let Some(mut reader) = self.reader.take() else {
            tracing::error!("transport for {} bound twice", self.peer);
            return;
        };
        std::thread::spawn(move || {
            let mut window = [0u8; RECV_WINDOW];
            loop {
                match reader.read_exact(&mut window) {
                    Ok(()) => {
                        if events
                            .send(PipelineEvent::BytesReceived(window.to_vec()))
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::info!("reader for {} stopped: {}", peer, e);
                        break;
                    }
                }
            }
        });
    }

    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream
            .write_all(bytes)
            .and_then(|_| self.stream.flush())
            .map_err(|e| PipelineError::Transport(format!("send to {} failed: {}", self.peer, e)))?;
        if let Some(events) = &self.events {
            let _ = events.send(PipelineEvent::WriteComplete);
        }
        Ok(())
    }

    fn describe(&self) -> &str {
        &self.peer
    }
}
