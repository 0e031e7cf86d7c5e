//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

use adcstream_rs::config::{ChannelConfig, PipelineConfig};
use adcstream_rs::error::Result;
use adcstream_rs::pipeline::PipelineEvent;
use adcstream_rs::transport::ByteTransport;
use adcstream_rs::types::Calibration;
use crossbeam_channel::Sender;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Upper bound for any single wait in the integration tests
pub fn test_timeout() -> Duration {
    Duration::from_secs(2)
}

/// Poll `condition` until it holds or the timeout expires
pub fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + test_timeout();
    while Instant::now() < deadline {
        if condition() {
            return;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    panic!("timed out waiting for {}", what);
}

/// A transport test double.
///
/// Records every outbound write and exposes the event sender handed over at
/// bind time, so tests can inject inbound byte windows as if a peer had sent
/// them.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
    events: Arc<Mutex<Option<Sender<PipelineEvent>>>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every write so far, oldest first
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    /// Deliver an inbound receive window to the pipeline
    pub fn inject(&self, bytes: &[u8]) {
        let guard = self.events.lock().unwrap();
        let sender = guard.as_ref().expect("transport not bound yet");
        sender
            .send(PipelineEvent::BytesReceived(bytes.to_vec()))
            .expect("pipeline event channel closed");
    }
}

impl ByteTransport for RecordingTransport {
    fn bind(&mut self, events: Sender<PipelineEvent>) {
        *self.events.lock().unwrap() = Some(events);
    }

    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.sent.lock().unwrap().push(bytes.to_vec());
        Ok(())
    }

    fn describe(&self) -> &str {
        "recording transport"
    }
}

/// A single-channel config with identity calibration
pub fn single_channel_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.channels = vec![ChannelConfig {
        adc_channel: 9,
        calibration: Calibration::default(),
    }];
    config
}

/// The default two-channel differential config
pub fn differential_config() -> PipelineConfig {
    PipelineConfig::default()
}
