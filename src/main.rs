//! ADC telemetry daemon - Main Entry Point
//!
//! Listens for a single TCP consumer, then streams calibrated ADC readings
//! to it as acknowledgement-gated ASCII frames. Acquisition comes from the
//! simulated device; swap in a hardware `AdcCapability` to drive a real
//! front end.

use adcstream_rs::{
    acquisition::{SimAdcBackend, SimPattern},
    config::PipelineConfig,
    pipeline::{PipelineMessage, TelemetryPipeline},
    transport::tcp::TcpTransport,
};
use std::net::TcpListener;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,adcstream_rs=trace")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting ADC telemetry daemon");

    let config = match std::env::args().nth(1) {
        Some(path) => PipelineConfig::load(&path)?,
        None => PipelineConfig::load_or_default("adcstream.toml"),
    };
    config.validate()?;
    tracing::info!(
        "{} channel(s), {} sample(s) per buffer, {} Hz",
        config.channels.len(),
        config.buffer_size,
        config.sampling_frequency_hz
    );

    let listener = TcpListener::bind(&config.listen_addr)?;
    tracing::info!("Waiting for a consumer on {}", config.listen_addr);
    let (stream, peer) = listener.accept()?;
    tracing::info!("Consumer connected from {}", peer);

    let adc = SimAdcBackend::new().with_pattern(SimPattern::Ramp { start: 0, step: 1 });
    let transport = TcpTransport::new(stream)?;

    let (pipeline, handle) = TelemetryPipeline::new(config, Box::new(adc), Box::new(transport));
    let worker = std::thread::spawn(move || pipeline.run());

    handle.start();

    // Relay pipeline messages to the log until the pipeline goes down
    'outer: loop {
        for message in handle.drain() {
            match message {
                PipelineMessage::Started => tracing::info!("Pipeline ready"),
                PipelineMessage::FrameSent { sequence, value } => {
                    tracing::debug!("Frame {} sent: {}", sequence, value)
                }
                PipelineMessage::AckReceived { sequence } => {
                    tracing::debug!("Frame {} acknowledged", sequence)
                }
                PipelineMessage::DeviceError { channel, error } => {
                    tracing::error!("Device error on channel {}: {}", channel, error)
                }
                PipelineMessage::TransportError(error) => {
                    tracing::error!("Transport error: {}", error)
                }
                PipelineMessage::Stats(stats) => tracing::debug!(
                    "{} frames sent, {} acks, {} overruns",
                    stats.frames_sent,
                    stats.acks_received,
                    stats.overruns
                ),
                PipelineMessage::Fatal(error) => {
                    tracing::error!("Pipeline setup failed: {}", error);
                    break 'outer;
                }
                PipelineMessage::Shutdown => break 'outer,
            }
        }
        std::thread::sleep(Duration::from_millis(50));
    }

    tracing::info!("Shutting down...");
    match worker.join() {
        Ok(result) => result?,
        Err(_) => anyhow::bail!("pipeline thread panicked"),
    }
    Ok(())
}
