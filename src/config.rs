//! Configuration for the sampling pipeline
//!
//! Configuration is a small TOML document describing the configured channels,
//! the sample buffer geometry, and where the demo daemon listens. A missing
//! file falls back to defaults so the daemon can start bare.
//!
//! # Example
//!
//! ```toml
//! buffer_size = 1
//! sampling_frequency_hz = 1
//! listen_addr = "127.0.0.1:9300"
//!
//! [[channels]]
//! adc_channel = 9
//!
//! [[channels]]
//! adc_channel = 10
//! calibration = { offset = 0, gain = 1 }
//! ```

use crate::error::{PipelineError, Result, ResultExt};
use crate::types::{Calibration, Channel, ChannelId};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default number of sample words per buffer
pub const DEFAULT_BUFFER_SIZE: usize = 1;

/// Default sampling frequency in Hz
pub const DEFAULT_SAMPLING_FREQUENCY_HZ: u32 = 1;

/// Default listen address for the demo daemon
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:9300";

/// Configuration for one logical input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Device-level channel index (mux input on the front end)
    pub adc_channel: u8,
    /// Offset/gain calibration; identity if omitted
    #[serde(default)]
    pub calibration: Calibration,
}

/// Top-level pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Configured inputs; one enables continuous mode, two differential mode
    pub channels: Vec<ChannelConfig>,

    /// Sample words per buffer
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Acquisition rate in Hz
    #[serde(default = "default_sampling_frequency")]
    pub sampling_frequency_hz: u32,

    /// Listen address for the demo daemon's TCP transport
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

fn default_sampling_frequency() -> u32 {
    DEFAULT_SAMPLING_FREQUENCY_HZ
}

fn default_listen_addr() -> String {
    DEFAULT_LISTEN_ADDR.to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        // Two differential inputs with identity calibration
        Self {
            channels: vec![
                ChannelConfig {
                    adc_channel: 9,
                    calibration: Calibration::default(),
                },
                ChannelConfig {
                    adc_channel: 10,
                    calibration: Calibration::default(),
                },
            ],
            buffer_size: DEFAULT_BUFFER_SIZE,
            sampling_frequency_hz: DEFAULT_SAMPLING_FREQUENCY_HZ,
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(PipelineError::from)
            .with_context(|| format!("Failed to read {}", path.as_ref().display()))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| PipelineError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration, falling back to defaults on any failure
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path.as_ref()) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(
                    "Could not load config from {}: {}; using defaults",
                    path.as_ref().display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| PipelineError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path.as_ref(), content)
            .map_err(PipelineError::from)
            .with_context(|| format!("Failed to write {}", path.as_ref().display()))?;
        Ok(())
    }

    /// Check the configuration is runnable
    pub fn validate(&self) -> Result<()> {
        match self.channels.len() {
            1 | 2 => {}
            n => {
                return Err(PipelineError::Config(format!(
                    "Expected 1 or 2 channels, got {}",
                    n
                )))
            }
        }
        if self.buffer_size == 0 {
            return Err(PipelineError::Config(
                "buffer_size must be nonzero".to_string(),
            ));
        }
        if self.sampling_frequency_hz == 0 {
            return Err(PipelineError::Config(
                "sampling_frequency_hz must be nonzero".to_string(),
            ));
        }
        Ok(())
    }

    /// Materialize the configured channels with their logical identifiers
    pub fn channels(&self) -> Vec<Channel> {
        self.channels
            .iter()
            .enumerate()
            .map(|(i, cfg)| Channel {
                id: ChannelId(i as u8),
                adc_channel: cfg.adc_channel,
                calibration: cfg.calibration,
            })
            .collect()
    }
}
