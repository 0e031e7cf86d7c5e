//! Error handling for the telemetry pipeline
//!
//! This module defines custom error types and a Result alias for use
//! throughout the crate.

use crate::types::ChannelId;
use thiserror::Error;

/// Main error type for pipeline operations
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A capability failed to initialize; fatal, the pipeline aborts
    #[error("Setup error: {0}")]
    Setup(String),

    /// An arm was issued while a conversion was still outstanding.
    /// The state machine makes this unreachable; hitting it is a bug.
    #[error("Acquisition busy on channel {channel}")]
    AcquisitionBusy { channel: ChannelId },

    /// The acquisition device rejected or failed a conversion
    #[error("Device error: {0}")]
    Device(String),

    /// The byte transport rejected a send or lost its peer
    #[error("Transport error: {0}")]
    Transport(String),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors related to channel communication
    #[error("Channel error: {0}")]
    Channel(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        PipelineError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
