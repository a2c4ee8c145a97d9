//! Layered error definitions
//!
//! Categorized by source: config / stream / fusion / detection / sink

use thiserror::Error;

use crate::StreamId;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Stream Errors =====
    /// Opening a stream failed (retried in the background)
    #[error("stream {stream_id} open failed: {message}")]
    StreamOpen { stream_id: StreamId, message: String },

    /// A single read failed (transient)
    #[error("stream {stream_id} read failed: {message}")]
    StreamRead { stream_id: StreamId, message: String },

    /// Unsupported stream address
    #[error("unsupported stream address '{address}'")]
    UnsupportedAddress { address: String },

    /// Pixel buffer does not match its declared geometry
    #[error("malformed image {width}x{height}: {message}")]
    MalformedImage {
        width: u32,
        height: u32,
        message: String,
    },

    // ===== Detection / Fusion Errors =====
    /// Detector or tracker failure
    #[error("detector '{detector}' failed: {message}")]
    Detection { detector: String, message: String },

    /// Malformed ground-plane track handed to fusion
    #[error("invalid fusion input for track '{track_id}': {message}")]
    FusionInput { track_id: String, message: String },

    // ===== Sink Errors =====
    /// Sink write error
    #[error("sink '{sink_name}' write error: {message}")]
    SinkWrite { sink_name: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create stream open error
    pub fn stream_open(stream_id: StreamId, message: impl Into<String>) -> Self {
        Self::StreamOpen {
            stream_id,
            message: message.into(),
        }
    }

    /// Create stream read error
    pub fn stream_read(stream_id: StreamId, message: impl Into<String>) -> Self {
        Self::StreamRead {
            stream_id,
            message: message.into(),
        }
    }

    /// Create detector error
    pub fn detection(detector: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Detection {
            detector: detector.into(),
            message: message.into(),
        }
    }

    /// Create fusion input error
    pub fn fusion_input(track_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::FusionInput {
            track_id: track_id.into(),
            message: message.into(),
        }
    }

    /// Create sink write error
    pub fn sink_write(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkWrite {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }
}
