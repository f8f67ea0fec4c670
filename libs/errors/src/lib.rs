//! Unified error handling for the drivetune workspace
//!
//! Every crate reports failures through [`DriveError`], so callers see one
//! taxonomy across the transport, conversion and persistence layers.

use thiserror::Error;

/// Convenient result alias used throughout the workspace
pub type DriveResult<T> = Result<T, DriveError>;

/// Main error type for all drivetune crates
#[derive(Debug, Error)]
pub enum DriveError {
    // ======================================
    // Device & Transport Errors
    // ======================================
    #[error("Device error: {0}")]
    Device(String),

    #[error("Timeout waiting for response from {0}")]
    Timeout(String),

    // ======================================
    // Value Conversion Errors
    // ======================================
    #[error("Conversion error: {0}")]
    Conversion(String),

    #[error("Out of range: {value} not in [{min}, {max}]")]
    OutOfRange {
        value: String,
        min: String,
        max: String,
    },

    // ======================================
    // Persistence Errors
    // ======================================
    #[error("Parse error: {context}: {message}")]
    Parse { context: String, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // ======================================
    // Configuration & I/O Errors
    // ======================================
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DriveError {
    /// Create a device error
    pub fn device(message: impl Into<String>) -> Self {
        Self::Device(message.into())
    }

    /// Create a conversion error
    pub fn conversion(message: impl Into<String>) -> Self {
        Self::Conversion(message.into())
    }

    /// Create an out-of-range error
    pub fn out_of_range(
        value: impl ToString,
        min: impl ToString,
        max: impl ToString,
    ) -> Self {
        Self::OutOfRange {
            value: value.to_string(),
            min: min.to_string(),
            max: max.to_string(),
        }
    }

    /// Create a parse error
    pub fn parse(context: impl Into<String>, message: impl ToString) -> Self {
        Self::Parse {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// True for transport-level failures the polling loop treats as
    /// transient (logged, tick skipped, polling continues)
    pub fn is_device_error(&self) -> bool {
        matches!(self, Self::Device(_) | Self::Timeout(_))
    }
}
