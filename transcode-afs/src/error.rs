//! Error types for cadence recovery.
//!
//! Errors are `Clone` so that a single compute result can be handed to every
//! consumer waiting on the same completion token.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error type for AFS operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AfsError {
    /// A configuration value is out of range or inconsistent.
    #[error("Invalid parameter ({name}): {message}")]
    InvalidParameter { name: &'static str, message: String },

    /// The stream geometry cannot be processed.
    #[error("Invalid frame dimensions: {width}x{height} ({message})")]
    InvalidDimensions {
        width: u32,
        height: u32,
        message: String,
    },

    /// Unsupported pixel format.
    #[error("Unsupported pixel format: {format}")]
    UnsupportedFormat { format: String },

    /// A pushed frame does not match the configured stream.
    #[error("Frame mismatch: expected {expected}, got {actual}")]
    FrameMismatch { expected: String, actual: String },

    /// A cadence update skipped ahead of the last accepted frame.
    #[error("Out-of-order cadence update: frame {iframe} after frame {last}")]
    OutOfOrder { iframe: i64, last: i64 },

    /// A duration was requested before enough lookahead was recorded.
    #[error("Duration of frame {iframe} requested before frame {required} was recorded")]
    LookaheadUnderrun { iframe: i64, required: i64 },

    /// The analyzer failed or a compute job died.
    #[error("Compute failure: {message}")]
    Compute { message: String },

    /// An output file could not be opened.
    #[error("Failed to open {}: {reason}", path.display())]
    FileOpen { path: PathBuf, reason: String },

    /// An output file could not be written.
    #[error("Failed to write {what}: {reason}")]
    Write { what: &'static str, reason: String },

    /// The filter was driven in a way it does not allow.
    #[error("Invalid call: {message}")]
    InvalidCall { message: String },

    /// Internal sequencing error.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Result type for AFS operations.
pub type Result<T> = std::result::Result<T, AfsError>;

impl AfsError {
    /// Create an invalid parameter error.
    pub fn invalid_parameter(name: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            message: message.into(),
        }
    }

    /// Create an invalid dimensions error.
    pub fn invalid_dimensions(width: u32, height: u32, message: impl Into<String>) -> Self {
        Self::InvalidDimensions {
            width,
            height,
            message: message.into(),
        }
    }

    /// Create an unsupported format error.
    pub fn unsupported_format(format: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
        }
    }

    /// Create a frame mismatch error.
    pub fn frame_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::FrameMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a compute failure error.
    pub fn compute(message: impl Into<String>) -> Self {
        Self::Compute {
            message: message.into(),
        }
    }

    /// Create a file open error from an I/O error.
    pub fn file_open(path: &Path, err: &std::io::Error) -> Self {
        Self::FileOpen {
            path: path.to_path_buf(),
            reason: err.to_string(),
        }
    }

    /// Create a write error from an I/O error.
    pub fn write(what: &'static str, err: &std::io::Error) -> Self {
        Self::Write {
            what,
            reason: err.to_string(),
        }
    }

    /// Create an invalid call error.
    pub fn invalid_call(message: impl Into<String>) -> Self {
        Self::InvalidCall {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether the error was raised while validating configuration or input.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidParameter { .. }
                | Self::InvalidDimensions { .. }
                | Self::UnsupportedFormat { .. }
                | Self::FrameMismatch { .. }
        )
    }
}
