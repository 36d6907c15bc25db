//! Error types for marker layers

use crate::types::MarkerId;
use thiserror::Error;

/// Errors raised while registering markers or loading their icons
#[derive(Debug, Error)]
pub enum MarkerError {
    #[error("Invalid marker {id}: {reason}")]
    InvalidMarker { id: MarkerId, reason: String },

    #[error("Failed to load image {url}: {message}")]
    ImageLoad { url: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MarkerError {
    pub fn invalid_marker<S: Into<String>>(id: MarkerId, reason: S) -> Self {
        Self::InvalidMarker {
            id,
            reason: reason.into(),
        }
    }

    pub fn image_load<U: Into<String>, M: Into<String>>(url: U, message: M) -> Self {
        Self::ImageLoad {
            url: url.into(),
            message: message.into(),
        }
    }
}

pub type MarkerResult<T> = Result<T, MarkerError>;

/// Errors raised when validating layer options
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid option {name}: {value}")]
    InvalidOption { name: &'static str, value: String },
}
