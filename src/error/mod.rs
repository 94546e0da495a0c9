//! Error types, taxonomy and the user-facing error pipeline.
//!
//! Raw failures enter as [`ErrorSource`], are classified into an
//! [`ErrorKind`], turned into an [`AppError`] and finally paired with
//! recovery [`ErrorAction`]s before they reach UI code.

pub mod action;
pub mod classifier;
pub mod history;
pub mod message;
pub mod taxonomy;

pub use action::{generate_actions, ActionFn, ActionKind, ErrorAction, RecoveryCallbacks};
pub use classifier::classify;
pub use history::ErrorCenter;
pub use message::AppError;
pub use taxonomy::{ErrorKind, ErrorSource};

use thiserror::Error;

/// Primary error type for all subtrack operations.
#[derive(Error, Debug)]
pub enum SubtrackError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("HTTP error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Network offline")]
    Offline,

    #[error("Request cancelled")]
    Cancelled,

    #[error("Invalid exchange rate: {0}")]
    InvalidRate(String),

    #[error("Network error: all {attempted} exchange rate sources failed (last: {last})")]
    AllSourcesFailed { attempted: usize, last: String },

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl SubtrackError {
    /// Create an HTTP status error.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Machine-readable code carried alongside the message, if any.
    pub fn code(&self) -> Option<String> {
        match self {
            Self::Api { status, .. } => Some(status.to_string()),
            Self::Network(e) => e.status().map(|s| s.as_u16().to_string()),
            _ => None,
        }
    }

    /// Whether the failure came from the transport rather than the payload.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Timeout(_) | Self::Offline | Self::AllSourcesFailed { .. }
        )
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, SubtrackError>;
