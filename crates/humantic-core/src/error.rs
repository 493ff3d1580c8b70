//! Error types shared across the workspace.

use thiserror::Error;

/// Infrastructure errors: storage, configuration, notification, run control.
#[derive(Debug, Error)]
pub enum HumanticError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Actor directory error: {0}")]
    Directory(String),

    #[error("Notification error: {0}")]
    Notify(String),

    #[error("a run is already in progress")]
    AlreadyRunning,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, HumanticError>;

/// Failure of a single remote action (or of opening the context that performs it).
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ActionError {
    /// Remote service asked us to slow down (wait-required, anti-spam, too many requests).
    #[error("flood signal: {message}")]
    Flood {
        message: String,
        wait_secs: Option<u64>,
    },

    #[error("action timed out after {0}s")]
    Timeout(u64),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("rejected by remote: {0}")]
    Rejected(String),

    #[error("actor is not authorized")]
    Unauthorized,
}

impl ActionError {
    pub fn flood(message: impl Into<String>) -> Self {
        Self::Flood {
            message: message.into(),
            wait_secs: None,
        }
    }
}
