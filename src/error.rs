use thiserror::Error;

use crate::platform::types::CallError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Discovery failed: {0}")]
    Discovery(String),

    #[error("Vault API error: {0}")]
    Vault(#[from] CallError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Scheduler error: {0}")]
    Scheduler(String),
}

pub type Result<T> = std::result::Result<T, AppError>;
