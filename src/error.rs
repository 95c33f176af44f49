use thiserror::Error;

/// Top-level error type for the keeper
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("External error: {0}")]
    ExternalError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Settlement request failures.
///
/// Every variant is recoverable: the scheduler records the cycle as failed
/// and keeps its cadence.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TriggerError {
    #[error("Settlement request timed out")]
    Timeout,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Ledger responded with HTTP {0}")]
    HttpStatus(u16),

    #[error("Malformed ledger response: {0}")]
    Decode(String),

    #[error("Settlement failed with errors: {}", .0.join("; "))]
    Application(Vec<String>),
}

impl From<reqwest::Error> for TriggerError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            TriggerError::Timeout
        } else if let Some(status) = error.status() {
            TriggerError::HttpStatus(status.as_u16())
        } else if error.is_decode() {
            TriggerError::Decode(error.to_string())
        } else {
            TriggerError::Transport(error.to_string())
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        AppError::ExternalError(format!("HTTP request error: {:?}", error))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(error: config::ConfigError) -> Self {
        AppError::Config(error.to_string())
    }
}

/// Result type alias for the keeper
pub type AppResult<T> = Result<T, AppError>;
