//! Error handling module

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    /// Login failed or the controller is unreachable. Fatal to the current
    /// cycle: no commit happens, the next scheduled trigger retries.
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Controller request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected controller response: {0}")]
    Api(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, AgentError>;
