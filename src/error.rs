//! Error types for the synthetic server.

use std::io;
use thiserror::Error;

/// Result type alias for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Top-level error type for startup and serving.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to bind {addr}: {source}")]
    Bind { addr: String, source: io::Error },

    #[error("Metrics error: {0}")]
    Metrics(String),
}

/// Errors while turning a request body into simulation parameters.
///
/// These are reported before any streaming starts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Malformed request body: {0}")]
    MalformedBody(String),

    #[error("Request body must be a JSON object")]
    NotAnObject,

    #[error("Invalid value for '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Errors from a fan-out call to the tool endpoint. Never surfaced to clients.
#[derive(Error, Debug)]
pub enum FanoutError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Tool endpoint returned status {0}")]
    Status(u16),

    #[error("Timeout")]
    Timeout,
}

impl From<reqwest::Error> for FanoutError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FanoutError::Timeout
        } else {
            FanoutError::Http(e.to_string())
        }
    }
}

/// Faults raised once a stream has started. Converted into an error frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamFault {
    #[error("cannot allocate frame of {0} bytes")]
    Allocation(u64),

    #[error("{0}")]
    Panic(String),

    #[error("worker failed: {0}")]
    Worker(String),
}

impl StreamFault {
    /// Build a fault from a caught panic payload.
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let msg = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        StreamFault::Panic(msg)
    }
}
