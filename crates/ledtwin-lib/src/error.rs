//! Unified error type for the ledtwin-lib crate.
//!
//! [`LedtwinError`] wraps the hub session error (`HubError`) and the
//! domain-specific error kinds (`Config`, `Color`). `From` impls allow `?` to
//! propagate across module boundaries.

use std::fmt;

use crate::hub::HubError;

/// Unified error type for ledtwin-lib operations.
#[derive(Debug)]
pub enum LedtwinError {
    /// Hub session error (connect, send, receive).
    Hub(HubError),
    /// Standard I/O error (config persistence, thread spawn).
    Io(std::io::Error),
    /// JSON encoding or decoding error (telemetry bodies, patches).
    Json(serde_json::Error),
    /// Configuration validation error.
    Config(String),
    /// Color parsing error.
    Color(String),
}

impl fmt::Display for LedtwinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedtwinError::Hub(e) => write!(f, "{e}"),
            LedtwinError::Io(e) => write!(f, "I/O error: {e}"),
            LedtwinError::Json(e) => write!(f, "JSON error: {e}"),
            LedtwinError::Config(e) => write!(f, "Config error: {e}"),
            LedtwinError::Color(e) => write!(f, "Color error: {e}"),
        }
    }
}

impl std::error::Error for LedtwinError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LedtwinError::Hub(e) => Some(e),
            LedtwinError::Io(e) => Some(e),
            LedtwinError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<HubError> for LedtwinError {
    fn from(e: HubError) -> Self {
        LedtwinError::Hub(e)
    }
}

impl From<std::io::Error> for LedtwinError {
    fn from(e: std::io::Error) -> Self {
        LedtwinError::Io(e)
    }
}

impl From<serde_json::Error> for LedtwinError {
    fn from(e: serde_json::Error) -> Self {
        LedtwinError::Json(e)
    }
}

/// Crate-level Result alias using [`LedtwinError`].
pub type Result<T> = std::result::Result<T, LedtwinError>;
