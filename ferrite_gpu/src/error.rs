//! Error types for the Ferrite GPU core
//!
//! Every fatal condition surfaced by the core falls into one of four classes.
//! Non-fatal conditions (a binding slot that cannot be resolved against the
//! active pipeline layout) are not errors: they are logged at WARN severity
//! and the single affected unit is skipped.

use std::fmt;
use std::sync::{Mutex, MutexGuard};

/// Result type for Ferrite operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ferrite errors
#[derive(Debug, Clone)]
pub enum Error {
    /// A pool or backend allocation limit was reached
    ResourceExhausted(String),

    /// State-machine violation, thread-affinity violation, or an object handed
    /// back to an owner that did not produce it
    InvalidUsage(String),

    /// The requested command variant is not implemented by this core
    UnsupportedOperation(String),

    /// The underlying graphics call returned a failure code
    BackendFailure(String),
}

impl Error {
    /// Short class name, used as the log prefix
    pub fn class(&self) -> &'static str {
        match self {
            Error::ResourceExhausted(_) => "ResourceExhausted",
            Error::InvalidUsage(_) => "InvalidUsage",
            Error::UnsupportedOperation(_) => "UnsupportedOperation",
            Error::BackendFailure(_) => "BackendFailure",
        }
    }

    /// The message carried by the error
    pub fn message(&self) -> &str {
        match self {
            Error::ResourceExhausted(msg)
            | Error::InvalidUsage(msg)
            | Error::UnsupportedOperation(msg)
            | Error::BackendFailure(msg) => msg,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ResourceExhausted(msg) => write!(f, "Resource exhausted: {}", msg),
            Error::InvalidUsage(msg) => write!(f, "Invalid usage: {}", msg),
            Error::UnsupportedOperation(msg) => write!(f, "Unsupported operation: {}", msg),
            Error::BackendFailure(msg) => write!(f, "Backend failure: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

/// Lock a mutex, reporting poisoning as a backend failure
pub(crate) fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>> {
    mutex
        .lock()
        .map_err(|_| Error::BackendFailure(format!("{} lock poisoned", what)))
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
