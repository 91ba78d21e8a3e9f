//! Error types for the bounds harness
//!
//! Errors fall into two groups: infrastructure failures that abort a run
//! (see [`Error::is_fatal`]) and per-iteration failures that are recorded
//! while the remaining iterations still execute.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::remote::Bounds;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the harness
#[derive(Error, Debug)]
pub enum Error {
    // === Connection Errors ===
    #[error("Failed to connect to runtime as '{identity}': {reason}")]
    ConnectionFailed { identity: String, reason: String },

    #[error("Identity '{0}' is already bound to an open connection")]
    IdentityInUse(String),

    #[error("Session '{0}' is closed")]
    SessionClosed(String),

    #[error("Runtime process exited unexpectedly")]
    RuntimeCrashed,

    #[error("Runtime request '{command}' timed out after {timeout:?}")]
    RequestTimeout { command: String, timeout: Duration },

    // === Iteration Errors ===
    #[error("Runtime rejected launch of '{identity}': {reason}")]
    Launch { identity: String, reason: String },

    #[error("Timed out after {timeout:?} waiting for '{event}' from '{identity}'")]
    EventTimeout {
        identity: String,
        event: String,
        timeout: Duration,
    },

    #[error(
        "Window bounds of '{identity}' do not match: expected {expected}, observed {observed} (differs in {})",
        expected.diff(observed).join(", ")
    )]
    BoundsMismatch {
        identity: String,
        expected: Bounds,
        observed: Bounds,
    },

    #[error("Entity '{0}' not found")]
    EntityNotFound(String),

    #[error("Runtime request '{command}' failed: {message}")]
    RequestFailed { command: String, message: String },

    // === Protocol Errors ===
    #[error("Runtime protocol error: {0}")]
    Protocol(String),

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Test Errors ===
    #[error("Test assertion failed: {0}")]
    TestAssertion(String),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a connection failed error
    pub fn connection_failed(identity: &str, reason: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            identity: identity.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a launch error
    pub fn launch(identity: &str, reason: impl Into<String>) -> Self {
        Self::Launch {
            identity: identity.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a request failed error
    pub fn request_failed(command: &str, message: &str) -> Self {
        Self::RequestFailed {
            command: command.to_string(),
            message: message.to_string(),
        }
    }

    /// Whether the error aborts the whole run instead of a single iteration
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::ConnectionFailed { .. }
                | Error::IdentityInUse(_)
                | Error::SessionClosed(_)
                | Error::RuntimeCrashed
                | Error::RequestTimeout { .. }
                | Error::Protocol(_)
                | Error::Io(_)
        )
    }
}

/// Serializable error carried in failed runtime responses
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct WireError {
    pub code: String,
    pub message: String,
}

impl From<&Error> for WireError {
    fn from(e: &Error) -> Self {
        let (code, message) = match e {
            Error::ConnectionFailed { reason, .. } => ("CONNECTION_FAILED", reason.clone()),
            Error::IdentityInUse(_) => ("IDENTITY_IN_USE", e.to_string()),
            Error::SessionClosed(_) => ("SESSION_CLOSED", e.to_string()),
            Error::Launch { reason, .. } => ("LAUNCH_REJECTED", reason.clone()),
            Error::EntityNotFound(_) => ("ENTITY_NOT_FOUND", e.to_string()),
            Error::Protocol(_) | Error::Json(_) => ("PROTOCOL", e.to_string()),
            _ => ("INTERNAL_ERROR", e.to_string()),
        };
        Self {
            code: code.to_string(),
            message,
        }
    }
}

impl WireError {
    /// Map back to our error type
    ///
    /// `subject` is the identity, connection or entity the request was about.
    pub fn into_error(self, command: &str, subject: &str) -> Error {
        match self.code.as_str() {
            "CONNECTION_FAILED" => Error::connection_failed(subject, self.message),
            "IDENTITY_IN_USE" => Error::IdentityInUse(subject.to_string()),
            "SESSION_CLOSED" => Error::SessionClosed(subject.to_string()),
            "LAUNCH_REJECTED" => Error::launch(subject, self.message),
            "ENTITY_NOT_FOUND" => Error::EntityNotFound(subject.to_string()),
            "PROTOCOL" => Error::Protocol(self.message),
            _ => Error::request_failed(command, &self.message),
        }
    }
}
