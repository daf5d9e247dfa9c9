//! Error taxonomy
//!
//! `InputError` is user-correctable and stops a request before any device
//! work starts. `SessionError` is per device and always ends up as a failed
//! outcome for that device only.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::codec::CodecError;

/// Request validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("Please select at least one device")]
    NoTargets,

    #[error("Please enter a command")]
    MissingCommand,

    #[error("Please enter configuration commands")]
    MissingConfigLines,

    #[error("Unknown or inactive device: {0}")]
    UnknownDevice(String),

    #[error("Unknown device group: {0}")]
    UnknownGroup(String),

    #[error("Concurrency limit must be at least 1")]
    InvalidConcurrency,
}

/// Failure while talking to one device
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Device unreachable at {address}: {reason}")]
    Unreachable { address: String, reason: String },

    #[error("Timed out while {stage} after {after_ms}ms")]
    Timeout { stage: String, after_ms: u64 },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl SessionError {
    /// Classification recorded on the outcome
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::Unreachable { .. } => ErrorKind::Unreachable,
            SessionError::Timeout { .. } => ErrorKind::Timeout,
            SessionError::Auth(_) => ErrorKind::Auth,
            SessionError::Protocol(_) => ErrorKind::Protocol,
            SessionError::Unexpected(_) => ErrorKind::Unexpected,
        }
    }
}

impl From<CodecError> for SessionError {
    fn from(e: CodecError) -> Self {
        SessionError::Protocol(e.to_string())
    }
}

/// Failure classes of a per-device outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Unreachable,
    Timeout,
    Auth,
    Protocol,
    Unexpected,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Unreachable => "unreachable",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Auth => "auth",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Unexpected => "unexpected",
        };
        f.write_str(name)
    }
}
