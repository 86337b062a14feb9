//! Error taxonomy for the remote device session core.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Abstract error kind. Each variant maps to exactly one policy in the
/// session state machine (close the socket, surface to the host, retry
/// locally, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Service catalog file absent or malformed.
    ConfigMissing,
    /// HTTP timeout or transport failure.
    NetworkError,
    /// Login reply not "ok", or START_SESSION error 0.
    AuthFailure,
    /// START_SESSION error 1 — device pool exhausted.
    NotEnoughDevices,
    /// Client/server major version mismatch.
    VersionIncompatible,
    /// Unknown opcode, payload underrun, or bad UTF-8.
    ProtocolError,
    /// Connect or initial read timed out.
    Timeout,
    /// A `map_pin` call violated the type or uniqueness rule.
    MappingRejected,
    /// No PONG received within the liveness window.
    LivenessLost,
    /// The session's time budget reached zero.
    TimeExpired,
}

/// Crate-wide error type: an [`ErrorKind`] plus a human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteError {
    pub kind: ErrorKind,
    pub message: String,
}

impl RemoteError {
    pub fn new(kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            message: msg.into(),
        }
    }

    pub fn config_missing(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConfigMissing, msg)
    }

    pub fn network(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NetworkError, msg)
    }

    pub fn auth_failure(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::AuthFailure, msg)
    }

    pub fn not_enough_devices(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotEnoughDevices, msg)
    }

    pub fn version_incompatible(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::VersionIncompatible, msg)
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::ProtocolError, msg)
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, msg)
    }

    pub fn mapping_rejected(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::MappingRejected, msg)
    }

    pub fn liveness_lost(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::LivenessLost, msg)
    }

    pub fn time_expired(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::TimeExpired, msg)
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for RemoteError {}

impl From<std::io::Error> for RemoteError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::TimedOut => Self::timeout(e.to_string()),
            std::io::ErrorKind::UnexpectedEof => Self::protocol(format!("short read: {e}")),
            _ => Self::new(ErrorKind::ProtocolError, e.to_string()),
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::timeout(e.to_string())
        } else {
            Self::network(e.to_string())
        }
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;
