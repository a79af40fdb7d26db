//! Error types for wepraid

use std::time::Duration;

use thiserror::Error;

/// Result type alias for wepraid operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for wepraid
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An external tool could not be launched
    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// A process wrote to a stream that is expected to stay silent, or
    /// reported an implausible value
    #[error("unexpected output from {tool} on {stream}: {line}")]
    UnexpectedOutput {
        tool: &'static str,
        stream: &'static str,
        line: String,
    },

    /// An extraction subprocess returned non-zero or its input was missing
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// A wait loop ran past its deadline
    #[error("deadline of {limit:?} exceeded while waiting for {waiting_for}")]
    DeadlineExceeded {
        waiting_for: &'static str,
        limit: Duration,
    },

    /// A bounded retry loop ran out of attempts
    #[error("gave up on {operation} after {attempts} attempts")]
    RetriesExhausted {
        operation: &'static str,
        attempts: u32,
    },

    /// The attack was cancelled through its cancellation token
    #[error("attack cancelled")]
    Cancelled,

    /// Invalid parameter error
    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// A supervised process was started while a previous one is still owned
    #[error("{0} is already running")]
    AlreadyRunning(&'static str),

    /// Target access point was not found during scan
    #[error("target access point '{0}' not found")]
    TargetNotFound(String),
}

impl Error {
    /// Create an invalid parameter error
    pub fn invalid_parameter<S: Into<String>>(name: &'static str, reason: S) -> Self {
        Error::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }

    /// Create an extraction error with a custom message
    pub fn extraction<S: Into<String>>(msg: S) -> Self {
        Error::Extraction(msg.into())
    }

    /// Map this error to a process exit code, sysexits.h-inspired.
    ///
    /// Distinct fatal conditions map to distinct codes so automated callers
    /// can branch on cause: missing tool (69), permission denied (77),
    /// target not found (79), bad arguments (2), anything else (70).
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::InvalidParameter { .. } => 2,
            Error::Spawn { source, .. } => match source.kind() {
                std::io::ErrorKind::PermissionDenied => 77,
                _ => 69,
            },
            Error::TargetNotFound(_) => 79,
            _ => 70,
        }
    }
}
