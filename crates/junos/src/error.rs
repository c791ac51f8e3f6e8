//! Error types for NETCONF sessions.
//!
//! Session failures convert into [`rollout::TransportError`]; ssh failures
//! before the NETCONF hello are classified from the client's stderr into a
//! [`ConnectionErrorKind`].

use rollout::{ConnectionErrorKind, TransportError};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur on an open NETCONF session.
#[derive(Debug, Error)]
pub enum Error {
    /// Reading from or writing to the ssh client failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The device closed the session, or an earlier timeout or I/O failure
    /// left the reply stream out of step
    #[error("session closed")]
    Closed,

    /// No reply arrived in time
    #[error("no reply to {rpc} within {}s", .timeout.as_secs())]
    Timeout {
        /// Name of the request
        rpc: String,
        /// Configured deadline
        timeout: Duration,
    },

    /// The device sent something that is not a NETCONF reply
    #[error("malformed reply: {message}")]
    Malformed {
        /// What was wrong with it
        message: String,
    },

    /// The device answered with an `rpc-error` of severity `error`
    #[error("{message}")]
    Rpc {
        /// Error messages reported by the device
        message: String,
    },
}

impl From<Error> for TransportError {
    fn from(err: Error) -> Self {
        TransportError::new(err.to_string())
    }
}

/// Result type for NETCONF operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classify why an ssh client exited before the session was established.
///
/// Analyzes stderr of `ssh` (and `sshpass`) the way the operator would read it.
pub fn classify_ssh_failure(stderr: &str) -> ConnectionErrorKind {
    let stderr_lower = stderr.to_lowercase();

    if stderr_lower.contains("permission denied")
        || stderr_lower.contains("authentication failed")
        || stderr_lower.contains("too many authentication failures")
        || stderr_lower.contains("host key verification failed")
    {
        return ConnectionErrorKind::AuthFailed;
    }

    if stderr_lower.contains("connection refused")
        || stderr_lower.contains("subsystem request failed")
        || stderr_lower.contains("connection closed by")
    {
        return ConnectionErrorKind::Refused;
    }

    if stderr_lower.contains("timed out") || stderr_lower.contains("timeout") {
        return ConnectionErrorKind::Timeout;
    }

    ConnectionErrorKind::Unreachable
}
