//! Error types for configuration rollouts.
//!
//! Errors are categorized so the orchestrator can decide, in one place,
//! whether a failure is retryable and whether it aborts the fleet.
//! A commit-check that returns false is not an error: the transaction
//! resolves it internally with a rollback.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Why a device session could not be opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionErrorKind {
    /// Host unknown, no route, or no response
    Unreachable,
    /// The device rejected the credentials
    AuthFailed,
    /// The handshake exceeded its deadline
    Timeout,
    /// The device actively refused the session
    Refused,
}

impl fmt::Display for ConnectionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unreachable => "unreachable",
            Self::AuthFailed => "authentication failed",
            Self::Timeout => "timeout",
            Self::Refused => "refused",
        };
        f.write_str(s)
    }
}

/// A transport failed to open a session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct ConnectError {
    /// Failure classification
    pub kind: ConnectionErrorKind,
    /// Detail from the transport (e.g. ssh stderr)
    pub message: String,
}

impl ConnectError {
    /// Create a connect error.
    pub fn new(kind: ConnectionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Invalid data handed to a model constructor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// A required field was empty
    #[error("{entity}: field '{field}' must not be empty")]
    EmptyField {
        /// Entity being constructed (e.g. "host", "zone trust")
        entity: String,
        /// Name of the empty field
        field: &'static str,
    },

    /// A field that ends up on a command line starts with `-`
    #[error("{entity}: field '{field}' must not start with '-'")]
    LeadingDash {
        /// Entity being constructed
        entity: String,
        /// Name of the offending field
        field: &'static str,
    },

    /// Neither a password nor an SSH key was supplied
    #[error("credentials for '{username}' need a password or an ssh key")]
    MissingAuth {
        /// User the credentials belong to
        username: String,
    },

    /// Two zones share a name
    #[error("duplicate security zone '{name}'")]
    DuplicateZone {
        /// The repeated zone name
        name: String,
    },

    /// A zone without interfaces
    #[error("security zone '{zone}' has no interfaces")]
    NoInterfaces {
        /// Zone name
        zone: String,
    },
}

/// A device RPC failed (request rejected, session lost, malformed reply).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TransportError {
    /// Description of the failure, usually the device's error message
    pub message: String,
}

impl TransportError {
    /// Create a transport error from any message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Categories of rollout errors for abort and retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Configuration data failed validation
    Invalid,
    /// Session could not be opened
    Connection,
    /// Configuration could not be rendered to device syntax
    Render,
    /// Device rejected the candidate syntax
    Load,
    /// Device rejected activation after a passing commit-check
    Commit,
    /// Rollback could not be confirmed; device needs a manual audit
    UnknownState,
    /// A device request failed mid-transaction
    Transport,
    /// Transaction step invoked out of order
    InvalidStep,
    /// Transaction stopped because the run was aborted elsewhere
    Cancelled,
    /// Candidate validated but commit was disabled
    DryRun,
}

impl ErrorCategory {
    /// Whether a connection attempt failing this way is worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection)
    }

    /// Whether this category ends a host in a state that counts as failure.
    pub fn is_failure(&self) -> bool {
        !matches!(self, Self::Cancelled | Self::DryRun)
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Invalid => "Fix the configuration file and run again",
            Self::Connection => "Check reachability, credentials and the NETCONF service on the device",
            Self::Render => "Check zone names, interfaces and services for unsupported characters",
            Self::Load => "Inspect the rendered candidate with `zonepush render`",
            Self::Commit => "Check the device commit log; another session may hold the configuration",
            Self::UnknownState => "Audit the device's active configuration manually before retrying",
            Self::Transport => "Check the device session; the candidate was rolled back",
            Self::InvalidStep => "This is a bug in the caller driving the transaction",
            Self::Cancelled | Self::DryRun => "No action needed",
        }
    }
}

/// Log severity an error should be reported with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Informational outcome, nothing went wrong
    Info,
    /// Failure
    Error,
}

/// Errors that can occur during a rollout.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Invalid configuration data
    #[error("invalid configuration: {0}")]
    Model(#[from] ModelError),

    /// Session could not be opened
    #[error("connection to {host} failed ({kind}): {message}")]
    Connection {
        /// Host name
        host: String,
        /// Failure classification
        kind: ConnectionErrorKind,
        /// Detail from the transport
        message: String,
    },

    /// Configuration could not be rendered
    #[error("render failed: {message}")]
    Render {
        /// What did not match the template
        message: String,
    },

    /// Device rejected the candidate configuration
    #[error("candidate rejected by device: {message}")]
    Load {
        /// Device error message
        message: String,
    },

    /// Device rejected the commit after validation passed
    #[error("commit rejected after passing commit-check: {message}")]
    Commit {
        /// Device error message
        message: String,
    },

    /// Rollback could not be confirmed
    #[error("device state unknown ({cause}); rollback not confirmed: {rollback}")]
    UnknownState {
        /// What sent the transaction into rollback
        cause: String,
        /// Why the rollback could not be confirmed
        rollback: String,
    },

    /// Device request failed
    #[error("device request failed: {0}")]
    Transport(#[from] TransportError),

    /// Transaction step invoked from the wrong state
    #[error("cannot {step} from state {state}")]
    InvalidStep {
        /// Requested step
        step: &'static str,
        /// State the transaction was in
        state: String,
    },

    /// Run aborted before this transaction could finish
    #[error("cancelled: fleet rollout aborted")]
    Cancelled,

    /// Commit disabled for this run
    #[error("dry run: candidate validated and discarded")]
    DryRun,
}

impl Error {
    /// Create a connection error.
    pub fn connection(host: &str, kind: ConnectionErrorKind, message: impl Into<String>) -> Self {
        Self::Connection {
            host: host.to_string(),
            kind,
            message: message.into(),
        }
    }

    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Model(_) => ErrorCategory::Invalid,
            Error::Connection { .. } => ErrorCategory::Connection,
            Error::Render { .. } => ErrorCategory::Render,
            Error::Load { .. } => ErrorCategory::Load,
            Error::Commit { .. } => ErrorCategory::Commit,
            Error::UnknownState { .. } => ErrorCategory::UnknownState,
            Error::Transport(_) => ErrorCategory::Transport,
            Error::InvalidStep { .. } => ErrorCategory::InvalidStep,
            Error::Cancelled => ErrorCategory::Cancelled,
            Error::DryRun => ErrorCategory::DryRun,
        }
    }

    /// Whether retrying the failed operation could succeed.
    ///
    /// Only unreachable hosts and handshake timeouts qualify; a refused
    /// session or rejected credentials will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Connection { kind, .. } => matches!(
                kind,
                ConnectionErrorKind::Unreachable | ConnectionErrorKind::Timeout
            ),
            _ => false,
        }
    }

    /// Severity to report this error with.
    pub fn severity(&self) -> Severity {
        match self.category() {
            ErrorCategory::Cancelled | ErrorCategory::DryRun => Severity::Info,
            _ => Severity::Error,
        }
    }
}

/// Result type for rollout operations.
pub type Result<T> = std::result::Result<T, Error>;
