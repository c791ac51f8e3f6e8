//! Core types for configuration rollouts

use crate::error::Error;
use crate::model::Host;
use crate::retry::RetryConfig;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// State of a configuration transaction.
///
/// `Idle` is initial; `Committed`, `RolledBack` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TxState {
    /// Nothing submitted yet
    Idle,
    /// Candidate submitted
    Loaded,
    /// Candidate compared with the active configuration
    Diffed,
    /// Device commit-check passed
    Validated,
    /// Candidate activated
    Committed,
    /// Candidate discarded, previous configuration confirmed in force
    RolledBack,
    /// Transaction failed; see the cause
    Failed,
}

impl TxState {
    /// Whether no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::RolledBack | Self::Failed)
    }
}

impl fmt::Display for TxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Loaded => "loaded",
            Self::Diffed => "diffed",
            Self::Validated => "validated",
            Self::Committed => "committed",
            Self::RolledBack => "rolled back",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Syntax of a rendered candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigFormat {
    /// One `set ...` command per line
    Set,
    /// Curly-brace hierarchical text
    Text,
}

/// Fleet abort behaviour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AbortPolicy {
    /// Stop at the first connection error or failed host; remaining hosts
    /// are never contacted
    #[default]
    FailFast,
    /// Attempt every host and fail the run if any host failed
    BestEffort,
}

impl fmt::Display for AbortPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FailFast => f.write_str("fail-fast"),
            Self::BestEffort => f.write_str("best-effort"),
        }
    }
}

/// Options for a single transaction.
#[derive(Debug, Clone)]
pub struct TransactionOptions {
    /// Commit when validation passes; when false the candidate is always
    /// rolled back
    pub commit: bool,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self { commit: true }
    }
}

/// Options for a fleet run.
#[derive(Debug, Clone)]
pub struct RolloutOptions {
    /// Abort behaviour
    pub policy: AbortPolicy,
    /// Number of hosts processed concurrently
    pub jobs: usize,
    /// Retry policy for opening sessions
    pub connect_retry: RetryConfig,
    /// Per-transaction options
    pub transaction: TransactionOptions,
}

impl Default for RolloutOptions {
    fn default() -> Self {
        Self {
            policy: AbortPolicy::FailFast,
            jobs: 1,
            connect_retry: RetryConfig::no_retry(),
            transaction: TransactionOptions::default(),
        }
    }
}

/// Shared flag used to stop in-flight work when the run aborts.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create an untripped token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip the token.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether the token was tripped.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How a transaction ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionOutcome {
    /// Terminal state
    pub state: TxState,
    /// Error or informational reason, when not committed
    pub cause: Option<Error>,
    /// Candidate/active difference reported by the device
    pub diff: Option<String>,
}

/// Result recorded for one host.
#[derive(Debug, Clone, Serialize)]
pub struct PerHostResult {
    /// The host
    pub host: Host,
    /// Terminal state of its transaction (`Failed` for connection errors)
    pub state: TxState,
    /// Why the host did not commit
    #[serde(serialize_with = "serialize_cause")]
    pub cause: Option<Error>,
    /// Difference reported before validation
    pub diff: Option<String>,
    /// Wall time spent on this host
    pub duration_ms: u64,
}

impl PerHostResult {
    /// Whether this host counts as a failure.
    pub fn is_failure(&self) -> bool {
        self.state == TxState::Failed
    }

    /// Whether this host failed to connect.
    pub fn is_connection_error(&self) -> bool {
        matches!(self.cause, Some(Error::Connection { .. }))
    }
}

fn serialize_cause<S: Serializer>(cause: &Option<Error>, serializer: S) -> Result<S::Ok, S::Error> {
    match cause {
        Some(err) => serializer.serialize_some(&err.to_string()),
        None => serializer.serialize_none(),
    }
}

/// Aggregated result of a fleet run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    /// Results in inventory order
    pub results: Vec<PerHostResult>,
    /// Host whose failure aborted the run
    pub aborted_by: Option<String>,
    /// Hosts never contacted because the run aborted
    pub skipped: Vec<Host>,
}

impl RunReport {
    /// Whether the run completed without aborting and without failed hosts.
    pub fn is_success(&self) -> bool {
        self.aborted_by.is_none() && !self.results.iter().any(PerHostResult::is_failure)
    }

    /// Number of hosts that ended in the given state.
    pub fn count(&self, state: TxState) -> usize {
        self.results.iter().filter(|r| r.state == state).count()
    }

    /// Look up the result for a host by name.
    pub fn result_for(&self, name: &str) -> Option<&PerHostResult> {
        self.results.iter().find(|r| r.host.name() == name)
    }
}
