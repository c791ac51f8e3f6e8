//! Surfacing rollout failures to the operator.
//!
//! Reporting is a side channel: the orchestrator always keeps the error in
//! the [`RunReport`](crate::RunReport), whatever a reporter does with it.

use crate::error::{Error, Severity};
use crate::model::Host;
use crate::types::PerHostResult;
use std::sync::Mutex;

/// Receives every non-success outcome of a run.
pub trait Reporter: Send + Sync {
    /// Report an error, attributed to `host` when known.
    fn report(&self, host: Option<&Host>, error: &Error);

    /// Report an informational message.
    fn notice(&self, host: Option<&Host>, message: &str);

    /// Called once per host after its result is recorded.
    fn finished(&self, _result: &PerHostResult) {}
}

/// Format an error for display, naming the host when known.
pub fn format_report(host: Option<&Host>, error: &Error) -> String {
    match host {
        Some(host) => format!("{}: {}", host.name(), error),
        None => error.to_string(),
    }
}

/// Reporter that writes through the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn report(&self, host: Option<&Host>, error: &Error) {
        let message = format_report(host, error);
        match error.severity() {
            Severity::Info => log::info!("{message}"),
            Severity::Error => log::error!("{message}"),
        }
    }

    fn notice(&self, host: Option<&Host>, message: &str) {
        match host {
            Some(host) => log::info!("{}: {}", host.name(), message),
            None => log::info!("{message}"),
        }
    }
}

/// An event captured by [`MemoryReporter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportEvent {
    /// From [`Reporter::report`]
    Error {
        /// Host name, if known
        host: Option<String>,
        /// The reported error
        error: Error,
    },
    /// From [`Reporter::notice`]
    Notice {
        /// Host name, if known
        host: Option<String>,
        /// The message
        message: String,
    },
}

/// Reporter that records events in memory for inspection.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    events: Mutex<Vec<ReportEvent>>,
}

impl MemoryReporter {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Events recorded so far, in arrival order.
    pub fn events(&self) -> Vec<ReportEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Errors recorded so far.
    pub fn errors(&self) -> Vec<Error> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ReportEvent::Error { error, .. } => Some(error),
                ReportEvent::Notice { .. } => None,
            })
            .collect()
    }

    fn push(&self, event: ReportEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl Reporter for MemoryReporter {
    fn report(&self, host: Option<&Host>, error: &Error) {
        self.push(ReportEvent::Error {
            host: host.map(|h| h.name().to_string()),
            error: error.clone(),
        });
    }

    fn notice(&self, host: Option<&Host>, message: &str) {
        self.push(ReportEvent::Notice {
            host: host.map(|h| h.name().to_string()),
            message: message.to_string(),
        });
    }
}
