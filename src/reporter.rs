//! Console reporting for rollout runs.

use colored::Colorize;
use indicatif::ProgressBar;
use rollout::{Error, Host, PerHostResult, Reporter, Severity, format_report};

use crate::progress;
use crate::ui;

/// Prints rollout events above a host progress bar.
pub struct ConsoleReporter {
    pb: ProgressBar,
}

impl ConsoleReporter {
    /// Create a reporter tracking `hosts` hosts.
    pub fn new(hosts: usize, quiet: bool) -> Self {
        Self {
            pb: progress::host_bar(hosts as u64, quiet),
        }
    }

    /// Remove the progress bar before the summary is printed.
    pub fn finish(&self) {
        self.pb.finish_and_clear();
    }
}

impl Reporter for ConsoleReporter {
    fn report(&self, host: Option<&Host>, error: &Error) {
        let message = format_report(host, error);
        log::debug!("{message} [{:?}]", error.category());

        self.pb.suspend(|| match error.severity() {
            Severity::Error => {
                ui::error(&message);
                ui::dim(error.category().advice());
            }
            Severity::Info => ui::info(&message),
        });
    }

    fn notice(&self, host: Option<&Host>, message: &str) {
        let message = match host {
            Some(host) => format!("{}: {}", host.name(), message),
            None => message.to_string(),
        };
        self.pb.suspend(|| ui::warn(&message));
    }

    fn finished(&self, result: &PerHostResult) {
        self.pb.set_message(format!(
            "{} {}",
            ui::state_symbol(result.state),
            result.host.name().bold()
        ));
        self.pb.inc(1);
    }
}
