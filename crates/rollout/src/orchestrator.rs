//! Fleet orchestration: one transaction per host, one abort decision.
//!
//! The orchestrator is the only place that decides whether a host's outcome
//! stops the run. Under [`AbortPolicy::FailFast`] the first connection error
//! or `Failed` transaction trips a shared [`CancelToken`]; hosts not yet
//! started are skipped and in-flight transactions roll back before commit.
//! `RolledBack` outcomes never abort.

use crate::connection::ConnectionManager;
use crate::error::TransportError;
use crate::model::{Host, RolloutContext};
use crate::render::Renderer;
use crate::reporter::Reporter;
use crate::retry::with_retry;
use crate::transaction::ConfigTransaction;
use crate::transport::Transport;
use crate::types::{
    AbortPolicy, CancelToken, PerHostResult, RolloutOptions, RunReport, TransactionOutcome,
    TxState,
};
use rayon::prelude::*;
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Apply,
    Check,
}

/// Drives a configuration rollout across an inventory.
pub struct FleetOrchestrator<'a> {
    transport: &'a dyn Transport,
    renderer: &'a dyn Renderer,
    reporter: &'a dyn Reporter,
    options: RolloutOptions,
}

impl<'a> FleetOrchestrator<'a> {
    /// Create an orchestrator with default options (fail-fast, sequential).
    pub fn new(
        transport: &'a dyn Transport,
        renderer: &'a dyn Renderer,
        reporter: &'a dyn Reporter,
    ) -> Self {
        Self {
            transport,
            renderer,
            reporter,
            options: RolloutOptions::default(),
        }
    }

    /// Set run options.
    pub fn with_options(mut self, options: RolloutOptions) -> Self {
        self.options = options;
        self
    }

    /// Current run options.
    pub fn options(&self) -> &RolloutOptions {
        &self.options
    }

    /// Push the configuration to every host in the inventory.
    pub fn run(&self, context: &RolloutContext) -> RunReport {
        self.execute(context, Mode::Apply)
    }

    /// Open and close a session with every host without touching its
    /// configuration. Reachable hosts end `Idle`.
    pub fn check(&self, context: &RolloutContext) -> RunReport {
        self.execute(context, Mode::Check)
    }

    fn execute(&self, context: &RolloutContext, mode: Mode) -> RunReport {
        let inventory = context.inventory();
        if inventory.is_empty() {
            self.reporter.notice(None, "inventory is empty, nothing to do");
            return RunReport::default();
        }

        let jobs = self.options.jobs.clamp(1, inventory.len());
        log::info!(
            "Processing {} host(s) ({}, {} job(s))",
            inventory.len(),
            self.options.policy,
            jobs
        );

        let cancel = CancelToken::new();
        let collected: Mutex<Vec<(usize, PerHostResult)>> =
            Mutex::new(Vec::with_capacity(inventory.len()));
        let first_abort: Mutex<Option<String>> = Mutex::new(None);

        let visit = |index: usize, host: &Host| {
            if cancel.is_cancelled() {
                log::debug!("Skipping {}: run aborted", host.name());
                return;
            }

            let result = self.process(context, host, mode, &cancel);
            if self.aborts(&result) {
                let mut first = first_abort.lock().unwrap_or_else(PoisonError::into_inner);
                if first.is_none() {
                    log::error!("Aborting run: {} failed", host.name());
                    *first = Some(host.name().to_string());
                }
                cancel.cancel();
            }

            collected
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((index, result));
        };

        if jobs > 1 {
            match rayon::ThreadPoolBuilder::new().num_threads(jobs).build() {
                Ok(pool) => pool.install(|| {
                    inventory
                        .par_iter()
                        .enumerate()
                        .for_each(|(index, host)| visit(index, host));
                }),
                Err(e) => {
                    log::warn!("Failed to create worker pool ({e}), processing hosts sequentially");
                    inventory.iter().enumerate().for_each(|(index, host)| visit(index, host));
                }
            }
        } else {
            inventory.iter().enumerate().for_each(|(index, host)| visit(index, host));
        }

        let collected = collected.into_inner().unwrap_or_else(PoisonError::into_inner);
        let aborted_by = first_abort.into_inner().unwrap_or_else(PoisonError::into_inner);
        let report = assemble(inventory, collected, aborted_by);

        log::info!(
            "Run finished: {} committed, {} rolled back, {} failed, {} skipped",
            report.count(TxState::Committed),
            report.count(TxState::RolledBack),
            report.count(TxState::Failed),
            report.skipped.len()
        );
        report
    }

    fn aborts(&self, result: &PerHostResult) -> bool {
        self.options.policy == AbortPolicy::FailFast && result.is_failure()
    }

    fn process(
        &self,
        context: &RolloutContext,
        host: &Host,
        mode: Mode,
        cancel: &CancelToken,
    ) -> PerHostResult {
        let started = Instant::now();
        let manager = ConnectionManager::new(self.transport);

        let opened = with_retry(
            &self.options.connect_retry,
            |attempt, err, delay| {
                log::warn!(
                    "{}: attempt {} failed ({}), retrying in {:.1}s",
                    host.name(),
                    attempt,
                    err,
                    delay.as_secs_f64()
                );
            },
            || manager.open(host, context.credentials()),
        );

        let outcome = match opened {
            Err(e) => TransactionOutcome {
                state: TxState::Failed,
                cause: Some(e),
                diff: None,
            },
            Ok(mut conn) => {
                let outcome = match (mode, conn.session()) {
                    (Mode::Check, Some(_)) => TransactionOutcome {
                        state: TxState::Idle,
                        cause: None,
                        diff: None,
                    },
                    (Mode::Apply, Some(session)) => ConfigTransaction::new(host.name(), self.renderer)
                        .with_options(self.options.transaction.clone())
                        .with_cancel(cancel.clone())
                        .run(session, context.configuration()),
                    (_, None) => TransactionOutcome {
                        state: TxState::Failed,
                        cause: Some(TransportError::new("session closed before use").into()),
                        diff: None,
                    },
                };
                if let Err(e) = conn.close() {
                    self.reporter
                        .notice(Some(host), &format!("closing session failed: {e}"));
                }
                outcome
            }
        };

        self.report(host, &outcome);

        let result = PerHostResult {
            host: host.clone(),
            state: outcome.state,
            cause: outcome.cause,
            diff: outcome.diff,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };
        self.reporter.finished(&result);
        result
    }

    fn report(&self, host: &Host, outcome: &TransactionOutcome) {
        match (&outcome.cause, outcome.state) {
            (Some(cause), _) => self.reporter.report(Some(host), cause),
            (None, TxState::RolledBack) => self
                .reporter
                .notice(Some(host), "commit-check failed, candidate rolled back"),
            (None, _) => {}
        }
    }
}

/// Put results back in inventory order and list untouched hosts.
fn assemble(
    inventory: &[Host],
    collected: Vec<(usize, PerHostResult)>,
    aborted_by: Option<String>,
) -> RunReport {
    let mut slots: Vec<Option<PerHostResult>> = vec![None; inventory.len()];
    for (index, result) in collected {
        slots[index] = Some(result);
    }

    let mut report = RunReport {
        aborted_by,
        ..Default::default()
    };
    for (host, slot) in inventory.iter().zip(slots) {
        match slot {
            Some(result) => report.results.push(result),
            None => report.skipped.push(host.clone()),
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConnectionErrorKind, Error};
    use crate::model::{Configuration, Credentials, InboundTraffic, SecurityZone};
    use crate::render::SetRenderer;
    use crate::reporter::{MemoryReporter, ReportEvent};
    use crate::retry::RetryConfig;
    use crate::transport::MockTransport;
    use crate::types::TransactionOptions;
    use std::time::Duration;

    fn trust_zone_config() -> Configuration {
        let zone = SecurityZone::new(
            "trust",
            false,
            Some(InboundTraffic::new(
                vec!["ssh".to_string()],
                vec!["icmp".to_string()],
            )),
            vec!["ge-0/0/0".to_string()],
        )
        .unwrap();
        Configuration::new(vec![zone]).unwrap()
    }

    fn context(hosts: &[&str]) -> RolloutContext {
        let inventory = hosts
            .iter()
            .enumerate()
            .map(|(i, name)| Host::new(*name, format!("10.0.0.{}", i + 1)).unwrap())
            .collect();
        let creds = Credentials::new("admin", Some("secret".to_string()), None).unwrap();
        RolloutContext::new(creds, inventory, trust_zone_config())
    }

    fn assert_sessions_closed(mock: &MockTransport, hosts: &[&str]) {
        for host in hosts {
            let device = mock.device(host);
            let opened = if device.connect_error.is_some() { 0 } else { device.calls.open.min(1) };
            assert_eq!(device.calls.close, opened, "close count for {host}");
        }
    }

    #[test]
    fn test_connection_error_aborts_fleet() {
        let mock = MockTransport::new();
        mock.configure("fw1", |d| d.connect_error = Some(ConnectionErrorKind::Unreachable));
        let reporter = MemoryReporter::new();

        let report = FleetOrchestrator::new(&mock, &SetRenderer, &reporter).run(&context(&["fw1", "fw2"]));

        assert!(!report.is_success());
        assert_eq!(report.aborted_by.as_deref(), Some("fw1"));
        assert_eq!(report.results.len(), 1);
        assert!(report.results[0].is_connection_error());
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].name(), "fw2");
        assert_eq!(mock.calls("fw2").open, 0);

        let errors = reporter.errors();
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            errors[0],
            Error::Connection {
                kind: ConnectionErrorKind::Unreachable,
                ..
            }
        ));
    }

    #[test]
    fn test_validation_false_rolls_back_without_abort() {
        let mock = MockTransport::new();
        mock.configure("fw1", |d| {
            d.active = vec!["set system host-name fw1".to_string()];
            d.fail_validation = true;
        });
        let before = mock.device("fw1").active;
        let reporter = MemoryReporter::new();

        let report = FleetOrchestrator::new(&mock, &SetRenderer, &reporter).run(&context(&["fw1"]));

        assert!(report.is_success());
        assert_eq!(report.aborted_by, None);
        assert_eq!(report.results[0].state, TxState::RolledBack);
        assert_eq!(mock.calls("fw1").rollback, 1);
        assert_eq!(mock.calls("fw1").commit, 0);
        assert_eq!(mock.device("fw1").active, before);
        assert_sessions_closed(&mock, &["fw1"]);
        assert!(reporter.errors().is_empty());
        assert!(matches!(reporter.events()[0], ReportEvent::Notice { .. }));
    }

    #[test]
    fn test_validation_true_commits_once() {
        let mock = MockTransport::new();
        let reporter = MemoryReporter::new();

        let report = FleetOrchestrator::new(&mock, &SetRenderer, &reporter).run(&context(&["fw1"]));

        assert!(report.is_success());
        assert_eq!(report.results[0].state, TxState::Committed);
        assert!(report.results[0].diff.is_some());
        assert_eq!(mock.calls("fw1").commit, 1);
        assert_eq!(mock.calls("fw1").rollback, 0);
        assert_sessions_closed(&mock, &["fw1"]);
        assert!(reporter.events().is_empty());
    }

    #[test]
    fn test_rolled_back_host_does_not_stop_fleet() {
        let mock = MockTransport::new();
        mock.configure("fw1", |d| d.fail_validation = true);
        let hosts = ["fw1", "fw2", "fw3"];

        let report = FleetOrchestrator::new(&mock, &SetRenderer, &MemoryReporter::new()).run(&context(&hosts));

        assert!(report.is_success());
        assert_eq!(report.count(TxState::RolledBack), 1);
        assert_eq!(report.count(TxState::Committed), 2);
        assert_sessions_closed(&mock, &hosts);
    }

    #[test]
    fn test_failed_transaction_aborts_fail_fast() {
        let mock = MockTransport::new();
        mock.configure("fw1", |d| d.reject_commit = Some("database locked".to_string()));

        let report = FleetOrchestrator::new(&mock, &SetRenderer, &MemoryReporter::new())
            .run(&context(&["fw1", "fw2"]));

        assert!(!report.is_success());
        assert_eq!(report.aborted_by.as_deref(), Some("fw1"));
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(mock.calls("fw2").open, 0);
        assert_sessions_closed(&mock, &["fw1"]);
    }

    #[test]
    fn test_best_effort_attempts_every_host() {
        let mock = MockTransport::new();
        mock.configure("fw1", |d| d.connect_error = Some(ConnectionErrorKind::Refused));
        mock.configure("fw2", |d| d.reject_load = Some("syntax error".to_string()));
        let hosts = ["fw1", "fw2", "fw3"];
        let reporter = MemoryReporter::new();

        let report = FleetOrchestrator::new(&mock, &SetRenderer, &reporter)
            .with_options(RolloutOptions {
                policy: AbortPolicy::BestEffort,
                ..Default::default()
            })
            .run(&context(&hosts));

        assert!(!report.is_success());
        assert_eq!(report.aborted_by, None);
        assert!(report.skipped.is_empty());
        assert_eq!(report.count(TxState::Failed), 2);
        assert_eq!(report.result_for("fw3").unwrap().state, TxState::Committed);
        assert_eq!(reporter.errors().len(), 2);
        assert_sessions_closed(&mock, &hosts);
    }

    #[test]
    fn test_dry_run_leaves_fleet_untouched() {
        let mock = MockTransport::new();
        let hosts = ["fw1", "fw2"];

        let report = FleetOrchestrator::new(&mock, &SetRenderer, &MemoryReporter::new())
            .with_options(RolloutOptions {
                transaction: TransactionOptions { commit: false },
                ..Default::default()
            })
            .run(&context(&hosts));

        assert!(report.is_success());
        assert_eq!(report.count(TxState::RolledBack), 2);
        for host in hosts {
            assert_eq!(mock.calls(host).commit, 0);
            assert!(mock.device(host).active.is_empty());
        }
    }

    #[test]
    fn test_parallel_results_keep_inventory_order() {
        let mock = MockTransport::new();
        let hosts = ["fw1", "fw2", "fw3", "fw4", "fw5"];

        let report = FleetOrchestrator::new(&mock, &SetRenderer, &MemoryReporter::new())
            .with_options(RolloutOptions {
                jobs: 3,
                ..Default::default()
            })
            .run(&context(&hosts));

        assert!(report.is_success());
        let names: Vec<_> = report.results.iter().map(|r| r.host.name()).collect();
        assert_eq!(names, hosts);
        assert_sessions_closed(&mock, &hosts);
    }

    #[test]
    fn test_parallel_abort_accounts_for_every_host() {
        let mock = MockTransport::new();
        mock.configure("fw1", |d| d.connect_error = Some(ConnectionErrorKind::AuthFailed));
        let hosts = ["fw1", "fw2", "fw3", "fw4", "fw5", "fw6"];

        let report = FleetOrchestrator::new(&mock, &SetRenderer, &MemoryReporter::new())
            .with_options(RolloutOptions {
                jobs: 2,
                ..Default::default()
            })
            .run(&context(&hosts));

        assert!(!report.is_success());
        assert_eq!(report.aborted_by.as_deref(), Some("fw1"));
        assert_eq!(report.results.len() + report.skipped.len(), hosts.len());
        for skipped in &report.skipped {
            assert_eq!(mock.calls(skipped.name()).open, 0);
        }
        for result in &report.results {
            assert!(result.state.is_terminal());
        }
        assert_sessions_closed(&mock, &hosts);
    }

    #[test]
    fn test_connect_retry_recovers_transient_failure() {
        let mock = MockTransport::new();
        mock.configure("fw1", |d| d.transient_connect_errors = 2);

        let report = FleetOrchestrator::new(&mock, &SetRenderer, &MemoryReporter::new())
            .with_options(RolloutOptions {
                connect_retry: RetryConfig {
                    max_attempts: 3,
                    base_delay: Duration::from_millis(1),
                    backoff_factor: 1.0,
                    max_delay: Duration::from_millis(1),
                },
                ..Default::default()
            })
            .run(&context(&["fw1"]));

        assert!(report.is_success());
        assert_eq!(mock.calls("fw1").open, 3);
        assert_eq!(mock.calls("fw1").close, 1);
    }

    #[test]
    fn test_auth_failure_is_not_retried() {
        let mock = MockTransport::new();
        mock.configure("fw1", |d| d.connect_error = Some(ConnectionErrorKind::AuthFailed));

        let report = FleetOrchestrator::new(&mock, &SetRenderer, &MemoryReporter::new())
            .with_options(RolloutOptions {
                connect_retry: RetryConfig::with_retries(3),
                ..Default::default()
            })
            .run(&context(&["fw1"]));

        assert!(!report.is_success());
        assert!(report.results[0].is_connection_error());
        assert_eq!(mock.calls("fw1").open, 1);
    }

    #[test]
    fn test_check_touches_no_configuration() {
        let mock = MockTransport::new();
        mock.configure("fw2", |d| d.connect_error = Some(ConnectionErrorKind::Timeout));
        let hosts = ["fw1", "fw2", "fw3"];

        let report = FleetOrchestrator::new(&mock, &SetRenderer, &MemoryReporter::new())
            .with_options(RolloutOptions {
                policy: AbortPolicy::BestEffort,
                ..Default::default()
            })
            .check(&context(&hosts));

        assert!(!report.is_success());
        assert_eq!(report.count(TxState::Idle), 2);
        assert_eq!(report.count(TxState::Failed), 1);
        for host in hosts {
            assert_eq!(mock.calls(host).load, 0);
        }
        assert_sessions_closed(&mock, &hosts);
    }

    #[test]
    fn test_empty_inventory_is_success() {
        let mock = MockTransport::new();
        let reporter = MemoryReporter::new();
        let creds = Credentials::new("admin", Some("secret".to_string()), None).unwrap();
        let context = RolloutContext::new(creds, vec![], trust_zone_config());

        let report = FleetOrchestrator::new(&mock, &SetRenderer, &reporter).run(&context);

        assert!(report.is_success());
        assert!(report.results.is_empty());
        assert_eq!(reporter.events().len(), 1);
    }

    #[test]
    fn test_failed_close_is_reported_without_changing_result() {
        let mock = MockTransport::new();
        mock.configure("fw1", |d| d.fail_close = true);
        let reporter = MemoryReporter::new();

        let report = FleetOrchestrator::new(&mock, &SetRenderer, &reporter).run(&context(&["fw1"]));

        assert!(report.is_success());
        assert_eq!(report.results[0].state, TxState::Committed);
        assert_eq!(mock.calls("fw1").close, 1);
        assert!(reporter.events().iter().any(|event| matches!(
            event,
            ReportEvent::Notice { host: Some(host), message }
                if host == "fw1" && message.starts_with("closing session failed")
        )));
    }
}
