//! The per-device configuration transaction.
//!
//! ```text
//! Idle -> Loaded -> Diffed -> Validated -> Committed
//!                      |                \-> Failed (commit rejected)
//!                      \-> (commit-check false) -> RolledBack | Failed
//! ```
//!
//! A candidate is only ever activated after the device's commit-check
//! returned true. Every other path ends with an explicit rollback whose
//! success is confirmed by comparing candidate and active configuration
//! again; an unconfirmed rollback surfaces as [`Error::UnknownState`].
//!
//! The step methods can be driven one by one; [`ConfigTransaction::run`]
//! drives the whole sequence and always returns a terminal outcome. A step
//! that fails leaves the state unchanged so the caller can roll back.

use crate::error::{Error, Result, TransportError};
use crate::model::Configuration;
use crate::render::Renderer;
use crate::transport::DeviceSession;
use crate::types::{CancelToken, TransactionOptions, TransactionOutcome, TxState};

/// Why a transaction is discarding its candidate.
enum Advance {
    Committed,
    Discard(Option<Error>),
}

/// Drives one candidate configuration through a device session.
pub struct ConfigTransaction<'a> {
    host: &'a str,
    renderer: &'a dyn Renderer,
    options: TransactionOptions,
    cancel: Option<CancelToken>,
    state: TxState,
    diff: Option<String>,
}

impl<'a> ConfigTransaction<'a> {
    /// Create an idle transaction for `host`.
    pub fn new(host: &'a str, renderer: &'a dyn Renderer) -> Self {
        Self {
            host,
            renderer,
            options: TransactionOptions::default(),
            cancel: None,
            state: TxState::Idle,
            diff: None,
        }
    }

    /// Set transaction options.
    pub fn with_options(mut self, options: TransactionOptions) -> Self {
        self.options = options;
        self
    }

    /// Stop before committing once `token` trips.
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Current state.
    pub fn state(&self) -> TxState {
        self.state
    }

    /// Stored diff from the compare step.
    pub fn diff(&self) -> Option<&str> {
        self.diff.as_deref()
    }

    fn transition(&mut self, to: TxState) {
        log::debug!("{}: {} -> {}", self.host, self.state, to);
        self.state = to;
    }

    fn expect(&self, step: &'static str, expected: TxState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(Error::InvalidStep {
                step,
                state: self.state.to_string(),
            })
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }

    /// Render the configuration and submit it as candidate.
    pub fn load(
        &mut self,
        session: &mut dyn DeviceSession,
        configuration: &Configuration,
    ) -> Result<()> {
        self.expect("load", TxState::Idle)?;

        let text = self.renderer.render(configuration)?;
        log::trace!("{}: candidate\n{}", self.host, text);

        session
            .load_config(&text, self.renderer.format())
            .map_err(|e| Error::Load { message: e.message })?;

        self.transition(TxState::Loaded);
        Ok(())
    }

    /// Compare candidate and active configuration once and store the result.
    ///
    /// The diff is informational. A failed compare request is logged and
    /// recorded as no diff; it never stops the transaction.
    pub fn compare(&mut self, session: &mut dyn DeviceSession) -> Result<Option<&str>> {
        self.expect("compare", TxState::Loaded)?;

        self.diff = match session.compare_config() {
            Ok(diff) => diff,
            Err(e) => {
                log::warn!("{}: could not compare configuration: {}", self.host, e);
                None
            }
        };
        match &self.diff {
            Some(diff) => log::info!("{}: candidate differs from active:\n{}", self.host, diff),
            None => log::info!("{}: candidate matches active configuration", self.host),
        }

        self.transition(TxState::Diffed);
        Ok(self.diff.as_deref())
    }

    /// Ask the device to check the candidate. Moves to `Validated` only
    /// when the check passes.
    pub fn validate(&mut self, session: &mut dyn DeviceSession) -> Result<bool> {
        self.expect("validate", TxState::Diffed)?;

        let valid = session.commit_check()?;
        if valid {
            self.transition(TxState::Validated);
        } else {
            log::warn!("{}: commit-check failed", self.host);
        }
        Ok(valid)
    }

    /// Activate a validated candidate.
    pub fn commit(&mut self, session: &mut dyn DeviceSession) -> Result<()> {
        self.expect("commit", TxState::Validated)?;

        match session.commit() {
            Ok(()) => {
                log::info!("{}: configuration committed", self.host);
                self.transition(TxState::Committed);
                Ok(())
            }
            Err(e) => {
                self.transition(TxState::Failed);
                Err(Error::Commit { message: e.message })
            }
        }
    }

    /// Discard the candidate and confirm the active configuration is back
    /// in force.
    pub fn rollback(&mut self, session: &mut dyn DeviceSession) -> Result<()> {
        if self.state.is_terminal() {
            return Err(Error::InvalidStep {
                step: "rollback",
                state: self.state.to_string(),
            });
        }

        session.rollback()?;
        if let Some(remaining) = session.compare_config()? {
            return Err(TransportError::new(format!(
                "candidate still differs after rollback:\n{remaining}"
            ))
            .into());
        }

        log::warn!("{}: candidate rolled back", self.host);
        self.transition(TxState::RolledBack);
        Ok(())
    }

    /// Drive the full sequence and return the terminal outcome.
    pub fn run(
        mut self,
        session: &mut dyn DeviceSession,
        configuration: &Configuration,
    ) -> TransactionOutcome {
        let (state, cause) = match self.advance(session, configuration) {
            Ok(Advance::Committed) => (TxState::Committed, None),
            Ok(Advance::Discard(reason)) => match self.rollback(session) {
                Ok(()) => (TxState::RolledBack, reason),
                Err(e) => {
                    let cause = reason.map_or_else(|| "commit-check failed".to_string(), |r| r.to_string());
                    (TxState::Failed, Some(self.unknown_state(cause, &e)))
                }
            },
            Err(e @ Error::Commit { .. }) => {
                // Leave nothing staged behind the rejected commit
                if let Err(discard) = session.rollback() {
                    log::warn!("{}: discarding rejected candidate failed: {}", self.host, discard);
                }
                (TxState::Failed, Some(e))
            }
            Err(e) => match self.rollback(session) {
                Ok(()) => {
                    self.transition(TxState::Failed);
                    (TxState::Failed, Some(e))
                }
                Err(rollback) => (TxState::Failed, Some(self.unknown_state(e.to_string(), &rollback))),
            },
        };

        TransactionOutcome {
            state,
            cause,
            diff: self.diff,
        }
    }

    fn advance(
        &mut self,
        session: &mut dyn DeviceSession,
        configuration: &Configuration,
    ) -> Result<Advance> {
        self.load(session, configuration)?;
        self.compare(session)?;

        if !self.validate(session)? {
            return Ok(Advance::Discard(None));
        }
        if !self.options.commit {
            return Ok(Advance::Discard(Some(Error::DryRun)));
        }
        if self.is_cancelled() {
            return Ok(Advance::Discard(Some(Error::Cancelled)));
        }

        self.commit(session)?;
        Ok(Advance::Committed)
    }

    fn unknown_state(&mut self, cause: String, rollback: &Error) -> Error {
        log::error!(
            "{}: rollback could not be confirmed, active configuration needs a manual audit",
            self.host
        );
        self.transition(TxState::Failed);
        Error::UnknownState {
            cause,
            rollback: rollback.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Credentials, Host, InboundTraffic, SecurityZone};
    use crate::render::SetRenderer;
    use crate::transport::{MockTransport, Transport};

    const BASELINE: &str = "set system host-name fw1";

    fn config() -> Configuration {
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

    fn mock(f: impl FnOnce(&mut crate::transport::MockDevice)) -> MockTransport {
        let mock = MockTransport::new();
        mock.configure("fw1", |d| {
            d.active = vec![BASELINE.to_string()];
            f(d);
        });
        mock
    }

    fn run_with(mock: &MockTransport, options: TransactionOptions) -> TransactionOutcome {
        let host = Host::new("fw1", "192.0.2.1").unwrap();
        let creds = Credentials::new("admin", Some("secret".to_string()), None).unwrap();
        let mut session = mock.open(&host, &creds).unwrap();
        let outcome = ConfigTransaction::new("fw1", &SetRenderer)
            .with_options(options)
            .run(session.as_mut(), &config());
        session.close().unwrap();
        outcome
    }

    fn run(mock: &MockTransport) -> TransactionOutcome {
        run_with(mock, TransactionOptions::default())
    }

    #[test]
    fn test_validation_true_commits_once() {
        let mock = mock(|_| {});
        let outcome = run(&mock);

        assert_eq!(outcome.state, TxState::Committed);
        assert_eq!(outcome.cause, None);
        let calls = mock.calls("fw1");
        assert_eq!(calls.commit, 1);
        assert_eq!(calls.rollback, 0);
        assert_eq!(calls.compare, 1);
        assert!(outcome.diff.unwrap().contains("+ set security zones security-zone trust"));
        assert_eq!(mock.device("fw1").active.len(), 4);
    }

    #[test]
    fn test_validation_false_rolls_back_and_keeps_active() {
        let mock = mock(|d| d.fail_validation = true);
        let before = mock.device("fw1").active;
        let outcome = run(&mock);

        assert_eq!(outcome.state, TxState::RolledBack);
        assert_eq!(outcome.cause, None);
        let calls = mock.calls("fw1");
        assert_eq!(calls.commit, 0);
        assert_eq!(calls.rollback, 1);
        assert_eq!(mock.device("fw1").active, before);
    }

    #[test]
    fn test_unconfirmed_rollback_is_unknown_state() {
        let mock = mock(|d| {
            d.fail_validation = true;
            d.fail_rollback = true;
        });
        let outcome = run(&mock);

        assert_eq!(outcome.state, TxState::Failed);
        match outcome.cause {
            Some(Error::UnknownState { cause, .. }) => assert_eq!(cause, "commit-check failed"),
            other => panic!("unexpected cause: {other:?}"),
        }
        assert_eq!(mock.calls("fw1").commit, 0);
    }

    #[test]
    fn test_rollback_leaving_diff_is_unknown_state() {
        let mock = mock(|d| {
            d.fail_validation = true;
            d.rollback_leaves_diff = true;
        });
        let outcome = run(&mock);

        assert_eq!(outcome.state, TxState::Failed);
        match outcome.cause {
            Some(Error::UnknownState { cause, rollback }) => {
                assert_eq!(cause, "commit-check failed");
                assert!(rollback.contains("candidate still differs after rollback"));
            }
            other => panic!("unexpected cause: {other:?}"),
        }
        let calls = mock.calls("fw1");
        assert_eq!(calls.rollback, 1);
        assert_eq!(calls.compare, 2);
        assert_eq!(calls.commit, 0);
    }

    #[test]
    fn test_failed_confirming_compare_is_unknown_state() {
        let mock = mock(|d| {
            d.fail_validation = true;
            d.fail_compare = true;
        });
        let before = mock.device("fw1").active;
        let outcome = run(&mock);

        assert_eq!(outcome.state, TxState::Failed);
        match outcome.cause {
            Some(Error::UnknownState { cause, rollback }) => {
                assert_eq!(cause, "commit-check failed");
                assert!(rollback.contains("mock compare failure"));
            }
            other => panic!("unexpected cause: {other:?}"),
        }
        assert_eq!(mock.calls("fw1").rollback, 1);
        assert_eq!(mock.calls("fw1").commit, 0);
        assert_eq!(mock.device("fw1").active, before);
    }

    #[test]
    fn test_rejected_load_rolls_back() {
        let mock = mock(|d| d.reject_load = Some("syntax error".to_string()));
        let before = mock.device("fw1").active;
        let outcome = run(&mock);

        assert_eq!(outcome.state, TxState::Failed);
        assert_eq!(
            outcome.cause,
            Some(Error::Load {
                message: "syntax error".to_string()
            })
        );
        let calls = mock.calls("fw1");
        assert_eq!(calls.rollback, 1);
        assert_eq!(calls.commit_check, 0);
        assert_eq!(mock.device("fw1").active, before);
    }

    #[test]
    fn test_rejected_load_with_failed_rollback_is_unknown_state() {
        let mock = mock(|d| {
            d.reject_load = Some("syntax error".to_string());
            d.fail_rollback = true;
        });
        let outcome = run(&mock);

        assert_eq!(outcome.state, TxState::Failed);
        assert!(matches!(outcome.cause, Some(Error::UnknownState { .. })));
    }

    #[test]
    fn test_render_error_never_loads() {
        let mock = mock(|_| {});
        let host = Host::new("fw1", "192.0.2.1").unwrap();
        let creds = Credentials::new("admin", Some("secret".to_string()), None).unwrap();
        let zone = SecurityZone::new("bad zone", false, None, vec!["ge-0/0/0".to_string()]).unwrap();
        let config = Configuration::new(vec![zone]).unwrap();

        let mut session = mock.open(&host, &creds).unwrap();
        let outcome = ConfigTransaction::new("fw1", &SetRenderer).run(session.as_mut(), &config);

        assert_eq!(outcome.state, TxState::Failed);
        assert!(matches!(outcome.cause, Some(Error::Render { .. })));
        assert_eq!(mock.calls("fw1").load, 0);
        assert_eq!(mock.calls("fw1").rollback, 1);
    }

    #[test]
    fn test_commit_check_request_failure_rolls_back() {
        let mock = mock(|d| d.fail_commit_check_request = true);
        let outcome = run(&mock);

        assert_eq!(outcome.state, TxState::Failed);
        assert!(matches!(outcome.cause, Some(Error::Transport(_))));
        assert_eq!(mock.calls("fw1").rollback, 1);
        assert_eq!(mock.calls("fw1").commit, 0);
    }

    #[test]
    fn test_rejected_commit_is_commit_error() {
        let mock = mock(|d| d.reject_commit = Some("database locked".to_string()));
        let before = mock.device("fw1").active;
        let outcome = run(&mock);

        assert_eq!(outcome.state, TxState::Failed);
        assert_eq!(
            outcome.cause,
            Some(Error::Commit {
                message: "database locked".to_string()
            })
        );
        assert_eq!(mock.calls("fw1").commit, 1);
        assert_eq!(mock.device("fw1").active, before);
    }

    #[test]
    fn test_compare_failure_does_not_gate() {
        let mock = mock(|d| d.fail_compare = true);
        let outcome = run(&mock);

        assert_eq!(outcome.state, TxState::Committed);
        assert_eq!(outcome.diff, None);
    }

    #[test]
    fn test_dry_run_never_commits() {
        let mock = mock(|_| {});
        let before = mock.device("fw1").active;
        let outcome = run_with(&mock, TransactionOptions { commit: false });

        assert_eq!(outcome.state, TxState::RolledBack);
        assert_eq!(outcome.cause, Some(Error::DryRun));
        assert!(outcome.diff.is_some());
        assert_eq!(mock.calls("fw1").commit, 0);
        assert_eq!(mock.device("fw1").active, before);
    }

    #[test]
    fn test_cancelled_transaction_rolls_back_before_commit() {
        let mock = mock(|_| {});
        let host = Host::new("fw1", "192.0.2.1").unwrap();
        let creds = Credentials::new("admin", Some("secret".to_string()), None).unwrap();
        let token = CancelToken::new();
        token.cancel();

        let mut session = mock.open(&host, &creds).unwrap();
        let outcome = ConfigTransaction::new("fw1", &SetRenderer)
            .with_cancel(token)
            .run(session.as_mut(), &config());

        assert_eq!(outcome.state, TxState::RolledBack);
        assert_eq!(outcome.cause, Some(Error::Cancelled));
        assert_eq!(mock.calls("fw1").commit, 0);
    }

    #[test]
    fn test_steps_enforce_order() {
        let mock = mock(|_| {});
        let host = Host::new("fw1", "192.0.2.1").unwrap();
        let creds = Credentials::new("admin", Some("secret".to_string()), None).unwrap();
        let mut session = mock.open(&host, &creds).unwrap();
        let mut tx = ConfigTransaction::new("fw1", &SetRenderer);

        let err = tx.commit(session.as_mut()).unwrap_err();
        assert!(matches!(err, Error::InvalidStep { step: "commit", .. }));
        assert!(tx.validate(session.as_mut()).is_err());
        assert_eq!(mock.calls("fw1").commit_check, 0);

        tx.load(session.as_mut(), &config()).unwrap();
        assert_eq!(tx.state(), TxState::Loaded);
        assert!(tx.load(session.as_mut(), &config()).is_err());

        tx.compare(session.as_mut()).unwrap();
        assert!(tx.diff().is_some());
        assert!(tx.validate(session.as_mut()).unwrap());
        tx.commit(session.as_mut()).unwrap();
        assert_eq!(tx.state(), TxState::Committed);
        assert!(tx.rollback(session.as_mut()).is_err());
    }
}
