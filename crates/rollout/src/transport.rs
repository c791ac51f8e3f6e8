//! Device transport traits and an in-memory mock.
//!
//! The rollout core depends only on these signatures and their
//! success/failure contracts. [`MockTransport`] simulates a fleet of devices
//! with an active and a candidate configuration each, so transactions can
//! be tested without a network:
//!
//! ```
//! use rollout::{ConfigFormat, Credentials, Host, MockTransport, Transport};
//!
//! let mock = MockTransport::new();
//! mock.configure("fw1", |device| device.fail_validation = true);
//!
//! let host = Host::new("fw1", "192.0.2.1").unwrap();
//! let creds = Credentials::new("admin", Some("secret".into()), None).unwrap();
//! let mut session = mock.open(&host, &creds).unwrap();
//!
//! session.load_config("set security zones security-zone trust", ConfigFormat::Set).unwrap();
//! assert!(!session.commit_check().unwrap());
//! ```

use crate::error::{ConnectError, ConnectionErrorKind, TransportError};
use crate::model::{Credentials, Host};
use crate::types::ConfigFormat;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// An open management session with one device.
///
/// All calls block until the device answers.
pub trait DeviceSession: Send {
    /// Submit candidate configuration. Merges into the candidate rather
    /// than replacing it.
    fn load_config(&mut self, text: &str, format: ConfigFormat) -> Result<(), TransportError>;

    /// Difference between candidate and active configuration, `None` when
    /// they are identical.
    fn compare_config(&mut self) -> Result<Option<String>, TransportError>;

    /// Ask the device to check the candidate without activating it.
    fn commit_check(&mut self) -> Result<bool, TransportError>;

    /// Activate the candidate.
    fn commit(&mut self) -> Result<(), TransportError>;

    /// Discard the candidate, restoring it to the active configuration.
    fn rollback(&mut self) -> Result<(), TransportError>;

    /// End the session.
    fn close(&mut self) -> Result<(), TransportError>;
}

/// Opens device sessions.
pub trait Transport: Send + Sync {
    /// Open a session with `host`.
    fn open(
        &self,
        host: &Host,
        credentials: &Credentials,
    ) -> Result<Box<dyn DeviceSession>, ConnectError>;
}

/// Per-operation call counters recorded by [`MockTransport`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    /// Session opens, failed ones included
    pub open: u32,
    /// Candidate loads
    pub load: u32,
    /// Candidate/active comparisons
    pub compare: u32,
    /// Commit-check requests
    pub commit_check: u32,
    /// Commit requests
    pub commit: u32,
    /// Candidate discards
    pub rollback: u32,
    /// Session closes
    pub close: u32,
}

/// Simulated device state and scripted failures.
#[derive(Debug, Clone, Default)]
pub struct MockDevice {
    /// Active configuration lines
    pub active: Vec<String>,
    /// Candidate configuration lines of the open session
    pub candidate: Vec<String>,
    /// Every open fails with this kind
    pub connect_error: Option<ConnectionErrorKind>,
    /// The next N opens fail as unreachable
    pub transient_connect_errors: u32,
    /// Load fails with this message (after staging the lines)
    pub reject_load: Option<String>,
    /// Compare requests fail
    pub fail_compare: bool,
    /// Commit-check answers false
    pub fail_validation: bool,
    /// Commit-check requests fail outright
    pub fail_commit_check_request: bool,
    /// Commit fails with this message
    pub reject_commit: Option<String>,
    /// Rollback requests fail
    pub fail_rollback: bool,
    /// Rollback requests succeed but leave the candidate untouched
    pub rollback_leaves_diff: bool,
    /// Close requests fail
    pub fail_close: bool,
    /// Call counters
    pub calls: CallCounts,
}

impl MockDevice {
    fn diff(&self) -> Option<String> {
        let mut lines = Vec::new();
        for line in &self.active {
            if !self.candidate.contains(line) {
                lines.push(format!("- {line}"));
            }
        }
        for line in &self.candidate {
            if !self.active.contains(line) {
                lines.push(format!("+ {line}"));
            }
        }
        if lines.is_empty() {
            None
        } else {
            Some(lines.join("\n"))
        }
    }
}

/// In-memory transport for testing without devices.
///
/// Unknown hosts behave as healthy devices with an empty configuration.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    devices: Arc<Mutex<HashMap<String, MockDevice>>>,
}

impl MockTransport {
    /// Create a mock with no configured devices.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adjust the simulated device for `host`.
    pub fn configure(&self, host: &str, f: impl FnOnce(&mut MockDevice)) {
        let mut devices = self.devices.lock().unwrap();
        f(devices.entry(host.to_string()).or_default());
    }

    /// Snapshot of the simulated device for `host`.
    pub fn device(&self, host: &str) -> MockDevice {
        let devices = self.devices.lock().unwrap();
        devices.get(host).cloned().unwrap_or_default()
    }

    /// Call counters for `host`.
    pub fn calls(&self, host: &str) -> CallCounts {
        self.device(host).calls
    }
}

impl Transport for MockTransport {
    fn open(
        &self,
        host: &Host,
        _credentials: &Credentials,
    ) -> Result<Box<dyn DeviceSession>, ConnectError> {
        let mut devices = self.devices.lock().unwrap();
        let device = devices.entry(host.name().to_string()).or_default();
        device.calls.open += 1;

        if let Some(kind) = device.connect_error {
            return Err(ConnectError::new(kind, format!("mock {kind}")));
        }
        if device.transient_connect_errors > 0 {
            device.transient_connect_errors -= 1;
            return Err(ConnectError::new(
                ConnectionErrorKind::Unreachable,
                "mock transient failure",
            ));
        }

        device.candidate = device.active.clone();
        Ok(Box::new(MockSession {
            host: host.name().to_string(),
            devices: Arc::clone(&self.devices),
        }))
    }
}

struct MockSession {
    host: String,
    devices: Arc<Mutex<HashMap<String, MockDevice>>>,
}

impl MockSession {
    fn with_device<T>(&self, f: impl FnOnce(&mut MockDevice) -> T) -> T {
        let mut devices = self.devices.lock().unwrap();
        f(devices.entry(self.host.clone()).or_default())
    }
}

impl DeviceSession for MockSession {
    fn load_config(&mut self, text: &str, _format: ConfigFormat) -> Result<(), TransportError> {
        self.with_device(|device| {
            device.calls.load += 1;
            for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
                if !device.candidate.iter().any(|c| c == line) {
                    device.candidate.push(line.to_string());
                }
            }
            match &device.reject_load {
                Some(message) => Err(TransportError::new(message.clone())),
                None => Ok(()),
            }
        })
    }

    fn compare_config(&mut self) -> Result<Option<String>, TransportError> {
        self.with_device(|device| {
            device.calls.compare += 1;
            if device.fail_compare {
                return Err(TransportError::new("mock compare failure"));
            }
            Ok(device.diff())
        })
    }

    fn commit_check(&mut self) -> Result<bool, TransportError> {
        self.with_device(|device| {
            device.calls.commit_check += 1;
            if device.fail_commit_check_request {
                return Err(TransportError::new("mock commit-check request failure"));
            }
            Ok(!device.fail_validation)
        })
    }

    fn commit(&mut self) -> Result<(), TransportError> {
        self.with_device(|device| {
            device.calls.commit += 1;
            if let Some(message) = &device.reject_commit {
                return Err(TransportError::new(message.clone()));
            }
            device.active = device.candidate.clone();
            Ok(())
        })
    }

    fn rollback(&mut self) -> Result<(), TransportError> {
        self.with_device(|device| {
            device.calls.rollback += 1;
            if device.fail_rollback {
                return Err(TransportError::new("mock rollback failure"));
            }
            if !device.rollback_leaves_diff {
                device.candidate = device.active.clone();
            }
            Ok(())
        })
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.with_device(|device| {
            device.calls.close += 1;
            if device.fail_close {
                return Err(TransportError::new("mock close failure"));
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> Credentials {
        Credentials::new("admin", Some("secret".to_string()), None).unwrap()
    }

    #[test]
    fn test_mock_unknown_host_is_healthy() {
        let mock = MockTransport::new();
        let host = Host::new("fw1", "192.0.2.1").unwrap();
        let mut session = mock.open(&host, &creds()).unwrap();
        assert_eq!(session.compare_config().unwrap(), None);
        assert!(session.commit_check().unwrap());
        session.close().unwrap();
        assert_eq!(mock.calls("fw1").open, 1);
        assert_eq!(mock.calls("fw1").close, 1);
    }

    #[test]
    fn test_mock_diff_and_commit() {
        let mock = MockTransport::new();
        mock.configure("fw1", |d| d.active = vec!["set system host-name fw1".to_string()]);
        let host = Host::new("fw1", "192.0.2.1").unwrap();
        let mut session = mock.open(&host, &creds()).unwrap();

        session
            .load_config("set security zones security-zone trust", ConfigFormat::Set)
            .unwrap();
        assert_eq!(
            session.compare_config().unwrap().as_deref(),
            Some("+ set security zones security-zone trust")
        );

        session.commit().unwrap();
        assert_eq!(mock.device("fw1").active.len(), 2);
    }

    #[test]
    fn test_mock_rollback_restores_candidate() {
        let mock = MockTransport::new();
        let host = Host::new("fw1", "192.0.2.1").unwrap();
        let mut session = mock.open(&host, &creds()).unwrap();

        session.load_config("set a\nset b", ConfigFormat::Set).unwrap();
        session.rollback().unwrap();
        assert_eq!(session.compare_config().unwrap(), None);
        assert!(mock.device("fw1").active.is_empty());
    }

    #[test]
    fn test_mock_connect_errors() {
        let mock = MockTransport::new();
        mock.configure("fw1", |d| d.connect_error = Some(ConnectionErrorKind::Refused));
        mock.configure("fw2", |d| d.transient_connect_errors = 1);
        let fw1 = Host::new("fw1", "192.0.2.1").unwrap();
        let fw2 = Host::new("fw2", "192.0.2.2").unwrap();

        let err = mock.open(&fw1, &creds()).err().unwrap();
        assert_eq!(err.kind, ConnectionErrorKind::Refused);

        assert!(mock.open(&fw2, &creds()).is_err());
        assert!(mock.open(&fw2, &creds()).is_ok());
        assert_eq!(mock.calls("fw2").open, 2);
    }
}
