//! # rollout
//!
//! Validated configuration rollout for device fleets.
//!
//! A candidate configuration is only ever activated after the device itself
//! accepted it in a commit-check. Everything else ends in a confirmed
//! rollback, or in an explicit unknown-state error when that confirmation
//! is impossible.
//!
//! ## Core Concepts
//!
//! - **Model**: validated hosts, credentials and security zones
//! - **ConnectionManager**: opens sessions; a [`Connection`] closes exactly once
//! - **ConfigTransaction**: load, diff, validate, then commit or roll back
//! - **FleetOrchestrator**: one transaction per host under an [`AbortPolicy`]
//! - **Reporter**: surfaces every non-success outcome
//!
//! ## Example
//!
//! ```
//! use rollout::{
//!     Configuration, Credentials, FleetOrchestrator, Host, InboundTraffic, LogReporter,
//!     MockTransport, RolloutContext, SecurityZone, SetRenderer, TxState,
//! };
//!
//! let zone = SecurityZone::new(
//!     "trust",
//!     false,
//!     Some(InboundTraffic::new(vec!["ssh".into()], vec!["icmp".into()])),
//!     vec!["ge-0/0/0".into()],
//! )?;
//! let context = RolloutContext::new(
//!     Credentials::new("admin", Some("secret".into()), None)?,
//!     vec![Host::new("fw1", "10.0.0.1")?],
//!     Configuration::new(vec![zone])?,
//! );
//!
//! let transport = MockTransport::new();
//! let report = FleetOrchestrator::new(&transport, &SetRenderer, &LogReporter).run(&context);
//!
//! assert!(report.is_success());
//! assert_eq!(report.results[0].state, TxState::Committed);
//! # Ok::<(), rollout::ModelError>(())
//! ```
//!
//! ## Collaborator Traits
//!
//! - [`Transport`] / [`DeviceSession`]: the device RPC layer
//! - [`Renderer`]: turns a [`Configuration`] into device syntax
//! - [`Reporter`]: receives failures and notices
//!
//! The core never talks to a network or a terminal directly.

pub mod connection;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod render;
pub mod reporter;
pub mod retry;
pub mod transaction;
pub mod transport;
pub mod types;

// Re-export main types at crate root
pub use connection::{Connection, ConnectionManager};
pub use error::{
    ConnectError, ConnectionErrorKind, Error, ErrorCategory, ModelError, Result, Severity,
    TransportError,
};
pub use model::{Auth, Configuration, Credentials, Host, InboundTraffic, RolloutContext, SecurityZone};
pub use orchestrator::FleetOrchestrator;
pub use render::{Renderer, SetRenderer};
pub use reporter::{LogReporter, MemoryReporter, ReportEvent, Reporter, format_report};
pub use retry::{RetryConfig, with_retry};
pub use transaction::ConfigTransaction;
pub use transport::{CallCounts, DeviceSession, MockDevice, MockTransport, Transport};
pub use types::{
    AbortPolicy, CancelToken, ConfigFormat, PerHostResult, RolloutOptions, RunReport,
    TransactionOptions, TransactionOutcome, TxState,
};
