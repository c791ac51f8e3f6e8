//! # junos
//!
//! NETCONF-over-SSH sessions for Junos devices, implementing
//! [`rollout::Transport`].
//!
//! Sessions run the system `ssh` client in subsystem mode, so host keys,
//! agents and jump hosts configured in `~/.ssh/config` apply unchanged.
//! Password authentication goes through `sshpass`.
//!
//! Each session opens a private candidate configuration, so concurrent
//! sessions never see each other's uncommitted changes.
//!
//! ## Example
//!
//! ```no_run
//! use junos::{NetconfTransport, SshOptions};
//! use rollout::{ConfigFormat, Credentials, Host, Transport};
//!
//! let transport = NetconfTransport::new(SshOptions::default());
//! let host = Host::new("fw1", "10.0.0.1").unwrap();
//! let creds = Credentials::new("admin", None, Some("~/.ssh/id_ed25519".into())).unwrap();
//!
//! let mut session = transport.open(&host, &creds).unwrap();
//! session.load_config("set security zones security-zone trust", ConfigFormat::Set).unwrap();
//! if let Some(diff) = session.compare_config().unwrap() {
//!     println!("{diff}");
//! }
//! session.rollback().unwrap();
//! session.close().unwrap();
//! ```

pub mod error;
pub mod netconf;
pub mod session;
pub mod ssh;

pub use error::{Error, Result, classify_ssh_failure};
pub use session::{NetconfSession, NetconfTransport};
pub use ssh::{NETCONF_PORT, SshCommand, SshOptions};
