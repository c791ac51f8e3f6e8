//! Scoped device sessions.
//!
//! A [`Connection`] owns its session and closes it exactly once: either
//! through [`Connection::close`] or, on any early return, when dropped.
//! Nothing here retries; retry policy belongs to the orchestrator.

use crate::error::{Error, Result};
use crate::model::{Credentials, Host};
use crate::transport::{DeviceSession, Transport};

/// Opens sessions through a transport.
pub struct ConnectionManager<'a> {
    transport: &'a dyn Transport,
}

impl<'a> ConnectionManager<'a> {
    /// Create a manager over `transport`.
    pub fn new(transport: &'a dyn Transport) -> Self {
        Self { transport }
    }

    /// Open a session with `host`.
    pub fn open(&self, host: &Host, credentials: &Credentials) -> Result<Connection> {
        log::debug!("Opening session with {host}");
        match self.transport.open(host, credentials) {
            Ok(session) => {
                log::info!("Connected to {}", host.name());
                Ok(Connection {
                    host: host.name().to_string(),
                    session: Some(session),
                })
            }
            Err(e) => Err(Error::connection(host.name(), e.kind, e.message)),
        }
    }
}

/// An open session, closed automatically on drop.
pub struct Connection {
    host: String,
    session: Option<Box<dyn DeviceSession>>,
}

impl Connection {
    /// Name of the connected host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Whether the session is still open.
    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    /// The underlying session, or `None` once closed.
    pub fn session(&mut self) -> Option<&mut (dyn DeviceSession + 'static)> {
        self.session.as_deref_mut()
    }

    /// Close the session. Calling this more than once is a no-op.
    ///
    /// The session is considered gone even when the close request fails;
    /// that failure is returned once so the caller can report it.
    pub fn close(&mut self) -> Result<()> {
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };
        match session.close() {
            Ok(()) => {
                log::debug!("Closed session with {}", self.host);
                Ok(())
            }
            Err(e) => {
                log::warn!("Closing session with {} failed: {}", self.host, e);
                Err(e.into())
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
