//! NETCONF sessions over the system ssh client.

use crate::error::{Error, Result, classify_ssh_failure};
use crate::netconf::{self, DELIMITER, FrameReader, rpc};
use crate::ssh::{SshCommand, SshOptions};
use rollout::{
    ConfigFormat, ConnectError, ConnectionErrorKind, Credentials, DeviceSession, Host, Transport,
    TransportError,
};
use std::io::{self, Read, Write};
use std::process::{Child, ChildStderr};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

type Frame = io::Result<String>;

/// How long `close` waits for the ssh client to exit.
const EXIT_GRACE: Duration = Duration::from_secs(5);

/// Opens NETCONF sessions by spawning `ssh -s ... netconf`.
#[derive(Debug, Clone, Default)]
pub struct NetconfTransport {
    options: SshOptions,
}

impl NetconfTransport {
    /// Create a transport with the given options.
    pub fn new(options: SshOptions) -> Self {
        Self { options }
    }

    /// Session options.
    pub fn options(&self) -> &SshOptions {
        &self.options
    }
}

impl Transport for NetconfTransport {
    fn open(
        &self,
        host: &Host,
        credentials: &Credentials,
    ) -> std::result::Result<Box<dyn DeviceSession>, ConnectError> {
        let command = SshCommand::netconf(host, credentials, &self.options);
        log::debug!("{}: spawning {}", host.name(), command);

        let mut child = command.to_command().spawn().map_err(|e| {
            ConnectError::new(
                ConnectionErrorKind::Unreachable,
                format!("failed to execute {}: {}", command.program, e),
            )
        })?;

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            abort(&mut child);
            return Err(ConnectError::new(
                ConnectionErrorKind::Unreachable,
                "ssh client streams unavailable",
            ));
        };

        let stderr = spawn_stderr_collector(stderr);
        let frames = spawn_frame_reader(stdout);

        let hello = match frames.recv_timeout(self.options.connect_timeout) {
            Ok(Ok(frame)) => frame,
            Ok(Err(e)) => {
                abort(&mut child);
                return Err(ConnectError::new(ConnectionErrorKind::Unreachable, e.to_string()));
            }
            Err(RecvTimeoutError::Timeout) => {
                abort(&mut child);
                return Err(ConnectError::new(
                    ConnectionErrorKind::Timeout,
                    format!(
                        "no NETCONF hello within {}s",
                        self.options.connect_timeout.as_secs()
                    ),
                ));
            }
            Err(RecvTimeoutError::Disconnected) => {
                let status = child.wait().map(|s| s.to_string()).unwrap_or_default();
                let stderr = stderr.join().unwrap_or_default();
                let message = match stderr.trim() {
                    "" => format!("ssh exited before NETCONF hello ({status})"),
                    text => text.to_string(),
                };
                return Err(ConnectError::new(classify_ssh_failure(&stderr), message));
            }
        };

        if let Err(e) = netconf::check_hello(&hello) {
            abort(&mut child);
            return Err(ConnectError::new(ConnectionErrorKind::Refused, e.to_string()));
        }
        log::trace!("{}: server hello\n{}", host.name(), hello);

        let channel = Channel::new(Box::new(stdin), frames, self.options.rpc_timeout);
        let mut session = NetconfSession {
            host: host.name().to_string(),
            channel,
            child: Some(child),
            stderr: Some(stderr),
            closed: false,
        };

        session
            .start(self.options.connect_timeout)
            .map_err(handshake_error)?;

        Ok(Box::new(session))
    }
}

/// Connection error for a failure while opening the private candidate.
fn handshake_error(err: Error) -> ConnectError {
    let kind = match err {
        Error::Timeout { .. } => ConnectionErrorKind::Timeout,
        _ => ConnectionErrorKind::Refused,
    };
    ConnectError::new(kind, err.to_string())
}

fn spawn_frame_reader<R: Read + Send + 'static>(stream: R) -> Receiver<Frame> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut reader = FrameReader::new(stream);
        loop {
            match reader.next_frame() {
                Ok(Some(frame)) => {
                    if tx.send(Ok(frame)).is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    let _ = tx.send(Err(e));
                    break;
                }
            }
        }
    });
    rx
}

fn spawn_stderr_collector(mut stderr: ChildStderr) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut text = String::new();
        let _ = stderr.read_to_string(&mut text);
        text
    })
}

fn abort(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Request/reply exchange over an established NETCONF stream.
///
/// Replies are matched to requests by `message-id`. After a timeout or an
/// I/O failure the stream can no longer be trusted to be in step, so the
/// channel refuses every further request with [`Error::Closed`].
pub(crate) struct Channel {
    writer: Box<dyn Write + Send>,
    frames: Receiver<Frame>,
    rpc_timeout: Option<Duration>,
    message_id: u64,
    broken: bool,
}

impl Channel {
    pub(crate) fn new(
        writer: Box<dyn Write + Send>,
        frames: Receiver<Frame>,
        rpc_timeout: Option<Duration>,
    ) -> Self {
        Self {
            writer,
            frames,
            rpc_timeout,
            message_id: 0,
            broken: false,
        }
    }

    fn send(&mut self, message: &str) -> Result<()> {
        self.writer.write_all(message.as_bytes())?;
        self.writer.write_all(DELIMITER.as_bytes())?;
        self.writer.flush()?;
        Ok(())
    }

    fn receive(&self, name: &str, deadline: Option<(Duration, Instant)>) -> Result<String> {
        let frame = match deadline {
            Some((timeout, at)) => {
                let remaining = at.saturating_duration_since(Instant::now());
                self.frames.recv_timeout(remaining).map_err(|e| match e {
                    RecvTimeoutError::Timeout => Error::Timeout {
                        rpc: name.to_string(),
                        timeout,
                    },
                    RecvTimeoutError::Disconnected => Error::Closed,
                })?
            }
            None => self.frames.recv().map_err(|_| Error::Closed)?,
        };
        Ok(frame?)
    }

    /// Send one RPC and return the raw reply to it, whatever it contains.
    ///
    /// Replies carrying another request's `message-id` are discarded.
    fn call(&mut self, name: &str, body: &str) -> Result<String> {
        if self.broken {
            return Err(Error::Closed);
        }
        self.message_id += 1;
        let message = netconf::envelope(self.message_id, body);
        log::trace!("-> {message}");
        if let Err(e) = self.send(&message) {
            self.broken = true;
            return Err(e);
        }

        let deadline = self.rpc_timeout.map(|t| (t, Instant::now() + t));
        loop {
            let reply = match self.receive(name, deadline) {
                Ok(reply) => reply,
                Err(e) => {
                    self.broken = true;
                    return Err(e);
                }
            };
            match netconf::reply_message_id(&reply) {
                Some(id) if id != self.message_id => {
                    log::debug!("discarding reply to message {id}, waiting for {}", self.message_id);
                }
                _ => {
                    log::trace!("<- {reply}");
                    return Ok(reply);
                }
            }
        }
    }

    /// Send one RPC and fail on `rpc-error`s of severity `error`.
    fn execute(&mut self, name: &str, body: &str) -> Result<String> {
        let reply = self.call(name, body)?;
        netconf::check_reply(&reply)?;
        Ok(reply)
    }
}

/// An open NETCONF session with a private candidate configuration.
pub struct NetconfSession {
    host: String,
    channel: Channel,
    child: Option<Child>,
    stderr: Option<JoinHandle<String>>,
    closed: bool,
}

impl NetconfSession {
    #[cfg(test)]
    pub(crate) fn from_channel(host: &str, channel: Channel) -> Self {
        Self {
            host: host.to_string(),
            channel,
            child: None,
            stderr: None,
            closed: false,
        }
    }

    /// Exchange hellos and open the private candidate within `timeout`.
    fn start(&mut self, timeout: Duration) -> Result<()> {
        self.channel.send(&netconf::client_hello())?;

        let rpc_timeout = self.channel.rpc_timeout.replace(timeout);
        let opened = self
            .channel
            .execute("open-configuration", &rpc::open_configuration());
        self.channel.rpc_timeout = rpc_timeout;
        opened?;

        log::debug!("{}: private candidate opened", self.host);
        Ok(())
    }

    fn wait_for_exit(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        // EOF on stdin lets ssh exit on its own
        self.channel.writer = Box::new(io::sink());

        let deadline = Instant::now() + EXIT_GRACE;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    log::debug!("{}: ssh exited ({})", self.host, status);
                    break;
                }
                Ok(None) if Instant::now() < deadline => thread::sleep(Duration::from_millis(50)),
                Ok(None) | Err(_) => {
                    log::warn!("{}: ssh did not exit, killing it", self.host);
                    abort(&mut child);
                    break;
                }
            }
        }

        if let Some(stderr) = self.stderr.take().and_then(|h| h.join().ok()) {
            let stderr = stderr.trim();
            if !stderr.is_empty() {
                log::debug!("{}: ssh stderr: {}", self.host, stderr);
            }
        }
    }
}

impl DeviceSession for NetconfSession {
    fn load_config(&mut self, text: &str, format: ConfigFormat) -> std::result::Result<(), TransportError> {
        self.channel
            .execute("load-configuration", &rpc::load_configuration(text, format))?;
        Ok(())
    }

    fn compare_config(&mut self) -> std::result::Result<Option<String>, TransportError> {
        let reply = self
            .channel
            .execute("get-configuration", &rpc::compare_configuration())?;
        Ok(netconf::configuration_output(&reply))
    }

    fn commit_check(&mut self) -> std::result::Result<bool, TransportError> {
        let reply = self.channel.call("commit-check", &rpc::commit_check())?;
        match netconf::check_reply(&reply) {
            Ok(()) => Ok(true),
            Err(Error::Rpc { message }) => {
                log::warn!("{}: commit-check rejected candidate: {}", self.host, message);
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn commit(&mut self) -> std::result::Result<(), TransportError> {
        self.channel
            .execute("commit-configuration", &rpc::commit())?;
        Ok(())
    }

    fn rollback(&mut self) -> std::result::Result<(), TransportError> {
        self.channel
            .execute("load-configuration rollback", &rpc::rollback())?;
        Ok(())
    }

    fn close(&mut self) -> std::result::Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let released = self
            .channel
            .execute("close-configuration", &rpc::close_configuration());
        let ended = match self.channel.execute("close-session", &rpc::close_session()) {
            Err(Error::Closed) => Ok(String::new()),
            other => other,
        };
        self.wait_for_exit();

        released?;
        ended?;
        Ok(())
    }
}

impl Drop for NetconfSession {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            abort(&mut child);
        }
    }
}
