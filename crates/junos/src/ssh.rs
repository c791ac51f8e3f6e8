//! Building the ssh client invocation for a NETCONF session.

use rollout::{Auth, Credentials, Host};
use std::fmt;
use std::process::{Command, Stdio};
use std::time::Duration;

/// Default NETCONF-over-SSH port.
pub const NETCONF_PORT: u16 = 830;

/// How sessions are opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshOptions {
    /// Port of the NETCONF service
    pub port: u16,
    /// Deadline for TCP connect and for the device's hello
    pub connect_timeout: Duration,
    /// Deadline for each RPC reply; `None` blocks until the device answers
    pub rpc_timeout: Option<Duration>,
    /// Require a known host key instead of accepting new ones
    pub strict_host_keys: bool,
}

impl Default for SshOptions {
    fn default() -> Self {
        Self {
            port: NETCONF_PORT,
            connect_timeout: Duration::from_secs(30),
            rpc_timeout: None,
            strict_host_keys: false,
        }
    }
}

/// A fully resolved ssh invocation.
#[derive(Clone, PartialEq, Eq)]
pub struct SshCommand {
    /// Executable to run (`ssh`, or `sshpass` wrapping it)
    pub program: String,
    /// Arguments in order
    pub args: Vec<String>,
    /// Extra environment for the child
    pub env: Vec<(String, String)>,
}

impl SshCommand {
    /// Build the invocation that starts the `netconf` subsystem on `host`.
    ///
    /// A password is handed to `sshpass` through `SSHPASS`, never on the
    /// command line. Key authentication runs in batch mode so a bad key fails
    /// instead of prompting.
    pub fn netconf(host: &Host, credentials: &Credentials, options: &SshOptions) -> Self {
        let mut args = Vec::new();
        let mut env = Vec::new();

        let program = match credentials.auth() {
            Auth::Password(password) => {
                env.push(("SSHPASS".to_string(), password.to_string()));
                args.extend(["-e".to_string(), "ssh".to_string()]);
                args.extend(option("PubkeyAuthentication=no"));
                args.extend(option("PreferredAuthentications=password,keyboard-interactive"));
                "sshpass".to_string()
            }
            Auth::SshKey(key) => {
                args.extend(["-i".to_string(), key.to_string()]);
                args.extend(option("BatchMode=yes"));
                "ssh".to_string()
            }
        };

        args.extend(["-p".to_string(), options.port.to_string()]);
        args.extend(option(&format!(
            "ConnectTimeout={}",
            options.connect_timeout.as_secs().max(1)
        )));
        args.extend(option(if options.strict_host_keys {
            "StrictHostKeyChecking=yes"
        } else {
            "StrictHostKeyChecking=accept-new"
        }));
        args.push("-s".to_string());
        args.push("--".to_string());
        args.push(format!("{}@{}", credentials.username(), host.address()));
        args.push("netconf".to_string());

        Self { program, args, env }
    }

    /// A [`Command`] with all three standard streams piped.
    pub fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        command
    }
}

fn option(value: &str) -> [String; 2] {
    ["-o".to_string(), value.to_string()]
}

impl fmt::Display for SshCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.program, self.args.join(" "))
    }
}

impl fmt::Debug for SshCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshCommand")
            .field("program", &self.program)
            .field("args", &self.args)
            .field(
                "env",
                &self.env.iter().map(|(k, _)| (k.as_str(), "<redacted>")).collect::<Vec<_>>(),
            )
            .finish()
    }
}
