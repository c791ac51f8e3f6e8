//! Rollout file loading
//!
//! The file carries `inventory`, `credentials`, `configuration` and an
//! optional `settings` table. YAML is the default format; `.toml` and
//! `.json` files are read as TOML and JSON.

use anyhow::{Context, Result, bail};
use junos::SshOptions;
use rollout::{
    AbortPolicy, Configuration, Credentials, Host, InboundTraffic, RetryConfig, RolloutContext,
    RolloutOptions, SecurityZone, TransactionOptions,
};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::paths;

/// Supported config file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Yaml,
    Toml,
    Json,
}

impl FileFormat {
    /// Pick the format from a file extension, defaulting to YAML.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .as_deref()
        {
            Some("toml") => Self::Toml,
            Some("json") => Self::Json,
            _ => Self::Yaml,
        }
    }
}

/// The rollout file as written.
#[derive(Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub inventory: Vec<HostEntry>,
    pub credentials: CredentialsEntry,
    #[serde(default)]
    pub configuration: ConfigurationEntry,
    #[serde(default)]
    pub settings: Settings,
}

#[derive(Debug, Deserialize)]
pub struct HostEntry {
    pub name: String,
    #[serde(alias = "ip")]
    pub address: String,
}

#[derive(Deserialize)]
pub struct CredentialsEntry {
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default, alias = "sshkey", alias = "sshKey")]
    pub ssh_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConfigurationEntry {
    #[serde(default)]
    pub zones: Vec<ZoneEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ZoneEntry {
    pub name: String,
    #[serde(default, alias = "appTracking")]
    pub app_tracking: bool,
    #[serde(default, alias = "inboundTraffic")]
    pub inbound_traffic: Option<InboundTrafficEntry>,
    #[serde(default)]
    pub interfaces: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct InboundTrafficEntry {
    #[serde(default, alias = "systemServices")]
    pub system_services: Vec<String>,
    #[serde(default)]
    pub protocols: Vec<String>,
}

/// Optional run settings; command-line flags take precedence.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// `fail-fast` or `best-effort`
    pub policy: Option<AbortPolicy>,
    /// Hosts processed concurrently
    pub jobs: Option<usize>,
    /// ssh connect and hello deadline
    pub connect_timeout_secs: Option<u64>,
    /// Per-RPC reply deadline; unset blocks
    pub rpc_timeout_secs: Option<u64>,
    /// Extra attempts for unreachable hosts
    pub connect_retries: Option<u32>,
    /// NETCONF port
    pub port: Option<u16>,
    /// Refuse unknown host keys
    pub strict_host_keys: Option<bool>,
}

/// Command-line overrides for [`Settings`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Overrides {
    pub jobs: Option<usize>,
    pub policy: Option<AbortPolicy>,
    pub dry_run: bool,
}

impl Settings {
    /// Session options for the NETCONF transport.
    pub fn ssh_options(&self) -> SshOptions {
        let defaults = SshOptions::default();
        SshOptions {
            port: self.port.unwrap_or(defaults.port),
            connect_timeout: self
                .connect_timeout_secs
                .map_or(defaults.connect_timeout, Duration::from_secs),
            rpc_timeout: self.rpc_timeout_secs.map(Duration::from_secs),
            strict_host_keys: self.strict_host_keys.unwrap_or(defaults.strict_host_keys),
        }
    }

    /// Orchestrator options, with flags applied on top.
    pub fn rollout_options(&self, overrides: Overrides) -> RolloutOptions {
        RolloutOptions {
            policy: overrides.policy.or(self.policy).unwrap_or_default(),
            jobs: overrides.jobs.or(self.jobs).unwrap_or(1).max(1),
            connect_retry: self
                .connect_retries
                .map_or_else(RetryConfig::no_retry, RetryConfig::with_retries),
            transaction: TransactionOptions {
                commit: !overrides.dry_run,
            },
        }
    }
}

impl ConfigFile {
    /// Read and parse a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        Self::parse(&content, FileFormat::from_path(path))
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Parse config text in the given format.
    pub fn parse(content: &str, format: FileFormat) -> Result<Self> {
        let file = match format {
            FileFormat::Yaml => serde_yaml::from_str(content)?,
            FileFormat::Toml => toml::from_str(content)?,
            FileFormat::Json => serde_json::from_str(content)?,
        };
        Ok(file)
    }

    /// Validate the file into a rollout context.
    pub fn to_context(&self) -> Result<RolloutContext> {
        let mut seen = HashSet::new();
        let mut inventory = Vec::with_capacity(self.inventory.len());
        for (index, entry) in self.inventory.iter().enumerate() {
            let host = Host::new(&entry.name, &entry.address)
                .with_context(|| format!("inventory entry {}", index + 1))?;
            if !seen.insert(entry.name.clone()) {
                bail!("inventory lists host '{}' more than once", entry.name);
            }
            inventory.push(host);
        }

        let creds = &self.credentials;
        let credentials = Credentials::new(
            &creds.username,
            creds.password.clone(),
            creds
                .ssh_key
                .as_deref()
                .map(|key| paths::expand(key).to_string_lossy().into_owned()),
        )
        .context("credentials")?;

        let zones = self
            .configuration
            .zones
            .iter()
            .map(|zone| {
                SecurityZone::new(
                    &zone.name,
                    zone.app_tracking,
                    zone.inbound_traffic.as_ref().map(|inbound| {
                        InboundTraffic::new(inbound.system_services.clone(), inbound.protocols.clone())
                    }),
                    zone.interfaces.clone(),
                )
                .with_context(|| format!("security zone '{}'", zone.name))
            })
            .collect::<Result<Vec<_>>>()?;
        let configuration = Configuration::new(zones).context("configuration")?;

        Ok(RolloutContext::new(credentials, inventory, configuration))
    }
}
