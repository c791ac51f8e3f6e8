//! Validated data model for a rollout.
//!
//! Every type is built through a constructor that checks its invariants
//! once. After construction the values are read-only for the whole run.

use crate::error::ModelError;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

/// A device in the inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Host {
    name: String,
    address: String,
}

impl Host {
    /// Create a host. Name and address must be non-empty.
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Result<Self, ModelError> {
        let name = name.into();
        let address = address.into();
        require("host", "name", &name)?;
        require(&format!("host {name}"), "address", &address)?;
        forbid_dash(&format!("host {name}"), "address", &address)?;
        Ok(Self { name, address })
    }

    /// Name used in every diagnostic.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Address (IP or DNS name) the transport connects to.
    pub fn address(&self) -> &str {
        &self.address
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.address)
    }
}

/// How a session authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Auth<'a> {
    /// Password authentication
    Password(&'a str),
    /// Private key file
    SshKey(&'a str),
}

/// Login credentials shared by the whole fleet.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: Option<String>,
    ssh_key: Option<String>,
}

impl Credentials {
    /// Create credentials. At least one of password or SSH key is required.
    ///
    /// Empty strings count as absent.
    pub fn new(
        username: impl Into<String>,
        password: Option<String>,
        ssh_key: Option<String>,
    ) -> Result<Self, ModelError> {
        let username = username.into();
        require("credentials", "username", &username)?;
        forbid_dash("credentials", "username", &username)?;

        let password = password.filter(|p| !p.is_empty());
        let ssh_key = ssh_key.filter(|k| !k.is_empty());
        if password.is_none() && ssh_key.is_none() {
            return Err(ModelError::MissingAuth { username });
        }
        if password.is_some() && ssh_key.is_some() {
            log::debug!("Both password and ssh key set for '{username}'; using password");
        }

        Ok(Self {
            username,
            password,
            ssh_key,
        })
    }

    /// Login user.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// The authentication method to use.
    ///
    /// When both a password and a key are configured the password wins.
    pub fn auth(&self) -> Auth<'_> {
        match self.password.as_deref() {
            Some(password) => Auth::Password(password),
            None => Auth::SshKey(self.ssh_key.as_deref().unwrap_or_default()),
        }
    }

    /// The configured key file, whether or not it is used.
    pub fn ssh_key(&self) -> Option<&str> {
        self.ssh_key.as_deref()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("ssh_key", &self.ssh_key)
            .finish()
    }
}

/// Services and protocols a zone accepts for the device itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InboundTraffic {
    /// System services (ssh, ping, ...) in rendering order
    pub system_services: Vec<String>,
    /// Protocols (icmp, bgp, ...) in rendering order
    pub protocols: Vec<String>,
}

impl InboundTraffic {
    /// Create an inbound traffic policy.
    pub fn new(system_services: Vec<String>, protocols: Vec<String>) -> Self {
        Self {
            system_services,
            protocols,
        }
    }
}

/// A named group of interfaces with an inbound traffic policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecurityZone {
    name: String,
    app_tracking: bool,
    inbound_traffic: Option<InboundTraffic>,
    interfaces: Vec<String>,
}

impl SecurityZone {
    /// Create a zone. The name must be non-empty and at least one
    /// interface is required.
    pub fn new(
        name: impl Into<String>,
        app_tracking: bool,
        inbound_traffic: Option<InboundTraffic>,
        interfaces: Vec<String>,
    ) -> Result<Self, ModelError> {
        let name = name.into();
        require("zone", "name", &name)?;
        if interfaces.is_empty() {
            return Err(ModelError::NoInterfaces { zone: name });
        }
        Ok(Self {
            name,
            app_tracking,
            inbound_traffic,
            interfaces,
        })
    }

    /// Zone name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether application tracking is enabled.
    pub fn app_tracking(&self) -> bool {
        self.app_tracking
    }

    /// Inbound traffic policy, if any.
    pub fn inbound_traffic(&self) -> Option<&InboundTraffic> {
        self.inbound_traffic.as_ref()
    }

    /// Member interfaces in rendering order.
    pub fn interfaces(&self) -> &[String] {
        &self.interfaces
    }
}

/// Desired device configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Configuration {
    zones: Vec<SecurityZone>,
}

impl Configuration {
    /// Create a configuration. Zone names must be unique.
    pub fn new(zones: Vec<SecurityZone>) -> Result<Self, ModelError> {
        let mut seen = HashSet::new();
        for zone in &zones {
            if !seen.insert(zone.name()) {
                return Err(ModelError::DuplicateZone {
                    name: zone.name().to_string(),
                });
            }
        }
        Ok(Self { zones })
    }

    /// Zones in rendering order.
    pub fn zones(&self) -> &[SecurityZone] {
        &self.zones
    }
}

/// Everything one rollout run needs.
#[derive(Debug, Clone)]
pub struct RolloutContext {
    credentials: Credentials,
    inventory: Vec<Host>,
    configuration: Configuration,
}

impl RolloutContext {
    /// Bundle validated parts into a context.
    pub fn new(credentials: Credentials, inventory: Vec<Host>, configuration: Configuration) -> Self {
        Self {
            credentials,
            inventory,
            configuration,
        }
    }

    /// Fleet credentials.
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Hosts in rollout order.
    pub fn inventory(&self) -> &[Host] {
        &self.inventory
    }

    /// Desired configuration.
    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }
}

fn require(entity: &str, field: &'static str, value: &str) -> Result<(), ModelError> {
    if value.trim().is_empty() {
        return Err(ModelError::EmptyField {
            entity: entity.to_string(),
            field,
        });
    }
    Ok(())
}

fn forbid_dash(entity: &str, field: &'static str, value: &str) -> Result<(), ModelError> {
    if value.trim_start().starts_with('-') {
        return Err(ModelError::LeadingDash {
            entity: entity.to_string(),
            field,
        });
    }
    Ok(())
}
