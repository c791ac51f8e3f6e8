//! Rendering configuration into device syntax.
//!
//! [`SetRenderer`] writes Junos `set` commands, one per line. Output depends
//! only on the configuration, so the same input always yields byte-identical
//! candidate text.

use crate::error::{Error, Result};
use crate::model::{Configuration, SecurityZone};
use crate::types::ConfigFormat;
use std::fmt::Write;

/// Turns a configuration into device-native candidate text.
pub trait Renderer: Send + Sync {
    /// Render the configuration. Must be deterministic.
    fn render(&self, configuration: &Configuration) -> Result<String>;

    /// Syntax of the rendered text.
    fn format(&self) -> ConfigFormat;
}

/// Renders security zones as Junos `set` commands.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetRenderer;

impl Renderer for SetRenderer {
    fn render(&self, configuration: &Configuration) -> Result<String> {
        let mut output = String::new();
        for zone in configuration.zones() {
            write_zone(&mut output, zone)?;
        }
        Ok(output)
    }

    fn format(&self) -> ConfigFormat {
        ConfigFormat::Set
    }
}

fn write_zone(output: &mut String, zone: &SecurityZone) -> Result<()> {
    let prefix = format!(
        "set security zones security-zone {}",
        token(zone.name(), "zone name")?
    );

    if zone.app_tracking() {
        writeln!(output, "{prefix} application-tracking").unwrap();
    }

    if let Some(inbound) = zone.inbound_traffic() {
        for service in &inbound.system_services {
            writeln!(
                output,
                "{prefix} host-inbound-traffic system-services {}",
                token(service, "system service")?
            )
            .unwrap();
        }
        for protocol in &inbound.protocols {
            writeln!(
                output,
                "{prefix} host-inbound-traffic protocols {}",
                token(protocol, "protocol")?
            )
            .unwrap();
        }
    }

    for interface in zone.interfaces() {
        writeln!(output, "{prefix} interfaces {}", token(interface, "interface")?).unwrap();
    }

    Ok(())
}

/// Check that a value is a single bare word in set syntax.
fn token<'a>(value: &'a str, what: &str) -> Result<&'a str> {
    if value.is_empty() {
        return Err(Error::Render {
            message: format!("empty {what}"),
        });
    }
    if let Some(c) = value.chars().find(|c| {
        c.is_whitespace() || c.is_control() || matches!(c, '"' | '\'' | ';' | '{' | '}' | '#')
    }) {
        return Err(Error::Render {
            message: format!("{what} '{value}' contains unsupported character {c:?}"),
        });
    }
    Ok(value)
}
