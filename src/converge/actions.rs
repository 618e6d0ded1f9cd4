//! Reload actions triggered by artifact changes.
//!
//! Actions are shell commands run from the control node; `{host}` lets an
//! operator wrap them (`ssh {host} ...`), `{unit}` names the interface and
//! `{action}` is `restart` or `stop` for tunnels.

use std::fmt;

use serde::Serialize;

use crate::config::{CommandTable, OsFamily};
use crate::render::ArtifactCategory;

pub const DEFAULT_TUNNEL_COMMAND: &str = "systemctl {action} wg-quick@{unit}";
pub const DEFAULT_ROUTING_COMMAND: &str = "systemctl reload frr";
pub const DEFAULT_IFUPDOWN_COMMAND: &str = "ifdown --force {unit}; ifup {unit}";
pub const DEFAULT_NETWORKD_COMMAND: &str = "networkctl reload";

/// Variant order is execution order: the loopback interface comes up before
/// tunnels, and the routing daemon reloads last.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ReloadAction {
    ReloadNetwork { interface: String },
    StopTunnel { interface: String },
    RestartTunnel { interface: String },
    ReloadRoutingDaemon,
}

impl ReloadAction {
    pub fn category(&self) -> ArtifactCategory {
        match self {
            ReloadAction::ReloadNetwork { .. } => ArtifactCategory::Network,
            ReloadAction::StopTunnel { .. } | ReloadAction::RestartTunnel { .. } => {
                ArtifactCategory::Wireguard
            }
            ReloadAction::ReloadRoutingDaemon => ArtifactCategory::Frr,
        }
    }

    /// Action for a changed (`removed == false`) or removed artifact
    pub fn for_change(category: ArtifactCategory, unit: &str, removed: bool) -> Self {
        match category {
            ArtifactCategory::Wireguard if removed => ReloadAction::StopTunnel {
                interface: unit.to_string(),
            },
            ArtifactCategory::Wireguard => ReloadAction::RestartTunnel {
                interface: unit.to_string(),
            },
            ArtifactCategory::Frr => ReloadAction::ReloadRoutingDaemon,
            ArtifactCategory::Network => ReloadAction::ReloadNetwork {
                interface: unit.to_string(),
            },
        }
    }

    /// Shell command for this action on `host`
    pub fn command(&self, table: &CommandTable, os_family: OsFamily, host: &str) -> String {
        let (configured, default, unit, verb) = match self {
            ReloadAction::RestartTunnel { interface } => {
                (&table.wireguard, DEFAULT_TUNNEL_COMMAND, interface.as_str(), "restart")
            }
            ReloadAction::StopTunnel { interface } => {
                (&table.wireguard, DEFAULT_TUNNEL_COMMAND, interface.as_str(), "stop")
            }
            ReloadAction::ReloadRoutingDaemon => (&table.frr, DEFAULT_ROUTING_COMMAND, "frr", "reload"),
            ReloadAction::ReloadNetwork { interface } => {
                let default = match os_family {
                    OsFamily::Debian => DEFAULT_IFUPDOWN_COMMAND,
                    OsFamily::Systemd => DEFAULT_NETWORKD_COMMAND,
                };
                (&table.network, default, interface.as_str(), "reload")
            }
        };
        let template = configured
            .as_deref()
            .filter(|cmd| !cmd.trim().is_empty())
            .unwrap_or(default);
        template
            .replace("{action}", verb)
            .replace("{unit}", unit)
            .replace("{host}", host)
    }
}

impl fmt::Display for ReloadAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReloadAction::ReloadNetwork { interface } => write!(f, "reload network {}", interface),
            ReloadAction::StopTunnel { interface } => write!(f, "stop tunnel {}", interface),
            ReloadAction::RestartTunnel { interface } => write!(f, "restart tunnel {}", interface),
            ReloadAction::ReloadRoutingDaemon => write!(f, "reload routing daemon"),
        }
    }
}
