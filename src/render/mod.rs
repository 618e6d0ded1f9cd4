//! Artifact rendering.
//!
//! Turns one router's resolved configuration, derived tunnels and compiled
//! policy into the text files its daemons read. Rendering is pure: the same
//! inputs always give byte-identical artifacts, in path order.

pub mod frr;
pub mod interfaces;
pub mod wireguard;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;

use crate::ip::Derivation;
use crate::policy::CompiledPolicy;
use crate::topology::{Fleet, Router};

/// Marker every rendered file carries in its first line
pub const MANAGED_MARKER: &str = "Managed by dn42gen";

/// Header line for a file using `comment` as its comment leader
pub fn managed_header(comment: &str) -> String {
    format!("{} {}. Do not edit.\n", comment, MANAGED_MARKER)
}

/// Artifact families; each has its own validator and reload action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactCategory {
    Wireguard,
    Frr,
    Network,
}

impl ArtifactCategory {
    pub const ALL: [ArtifactCategory; 3] = [
        ArtifactCategory::Wireguard,
        ArtifactCategory::Frr,
        ArtifactCategory::Network,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ArtifactCategory::Wireguard => "wireguard",
            ArtifactCategory::Frr => "frr",
            ArtifactCategory::Network => "network",
        }
    }

    /// Directories (relative to a host root) this category writes into
    pub fn directories(&self) -> &'static [&'static str] {
        match self {
            ArtifactCategory::Wireguard => &[wireguard::DIRECTORY],
            ArtifactCategory::Frr => &[frr::DIRECTORY],
            ArtifactCategory::Network => &[interfaces::DEBIAN_DIRECTORY, interfaces::NETWORKD_DIRECTORY],
        }
    }

    /// Category owning a relative artifact path
    pub fn of_path(path: &Path) -> Option<ArtifactCategory> {
        ArtifactCategory::ALL.into_iter().find(|category| {
            category
                .directories()
                .iter()
                .any(|dir| path.parent() == Some(Path::new(dir)))
        })
    }
}

impl fmt::Display for ArtifactCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ArtifactCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "wireguard" | "wg" => Ok(ArtifactCategory::Wireguard),
            "frr" | "bgp" | "routing" => Ok(ArtifactCategory::Frr),
            "network" | "interfaces" => Ok(ArtifactCategory::Network),
            other => Err(format!(
                "unknown tag '{}', expected wireguard, frr or network",
                other
            )),
        }
    }
}

/// One rendered configuration file
#[derive(Clone, PartialEq, Eq)]
pub struct Artifact {
    pub category: ArtifactCategory,
    /// Path relative to the host root, e.g. `etc/frr/frr.conf`
    pub path: PathBuf,
    pub content: String,
    /// Interface (or daemon) the file configures; scopes reload actions
    pub unit: String,
}

impl Artifact {
    pub fn new(category: ArtifactCategory, path: impl Into<PathBuf>, unit: impl Into<String>, content: String) -> Self {
        Artifact {
            category,
            path: path.into(),
            content,
            unit: unit.into(),
        }
    }
}

// Content can hold private keys, so Debug only shows where the file goes
impl fmt::Debug for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Artifact")
            .field("category", &self.category)
            .field("path", &self.path)
            .field("unit", &self.unit)
            .field("bytes", &self.content.len())
            .finish()
    }
}

/// Render every artifact for one router, sorted by path
pub fn render_router(
    fleet: &Fleet,
    router: &Router,
    derivation: &Derivation,
    policy: &CompiledPolicy,
) -> Vec<Artifact> {
    let mut artifacts = Vec::new();

    for tunnel in derivation.tunnels_for(&router.name) {
        if let Some(artifact) = wireguard::render_tunnel(router, tunnel) {
            artifacts.push(artifact);
        }
    }
    for peer in &router.peers {
        if let Some(link) = derivation.peer_link(&router.name, &peer.name) {
            artifacts.push(wireguard::render_peer(router, peer, link));
        }
    }

    artifacts.push(frr::render(fleet, router, derivation, policy));
    artifacts.extend(interfaces::render(router));

    artifacts.sort_by(|a, b| a.path.cmp(&b.path));
    artifacts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_tags() {
        assert_eq!("wireguard".parse(), Ok(ArtifactCategory::Wireguard));
        assert_eq!("FRR".parse(), Ok(ArtifactCategory::Frr));
        assert!("dns".parse::<ArtifactCategory>().is_err());
    }

    #[test]
    fn test_category_of_path() {
        assert_eq!(
            ArtifactCategory::of_path(Path::new("etc/wireguard/wg-ewr-lhr.conf")),
            Some(ArtifactCategory::Wireguard)
        );
        assert_eq!(
            ArtifactCategory::of_path(Path::new("etc/systemd/network/50-dn42.netdev")),
            Some(ArtifactCategory::Network)
        );
        assert_eq!(ArtifactCategory::of_path(Path::new("etc/hosts")), None);
    }

    #[test]
    fn test_debug_hides_content() {
        let artifact = Artifact::new(
            ArtifactCategory::Wireguard,
            "etc/wireguard/wg0.conf",
            "wg0",
            "PrivateKey = secret\n".to_string(),
        );
        assert!(!format!("{:?}", artifact).contains("secret"));
    }
}
