//! Tunnel parameter derivation.
//!
//! [`derive_pair`] is a pure function of one tunnel declaration and its two
//! routers. [`derive_fleet`] runs it over every declared tunnel and every
//! external peer, registering each result so collisions are caught before any
//! router is rendered.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use log::{debug, info, warn};

use crate::config::{check_interface_name, PortSpec};
use crate::error::DerivationError;
use crate::topology::{ExternalPeer, Fleet, Router, TunnelDeclaration};
use crate::utils::ip_utils::{format_endpoint, Prefix};

use super::as_manager::{
    external_interface, external_port, link_address_v4, link_address_v6, subnet_index,
    LINK_BLOCK, TUNNEL_PORT_BASE,
};
use super::registry::LinkRegistry;

/// One side of an intra-fleet tunnel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelEnd {
    pub router: String,
    pub public_key: String,
    pub address_v4: Ipv4Addr,
    pub address_v6: Ipv6Addr,
    /// `wan:port` the other side dials
    pub endpoint: String,
}

/// Fully derived parameters of an intra-fleet tunnel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelSpec {
    pub label: String,
    pub interface: String,
    pub subnet_index: u8,
    pub port: u16,
    pub cost: Option<u32>,
    /// End of the router whose hostname sorts first; holds host `.1`
    pub low: TunnelEnd,
    pub high: TunnelEnd,
}

impl TunnelSpec {
    /// The link /30
    pub fn network_v4(&self) -> Prefix {
        Prefix {
            addr: IpAddr::V4(link_address_v4(self.subnet_index, 0)),
            len: 30,
        }
    }

    pub fn involves(&self, router: &str) -> bool {
        self.low.router == router || self.high.router == router
    }

    /// `(local, remote)` ends as seen from `router`
    pub fn ends_for(&self, router: &str) -> Option<(&TunnelEnd, &TunnelEnd)> {
        if self.low.router == router {
            Some((&self.low, &self.high))
        } else if self.high.router == router {
            Some((&self.high, &self.low))
        } else {
            None
        }
    }
}

/// Derived parameters of an external peer's tunnel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerLink {
    pub peer: String,
    pub interface: String,
    pub listen_port: u16,
}

/// Fleet-wide derivation result
#[derive(Debug, Clone, Default)]
pub struct Derivation {
    pub tunnels: Vec<TunnelSpec>,
    /// Router -> peer name -> link
    pub peer_links: BTreeMap<String, BTreeMap<String, PeerLink>>,
    /// Router -> errors that block it
    pub failures: BTreeMap<String, Vec<DerivationError>>,
}

impl Derivation {
    /// Tunnels terminating on `router`, ordered by interface name
    pub fn tunnels_for(&self, router: &str) -> Vec<&TunnelSpec> {
        let mut tunnels: Vec<&TunnelSpec> =
            self.tunnels.iter().filter(|t| t.involves(router)).collect();
        tunnels.sort_by(|a, b| a.interface.cmp(&b.interface));
        tunnels
    }

    pub fn peer_link(&self, router: &str, peer: &str) -> Option<&PeerLink> {
        self.peer_links.get(router).and_then(|links| links.get(peer))
    }

    pub fn errors_for(&self, router: &str) -> &[DerivationError] {
        self.failures.get(router).map(Vec::as_slice).unwrap_or(&[])
    }

    fn fail(&mut self, router: &str, error: DerivationError) {
        let errors = self.failures.entry(router.to_string()).or_default();
        if !errors.contains(&error) {
            errors.push(error);
        }
    }
}

/// Derive one tunnel. Symmetric in its two routers.
pub fn derive_pair(
    decl: &TunnelDeclaration,
    a: &Router,
    b: &Router,
    fleet_asn: u32,
) -> Result<TunnelSpec, DerivationError> {
    let (low, high) = if a.name <= b.name { (a, b) } else { (b, a) };
    let label = format!("{}<->{}", low.name, high.name);

    let interface = match &decl.interface {
        Some(name) => name.clone(),
        None => {
            let (first, second) = if low.location <= high.location {
                (&low.location, &high.location)
            } else {
                (&high.location, &low.location)
            };
            format!("wg-{}-{}", first, second)
        }
    };
    if check_interface_name(&interface).is_err() {
        return Err(DerivationError::InvalidInterfaceName {
            owner: label,
            interface,
        });
    }

    let port = match decl.port {
        PortSpec::Explicit(port) => port,
        PortSpec::Auto => {
            let port = TUNNEL_PORT_BASE + u32::from(low.id) + u32::from(high.id);
            u16::try_from(port).map_err(|_| DerivationError::PortOutOfRange {
                owner: label.clone(),
                port,
            })?
        }
    };

    let index = match decl.subnet_index {
        Some(index) => index,
        None => subnet_index(low.rank, high.rank).ok_or_else(|| {
            DerivationError::SubnetsExhausted {
                tunnel: label.clone(),
                ranks: (low.rank, high.rank),
            }
        })?,
    };
    let end = |router: &Router, host: u8| {
        let address_v4 = link_address_v4(index, host);
        TunnelEnd {
            router: router.name.clone(),
            public_key: router.public_key.clone(),
            address_v4,
            address_v6: link_address_v6(fleet_asn, address_v4.octets()[3]),
            endpoint: format_endpoint(&router.wan, port),
        }
    };

    Ok(TunnelSpec {
        label,
        interface,
        subnet_index: index,
        port,
        cost: decl.cost,
        low: end(low, 1),
        high: end(high, 2),
    })
}

/// Derive an external peer's listen port and interface name
pub fn derive_peer_link(router: &str, peer: &ExternalPeer) -> Result<PeerLink, DerivationError> {
    let owner = format!("{}/{}", router, peer.name);
    let interface = peer
        .interface
        .clone()
        .unwrap_or_else(|| external_interface(peer.asn));
    if check_interface_name(&interface).is_err() {
        return Err(DerivationError::InvalidInterfaceName { owner, interface });
    }

    let listen_port = match peer.listen_port {
        PortSpec::Explicit(port) => port,
        PortSpec::Auto => {
            let port = external_port(peer.asn);
            u16::try_from(port).map_err(|_| DerivationError::PortOutOfRange { owner, port })?
        }
    };

    Ok(PeerLink {
        peer: peer.name.clone(),
        interface,
        listen_port,
    })
}

/// Derive and collision-check every tunnel and peer link in the fleet
pub fn derive_fleet(fleet: &Fleet) -> Derivation {
    let mut registry = LinkRegistry::new();
    let mut derivation = Derivation::default();
    let mut owners: BTreeMap<String, (String, String)> = BTreeMap::new();

    for decl in &fleet.tunnels {
        let (Some(a), Some(b)) = (fleet.router(&decl.routers.0), fleet.router(&decl.routers.1))
        else {
            continue;
        };

        let spec = match derive_pair(decl, a, b, fleet.asn) {
            Ok(spec) => spec,
            Err(e) => {
                derivation.fail(&a.name, e.clone());
                derivation.fail(&b.name, e);
                continue;
            }
        };

        if let Err(e) = registry.claim_subnet(spec.subnet_index, &spec.label) {
            warn!("Link subnet collision: {}", e);
            derivation.fail(&a.name, e.clone());
            derivation.fail(&b.name, e.clone());
            if let Some((x, y)) = registry
                .subnet_owner(spec.subnet_index)
                .and_then(|other| owners.get(other))
            {
                let (x, y) = (x.clone(), y.clone());
                derivation.fail(&x, e.clone());
                derivation.fail(&y, e);
            }
            continue;
        }

        // A tunnel missing on one end must block both ends
        let mut errors = Vec::new();
        for router in [&a.name, &b.name] {
            if let Err(e) = registry.claim_interface(router, &spec.interface, &spec.label) {
                errors.push(e);
            }
            if let Err(e) = registry.claim_port(router, spec.port, &spec.label) {
                errors.push(e);
            }
        }
        if !errors.is_empty() {
            registry.release(&spec.label);
            for e in errors {
                warn!("{}", e);
                derivation.fail(&a.name, e.clone());
                derivation.fail(&b.name, e);
            }
            continue;
        }
        owners.insert(spec.label.clone(), (a.name.clone(), b.name.clone()));

        debug!(
            "Derived {} -> {} port {} subnet {}",
            spec.label,
            spec.interface,
            spec.port,
            spec.network_v4()
        );
        derivation.tunnels.push(spec);
    }

    for router in fleet.routers.values() {
        for peer in &router.peers {
            let link = match derive_peer_link(&router.name, peer) {
                Ok(link) => link,
                Err(e) => {
                    derivation.fail(&router.name, e);
                    continue;
                }
            };
            let owner = format!("{}/{}", router.name, peer.name);
            let claims = [
                registry.claim_interface(&router.name, &link.interface, &owner),
                registry.claim_port(&router.name, link.listen_port, &owner),
            ];
            let mut clean = true;
            for claim in claims {
                if let Err(e) = claim {
                    derivation.fail(&router.name, e);
                    clean = false;
                }
            }
            if clean {
                derivation
                    .peer_links
                    .entry(router.name.clone())
                    .or_default()
                    .insert(peer.name.clone(), link);
            } else {
                registry.release(&owner);
            }
        }
    }

    info!(
        "Derived {} tunnel(s) in {} using {} link subnet(s); {} router(s) with derivation errors",
        derivation.tunnels.len(),
        Prefix {
            addr: IpAddr::V4(LINK_BLOCK),
            len: 24
        },
        registry.subnet_count(),
        derivation.failures.len()
    );
    derivation
}
