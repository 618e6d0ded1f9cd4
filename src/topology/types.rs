//! Resolved topology types.
//!
//! A [`Fleet`] is the immutable result of loading an inventory: every router's
//! effective configuration with global defaults applied, plus the fleet-wide
//! settings the derivation and policy stages read.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::config::{
    CommandTable, LocalPreferenceConfig, OsFamily, PortSpec, PrefixSet, Secret, StaticRoute,
};
use crate::policy::PolicyLibrary;
use crate::utils::ip_utils::Prefix;

pub const DEFAULT_DUMMY_INTERFACE: &str = "dn42";
pub const DEFAULT_IBGP_KEEPALIVE: u64 = 10;
pub const DEFAULT_IBGP_HOLD: u64 = 30;
pub const DEFAULT_OSPF_AREA: Ipv4Addr = Ipv4Addr::new(0, 0, 0, 0);
pub const DEFAULT_OSPF_HELLO: u64 = 10;
pub const DEFAULT_OSPF_DEAD: u64 = 40;
pub const DEFAULT_OSPF_COST: u32 = 10;
pub const DEFAULT_WIREGUARD_MTU: u16 = 1420;
pub const DEFAULT_PERSISTENT_KEEPALIVE: u64 = 25;

/// Ranges routed inside DN42 and its interconnected networks
pub const DN42_ALLOWED_IPS: &[&str] = &[
    "172.20.0.0/14",
    "172.31.0.0/16",
    "10.0.0.0/8",
    "fd00::/8",
    "fe80::/10",
];

/// DN42 address space accepted from peers when none is configured
pub const DN42_ADDRESS_SPACE_V4: &[&str] = &["172.20.0.0/14", "172.31.0.0/16", "10.0.0.0/8"];
pub const DN42_ADDRESS_SPACE_V6: &[&str] = &["fd00::/8"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IbgpSettings {
    pub enabled: bool,
    pub keepalive: u64,
    pub hold: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OspfSettings {
    pub enabled: bool,
    pub area: Ipv4Addr,
    pub hello_interval: u64,
    pub dead_interval: u64,
    pub cost: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireguardSettings {
    pub mtu: u16,
    pub persistent_keepalive: u64,
    pub allowed_ips: Vec<Prefix>,
}

/// eBGP neighbor reached through its own WireGuard tunnel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalPeer {
    pub name: String,
    pub asn: u32,
    pub public_key: String,
    pub endpoint: Option<String>,
    pub tunnel_address: Option<Prefix>,
    pub listen_port: PortSpec,
    pub peer_ip: IpAddr,
    pub latency_us: u32,
    pub region: String,
    /// ISO 3166-1 alpha-2, upper case
    pub country: String,
    pub extended_nexthop: bool,
    pub interface: Option<String>,
    pub mtu: Option<u16>,
}

/// BGP neighbor without a managed tunnel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BgpPeer {
    pub name: String,
    pub remote_as: u32,
    pub neighbor: IpAddr,
    pub peer_type: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
    pub route_map_in: Option<String>,
    pub route_map_out: Option<String>,
    pub update_source: Option<String>,
    pub multihop: Option<u8>,
}

impl BgpPeer {
    pub fn is_internal(&self, local_asn: u32) -> bool {
        self.remote_as == local_asn
    }
}

/// One router's effective configuration after two-layer resolution
#[derive(Debug, Clone)]
pub struct Router {
    pub name: String,
    /// Hostname text before the first `-` (`lhr` for `lhr-r001`)
    pub location: String,
    pub loopback: Ipv4Addr,
    pub loopback_v6: Option<Ipv6Addr>,
    pub wan: IpAddr,
    pub region: String,
    /// ISO 3166-1 alpha-2, upper case
    pub country: String,
    pub id: u16,
    /// Position of the hostname in the sorted fleet, from 0
    pub rank: u16,
    pub router_id: Ipv4Addr,
    pub asn: u32,
    pub private_key: Secret,
    pub public_key: String,
    pub dummy_interface: String,
    pub dummy_mtu: Option<u16>,
    pub os_family: OsFamily,
    pub ibgp: IbgpSettings,
    pub ospf: OspfSettings,
    pub wireguard: WireguardSettings,
    pub static_routes: Vec<StaticRoute>,
    pub policy: PolicyLibrary,
    pub outbound_route_map: Option<String>,
    pub peers: Vec<ExternalPeer>,
    pub bgp_peers: Vec<BgpPeer>,
}

/// An intra-fleet tunnel as declared, routers in sorted order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelDeclaration {
    /// Position in `intra_network_tunnels`
    pub index: usize,
    pub routers: (String, String),
    pub port: PortSpec,
    pub cost: Option<u32>,
    pub interface: Option<String>,
    pub subnet_index: Option<u8>,
}

/// The fully resolved model for one run
#[derive(Debug, Clone)]
pub struct Fleet {
    pub asn: u32,
    pub routers: BTreeMap<String, Router>,
    pub tunnels: Vec<TunnelDeclaration>,
    pub ibgp_members: Vec<String>,
    pub segment_routing: bool,
    pub own_prefixes: PrefixSet,
    pub anycast_prefixes: PrefixSet,
    pub address_space: PrefixSet,
    pub local_preference: LocalPreferenceConfig,
    pub regions: BTreeMap<String, u16>,
    pub countries: BTreeMap<String, u16>,
    pub validation: CommandTable,
    pub reload: CommandTable,
}

impl Fleet {
    pub fn router(&self, name: &str) -> Option<&Router> {
        self.routers.get(name)
    }

    /// Other iBGP mesh members of `router`, sorted by name
    pub fn ibgp_neighbors(&self, router: &str) -> Vec<&Router> {
        if !self.ibgp_members.iter().any(|m| m == router) {
            return Vec::new();
        }
        self.ibgp_members
            .iter()
            .filter(|m| m.as_str() != router)
            .filter_map(|m| self.routers.get(m))
            .filter(|r| r.ibgp.enabled)
            .collect()
    }
}
