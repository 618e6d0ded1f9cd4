//! Two-layer resolution of the inventory into a [`Fleet`].
//!
//! Host values replace global values field by field. Static routes from both
//! layers are concatenated (global first) and policy libraries merge by object
//! name with host objects replacing same-named global ones. Cross-document
//! constraints are checked here and reported together with their paths.

use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;

use log::{debug, info};

use crate::config::{
    GlobalConfig, HostConfig, IbgpConfig, OspfConfig, PrefixSet, WireguardConfig,
};
use crate::config_loader::{Inventory, GLOBAL_FILE};
use crate::error::{SchemaError, Violation};
use crate::policy::PolicyLibrary;
use crate::utils::ip_utils::{last_octet, parse_prefix, Prefix};
use crate::utils::options::merge_named;

use super::types::*;

/// Resolve a loaded inventory into the effective per-router model
pub fn resolve(inventory: Inventory) -> Result<Fleet, SchemaError> {
    let Inventory { global, hosts, .. } = inventory;
    let mut violations = Vec::new();

    let asn = match global.defaults.asn {
        Some(asn) => asn,
        None => {
            violations.push(Violation::new("global.asn", "required field missing"));
            0
        }
    };

    let mut routers = BTreeMap::new();
    for (name, host) in &hosts {
        match resolve_router(name, host, &global, asn) {
            Ok(router) => {
                routers.insert(name.clone(), router);
            }
            Err(mut found) => violations.append(&mut found),
        }
    }

    for (rank, router) in routers.values_mut().enumerate() {
        router.rank = u16::try_from(rank).unwrap_or(u16::MAX);
    }
    check_unique_addresses(&routers, &mut violations);
    let tunnels = resolve_tunnels(&global, &hosts, &mut violations);

    let ibgp_members = match global.defaults.ibgp.as_ref().and_then(|i| i.members.clone()) {
        Some(members) => {
            for (index, member) in members.iter().enumerate() {
                if !hosts.contains_key(member) {
                    violations.push(Violation::new(
                        format!("global.ibgp.members[{}]", index),
                        format!("router '{}' is not in the inventory", member),
                    ));
                }
            }
            let mut members = members;
            members.sort();
            members.dedup();
            members
        }
        None => hosts.keys().cloned().collect(),
    };

    if !violations.is_empty() {
        return Err(SchemaError::new(violations));
    }

    let address_space = global.address_space.clone().unwrap_or_else(default_address_space);

    info!(
        "Resolved {} router(s) and {} intra-fleet tunnel(s) for AS{}",
        routers.len(),
        tunnels.len(),
        asn
    );

    Ok(Fleet {
        asn,
        routers,
        tunnels,
        ibgp_members,
        segment_routing: global.segment_routing_enabled,
        own_prefixes: global.own_prefixes.clone(),
        anycast_prefixes: global.anycast_prefixes.clone(),
        address_space,
        local_preference: global.local_preference.clone(),
        regions: global.regions.clone(),
        countries: normalize_country_keys(&global.countries),
        validation: global.validation.clone(),
        reload: global.reload.clone(),
    })
}

fn resolve_router(
    name: &str,
    host: &HostConfig,
    global: &GlobalConfig,
    fleet_asn: u32,
) -> Result<Router, Vec<Violation>> {
    let label = format!("host_vars/{}", name);
    let mut violations = Vec::new();
    let base = &global.defaults;
    let over = &host.overrides;

    let id = match host.id {
        Some(id) => id,
        None => match host.wan {
            IpAddr::V4(_) => last_octet(&host.wan).map(u16::from).unwrap_or_default(),
            IpAddr::V6(_) => {
                violations.push(Violation::new(
                    format!("{}.id", label),
                    "required when the WAN address is not IPv4",
                ));
                0
            }
        },
    };

    let mut seen = BTreeSet::new();
    for (index, peer) in host.peers.iter().enumerate() {
        if !seen.insert(peer.name.as_str()) {
            violations.push(Violation::new(
                format!("{}.peers[{}].name", label, index),
                format!("duplicate peer name '{}'", peer.name),
            ));
        }
    }
    let mut seen = BTreeSet::new();
    for (index, peer) in host.bgp_peers.iter().enumerate() {
        if !seen.insert(peer.name.as_str()) {
            violations.push(Violation::new(
                format!("{}.bgp_peers[{}].name", label, index),
                format!("duplicate BGP peer name '{}'", peer.name),
            ));
        }
    }

    if !violations.is_empty() {
        return Err(violations);
    }

    let ibgp = over
        .ibgp
        .clone()
        .unwrap_or_default()
        .overlay(&base.ibgp.clone().unwrap_or_default());
    let ospf = over
        .ospf
        .clone()
        .unwrap_or_default()
        .overlay(&base.ospf.clone().unwrap_or_default());
    let wireguard = over
        .wireguard
        .clone()
        .unwrap_or_default()
        .overlay(&base.wireguard.clone().unwrap_or_default());

    let mut static_routes = base.static_routes.clone();
    static_routes.extend(over.static_routes.iter().cloned());

    let dummy = host.network_interface.clone().unwrap_or_default();

    debug!("Resolved router {} (id {})", name, id);

    Ok(Router {
        name: name.to_string(),
        location: location_code(name).to_string(),
        loopback: host.loopback,
        loopback_v6: host.loopback_v6,
        wan: host.wan,
        region: host.region.clone(),
        country: host.country.to_uppercase(),
        id,
        rank: 0,
        router_id: host.router_id.unwrap_or(host.loopback),
        asn: over.asn.or(base.asn).unwrap_or(fleet_asn),
        private_key: host.wireguard_private_key.clone(),
        public_key: host.wireguard_public_key.clone(),
        dummy_interface: dummy
            .name
            .unwrap_or_else(|| DEFAULT_DUMMY_INTERFACE.to_string()),
        dummy_mtu: dummy.mtu,
        os_family: over.os_family.or(base.os_family).unwrap_or_default(),
        ibgp: ibgp_settings(&ibgp),
        ospf: ospf_settings(&ospf),
        wireguard: wireguard_settings(&wireguard),
        static_routes,
        policy: merge_policy(&base.policy, &over.policy),
        outbound_route_map: over
            .outbound_route_map
            .clone()
            .or_else(|| base.outbound_route_map.clone()),
        peers: host.peers.iter().map(external_peer).collect(),
        bgp_peers: host.bgp_peers.iter().map(bgp_peer).collect(),
    })
}

/// Hostname text before the first `-`
pub fn location_code(hostname: &str) -> &str {
    hostname.split('-').next().unwrap_or(hostname)
}

fn ibgp_settings(config: &IbgpConfig) -> IbgpSettings {
    IbgpSettings {
        enabled: config.enabled.unwrap_or(true),
        keepalive: config.keepalive.map_or(DEFAULT_IBGP_KEEPALIVE, |s| s.0),
        hold: config.hold.map_or(DEFAULT_IBGP_HOLD, |s| s.0),
    }
}

fn ospf_settings(config: &OspfConfig) -> OspfSettings {
    OspfSettings {
        enabled: config.enabled.unwrap_or(true),
        area: config.area.unwrap_or(DEFAULT_OSPF_AREA),
        hello_interval: config.hello_interval.map_or(DEFAULT_OSPF_HELLO, |s| s.0),
        dead_interval: config.dead_interval.map_or(DEFAULT_OSPF_DEAD, |s| s.0),
        cost: config.cost.unwrap_or(DEFAULT_OSPF_COST),
    }
}

fn wireguard_settings(config: &WireguardConfig) -> WireguardSettings {
    WireguardSettings {
        mtu: config.mtu.unwrap_or(DEFAULT_WIREGUARD_MTU),
        persistent_keepalive: config
            .persistent_keepalive
            .map_or(DEFAULT_PERSISTENT_KEEPALIVE, |s| s.0),
        allowed_ips: config
            .allowed_ips
            .clone()
            .unwrap_or_else(|| builtin_prefixes(DN42_ALLOWED_IPS)),
    }
}

fn builtin_prefixes(list: &[&str]) -> Vec<Prefix> {
    list.iter().filter_map(|p| parse_prefix(p).ok()).collect()
}

fn default_address_space() -> PrefixSet {
    PrefixSet {
        ipv4: builtin_prefixes(DN42_ADDRESS_SPACE_V4),
        ipv6: builtin_prefixes(DN42_ADDRESS_SPACE_V6),
    }
}

fn normalize_country_keys(countries: &BTreeMap<String, u16>) -> BTreeMap<String, u16> {
    countries
        .iter()
        .map(|(code, numeric)| (code.to_uppercase(), *numeric))
        .collect()
}

/// Host objects replace same-named global objects
pub fn merge_policy(global: &PolicyLibrary, host: &PolicyLibrary) -> PolicyLibrary {
    PolicyLibrary {
        prefix_lists: merge_named(&global.prefix_lists, &host.prefix_lists, |l| l.name.as_str()),
        community_lists: merge_named(&global.community_lists, &host.community_lists, |l| {
            l.name.as_str()
        }),
        large_community_lists: merge_named(
            &global.large_community_lists,
            &host.large_community_lists,
            |l| l.name.as_str(),
        ),
        as_path_acls: merge_named(&global.as_path_acls, &host.as_path_acls, |a| a.name.as_str()),
        route_maps: merge_named(&global.route_maps, &host.route_maps, |m| m.name.as_str()),
    }
}

fn external_peer(peer: &crate::config::PeerConfig) -> ExternalPeer {
    ExternalPeer {
        name: peer.name.clone(),
        asn: peer.asn,
        public_key: peer.public_key.clone(),
        endpoint: peer.endpoint.clone(),
        tunnel_address: peer.tunnel_address,
        listen_port: peer.listen_port,
        peer_ip: peer.peer_ip,
        latency_us: peer.latency_us,
        region: peer.region.clone(),
        country: peer.country.to_uppercase(),
        extended_nexthop: peer.extended_nexthop,
        interface: peer.interface.clone(),
        mtu: peer.mtu,
    }
}

fn bgp_peer(peer: &crate::config::BgpPeerConfig) -> BgpPeer {
    BgpPeer {
        name: peer.name.clone(),
        remote_as: peer.remote_as,
        neighbor: peer.neighbor,
        peer_type: peer.peer_type.clone(),
        region: peer.region.clone(),
        country: peer.country.as_ref().map(|c| c.to_uppercase()),
        route_map_in: peer.route_map_in.clone(),
        route_map_out: peer.route_map_out.clone(),
        update_source: peer.update_source.clone(),
        multihop: peer.multihop,
    }
}

fn check_unique_addresses(routers: &BTreeMap<String, Router>, violations: &mut Vec<Violation>) {
    let mut loopbacks: BTreeMap<IpAddr, &str> = BTreeMap::new();
    let mut wans: BTreeMap<IpAddr, &str> = BTreeMap::new();

    for (name, router) in routers {
        if let Some(other) = loopbacks.insert(IpAddr::V4(router.loopback), name) {
            violations.push(Violation::new(
                format!("host_vars/{}.loopback", name),
                format!("loopback {} is also used by {}", router.loopback, other),
            ));
        }
        if let Some(other) = wans.insert(router.wan, name) {
            violations.push(Violation::new(
                format!("host_vars/{}.wan", name),
                format!("WAN address {} is also used by {}", router.wan, other),
            ));
        }
    }
}

fn resolve_tunnels(
    global: &GlobalConfig,
    hosts: &BTreeMap<String, HostConfig>,
    violations: &mut Vec<Violation>,
) -> Vec<TunnelDeclaration> {
    let mut tunnels = Vec::new();
    let mut pairs: BTreeMap<(String, String), usize> = BTreeMap::new();

    for (index, tunnel) in global.intra_network_tunnels.iter().enumerate() {
        let field = format!("global.intra_network_tunnels[{}].routers", index);

        if tunnel.routers.len() != 2 {
            violations.push(Violation::new(
                field,
                format!("expected exactly 2 routers, found {}", tunnel.routers.len()),
            ));
            continue;
        }

        let mut missing = false;
        for router in &tunnel.routers {
            if !hosts.contains_key(router) {
                violations.push(Violation::new(
                    field.clone(),
                    format!("router '{}' is not in the inventory", router),
                ));
                missing = true;
            }
        }
        if missing {
            continue;
        }

        let (a, b) = (&tunnel.routers[0], &tunnel.routers[1]);
        if a == b {
            violations.push(Violation::new(field, "a tunnel needs two distinct routers"));
            continue;
        }

        let pair = if a < b {
            (a.clone(), b.clone())
        } else {
            (b.clone(), a.clone())
        };
        if let Some(first) = pairs.insert(pair.clone(), index) {
            violations.push(Violation::new(
                field,
                format!(
                    "duplicates intra_network_tunnels[{}] ({} <-> {})",
                    first, pair.0, pair.1
                ),
            ));
            continue;
        }

        tunnels.push(TunnelDeclaration {
            index,
            routers: pair,
            port: tunnel.port,
            cost: tunnel.cost,
            interface: tunnel.interface.clone(),
            subnet_index: tunnel.subnet_index,
        });
    }

    if !tunnels.is_empty() {
        debug!("{} declares {} tunnel(s)", GLOBAL_FILE, tunnels.len());
    }
    tunnels
}
