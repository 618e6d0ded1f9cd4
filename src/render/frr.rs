//! Integrated FRRouting configuration (`frr.conf`).
//!
//! One file per router carrying static routes, OSPF on the tunnel mesh and
//! the loopback, BGP sessions for external peers, the iBGP mesh and plain BGP
//! peers, and every compiled policy object.

use std::collections::BTreeMap;
use std::fmt::Write;
use std::net::IpAddr;

use crate::ip::Derivation;
use crate::policy::compiler::{session_families, CompiledPolicy, SessionPolicy};
use crate::policy::types::*;
use crate::topology::{Fleet, Router};
use crate::utils::ip_utils::Prefix;

use super::{managed_header, Artifact, ArtifactCategory};

pub const DIRECTORY: &str = "etc/frr";
pub const CONFIG_FILE: &str = "etc/frr/frr.conf";
pub const UNIT: &str = "frr";

/// Segment routing global block shared by every router
pub const SRGB_START: u32 = 16000;
pub const SRGB_END: u32 = 23999;

/// Per-family lines accumulated for the `address-family` blocks
type FamilyLines = BTreeMap<AddressFamily, Vec<String>>;

pub fn render(fleet: &Fleet, router: &Router, derivation: &Derivation, policy: &CompiledPolicy) -> Artifact {
    let mut out = managed_header("!");
    out.push_str("frr defaults traditional\n");
    let _ = writeln!(out, "hostname {}", router.name);
    out.push_str("log syslog informational\n");
    out.push_str("service integrated-vtysh-config\n");
    out.push_str("!\n");

    render_static_routes(&mut out, router);
    if router.ospf.enabled {
        render_ospf(&mut out, fleet, router, derivation);
    }
    render_bgp(&mut out, fleet, router, derivation, policy);
    render_policy_objects(&mut out, &policy.objects);

    Artifact::new(ArtifactCategory::Frr, CONFIG_FILE, UNIT, out)
}

fn render_static_routes(out: &mut String, router: &Router) {
    if router.static_routes.is_empty() {
        return;
    }
    for route in &router.static_routes {
        let keyword = if route.prefix.is_ipv4() { "ip" } else { "ipv6" };
        let _ = write!(out, "{} route {} {}", keyword, route.prefix, route.via);
        if let Some(distance) = route.distance {
            let _ = write!(out, " {}", distance);
        }
        out.push('\n');
    }
    out.push_str("!\n");
}

fn render_ospf(out: &mut String, fleet: &Fleet, router: &Router, derivation: &Derivation) {
    let ospf = &router.ospf;
    let ospf6 = router.loopback_v6.is_some();

    let _ = writeln!(out, "interface {}", router.dummy_interface);
    let _ = writeln!(out, " ip ospf area {}", ospf.area);
    out.push_str(" ip ospf passive\n");
    if ospf6 {
        let _ = writeln!(out, " ipv6 ospf6 area {}", ospf.area);
        out.push_str(" ipv6 ospf6 passive\n");
    }
    out.push_str("exit\n!\n");

    for tunnel in derivation.tunnels_for(&router.name) {
        let cost = tunnel.cost.unwrap_or(ospf.cost);
        let _ = writeln!(out, "interface {}", tunnel.interface);
        let _ = writeln!(out, " ip ospf area {}", ospf.area);
        out.push_str(" ip ospf network point-to-point\n");
        let _ = writeln!(out, " ip ospf cost {}", cost);
        let _ = writeln!(out, " ip ospf hello-interval {}", ospf.hello_interval);
        let _ = writeln!(out, " ip ospf dead-interval {}", ospf.dead_interval);
        if ospf6 {
            let _ = writeln!(out, " ipv6 ospf6 area {}", ospf.area);
            out.push_str(" ipv6 ospf6 network point-to-point\n");
            let _ = writeln!(out, " ipv6 ospf6 cost {}", cost);
            let _ = writeln!(out, " ipv6 ospf6 hello-interval {}", ospf.hello_interval);
            let _ = writeln!(out, " ipv6 ospf6 dead-interval {}", ospf.dead_interval);
        }
        out.push_str("exit\n!\n");
    }

    out.push_str("router ospf\n");
    let _ = writeln!(out, " ospf router-id {}", router.router_id);
    if fleet.segment_routing {
        out.push_str(" capability opaque\n");
        out.push_str(" router-info area\n");
        out.push_str(" segment-routing on\n");
        let _ = writeln!(out, " segment-routing global-block {} {}", SRGB_START, SRGB_END);
        let _ = writeln!(
            out,
            " segment-routing prefix {}/32 index {}",
            router.loopback, router.id
        );
    }
    out.push_str("exit\n!\n");

    if ospf6 {
        out.push_str("router ospf6\n");
        let _ = writeln!(out, " ospf6 router-id {}", router.router_id);
        out.push_str("exit\n!\n");
    }
}

fn render_bgp(
    out: &mut String,
    fleet: &Fleet,
    router: &Router,
    derivation: &Derivation,
    policy: &CompiledPolicy,
) {
    let mut families = FamilyLines::new();

    let _ = writeln!(out, "router bgp {}", router.asn);
    let _ = writeln!(out, " bgp router-id {}", router.router_id);
    out.push_str(" no bgp default ipv4-unicast\n");
    out.push_str(" no bgp network import-check\n");
    // Latency MEDs come from different neighbour ASes
    out.push_str(" bgp always-compare-med\n");
    out.push_str(" bgp deterministic-med\n");

    for peer in &router.peers {
        let Some(session) = policy.peers.get(&peer.name) else {
            continue;
        };
        let neighbor = peer.peer_ip.to_string();
        let _ = writeln!(out, " neighbor {} remote-as {}", neighbor, peer.asn);
        let _ = writeln!(out, " neighbor {} description {}", neighbor, peer.name);
        if let Some(link) = derivation.peer_link(&router.name, &peer.name) {
            if is_link_local(&peer.peer_ip) {
                let _ = writeln!(out, " neighbor {} interface {}", neighbor, link.interface);
            }
        }
        if peer.extended_nexthop && peer.peer_ip.is_ipv6() {
            let _ = writeln!(out, " neighbor {} capability extended-nexthop", neighbor);
        }
        add_session(&mut families, &neighbor, session, true);
    }

    for other in fleet.ibgp_neighbors(&router.name) {
        let mut sessions = vec![(IpAddr::V4(other.loopback), AddressFamily::Ipv4)];
        if let (Some(_), Some(remote)) = (router.loopback_v6, other.loopback_v6) {
            sessions.push((IpAddr::V6(remote), AddressFamily::Ipv6));
        }
        for (address, family) in sessions {
            let neighbor = address.to_string();
            let _ = writeln!(out, " neighbor {} remote-as {}", neighbor, other.asn);
            let _ = writeln!(out, " neighbor {} description {}", neighbor, other.name);
            let _ = writeln!(out, " neighbor {} update-source {}", neighbor, router.dummy_interface);
            let _ = writeln!(
                out,
                " neighbor {} timers {} {}",
                neighbor, router.ibgp.keepalive, router.ibgp.hold
            );
            let lines = families.entry(family).or_default();
            lines.push(format!("neighbor {} activate", neighbor));
            lines.push(format!("neighbor {} next-hop-self", neighbor));
        }
    }

    for peer in &router.bgp_peers {
        let neighbor = peer.neighbor.to_string();
        let _ = writeln!(out, " neighbor {} remote-as {}", neighbor, peer.remote_as);
        let _ = writeln!(out, " neighbor {} description {}", neighbor, peer.name);
        if let Some(source) = &peer.update_source {
            let _ = writeln!(out, " neighbor {} update-source {}", neighbor, source);
        }
        if let Some(hops) = peer.multihop {
            let _ = writeln!(out, " neighbor {} ebgp-multihop {}", neighbor, hops);
        }
        let fallback = SessionPolicy {
            families: session_families(&peer.neighbor, false),
            ..Default::default()
        };
        let session = policy.bgp_peers.get(&peer.name).unwrap_or(&fallback);
        let external = !peer.is_internal(router.asn);
        add_session(&mut families, &neighbor, session, external);
        if !external {
            if let Some(lines) = families.get_mut(&AddressFamily::of_addr(&peer.neighbor)) {
                lines.push(format!("neighbor {} next-hop-self", neighbor));
            }
        }
    }

    for family in AddressFamily::ALL {
        let announced = announced_prefixes(fleet, family);
        let lines = families.remove(&family).unwrap_or_default();
        if announced.is_empty() && lines.is_empty() {
            continue;
        }
        out.push_str(" !\n");
        let _ = writeln!(out, " address-family {} unicast", family_keyword(family));
        for prefix in announced {
            let _ = writeln!(out, "  network {}", prefix);
        }
        for line in lines {
            let _ = writeln!(out, "  {}", line);
        }
        out.push_str(" exit-address-family\n");
    }
    out.push_str("exit\n!\n");
}

fn add_session(families: &mut FamilyLines, neighbor: &str, session: &SessionPolicy, soft_reconfiguration: bool) {
    for family in &session.families {
        let lines = families.entry(*family).or_default();
        lines.push(format!("neighbor {} activate", neighbor));
        if soft_reconfiguration {
            lines.push(format!("neighbor {} soft-reconfiguration inbound", neighbor));
        }
        if let Some(name) = session.inbound(*family) {
            lines.push(format!("neighbor {} route-map {} in", neighbor, name));
        }
        if let Some(name) = session.outbound(*family) {
            lines.push(format!("neighbor {} route-map {} out", neighbor, name));
        }
    }
}

/// Own and anycast prefixes originated into BGP, deduplicated
fn announced_prefixes(fleet: &Fleet, family: AddressFamily) -> Vec<Prefix> {
    let mut prefixes: Vec<Prefix> = [&fleet.own_prefixes, &fleet.anycast_prefixes]
        .iter()
        .flat_map(|set| match family {
            AddressFamily::Ipv4 => set.ipv4.iter(),
            AddressFamily::Ipv6 => set.ipv6.iter(),
        })
        .filter(|p| AddressFamily::of(p) == family)
        .map(|p| p.network())
        .collect();
    prefixes.sort();
    prefixes.dedup();
    prefixes
}

fn family_keyword(family: AddressFamily) -> &'static str {
    match family {
        AddressFamily::Ipv4 => "ipv4",
        AddressFamily::Ipv6 => "ipv6",
    }
}

fn is_link_local(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_link_local(),
        IpAddr::V6(v6) => (v6.segments()[0] & 0xffc0) == 0xfe80,
    }
}

/// Render every object of a policy set, in name order per object kind
pub fn render_policy_objects(out: &mut String, set: &PolicySet) {
    for list in set.prefix_lists.values() {
        let keyword = match list.family {
            AddressFamily::Ipv4 => "ip",
            AddressFamily::Ipv6 => "ipv6",
        };
        if list.entries.is_empty() {
            // An empty list must still exist so references resolve; it matches nothing
            let _ = writeln!(out, "{} prefix-list {} seq 5 deny any", keyword, list.name);
            continue;
        }
        for entry in &list.entries {
            let _ = writeln!(
                out,
                "{} prefix-list {} seq {} {} {}{}",
                keyword,
                list.name,
                entry.seq,
                entry.action,
                entry.prefix,
                length_bounds(entry)
            );
        }
    }
    if !set.prefix_lists.is_empty() {
        out.push_str("!\n");
    }

    for list in set.community_lists.values() {
        for (index, entry) in list.entries.iter().enumerate() {
            let _ = writeln!(
                out,
                "bgp community-list standard {} seq {} {} {}",
                list.name,
                (index + 1) * 5,
                entry.action,
                entry.community
            );
        }
    }
    for list in set.large_community_lists.values() {
        let kind = if list.is_expanded() { "expanded" } else { "standard" };
        for (index, entry) in list.entries.iter().enumerate() {
            let value = match &entry.matcher {
                LargeCommunityMatcher::Exact(community) => community.to_string(),
                LargeCommunityMatcher::Regex(pattern) => pattern.clone(),
            };
            let _ = writeln!(
                out,
                "bgp large-community-list {} {} seq {} {} {}",
                kind,
                list.name,
                (index + 1) * 5,
                entry.action,
                value
            );
        }
    }
    for acl in set.as_path_acls.values() {
        for (index, entry) in acl.entries.iter().enumerate() {
            let seq = if entry.seq == 0 { (index as u32 + 1) * 5 } else { entry.seq };
            let _ = writeln!(
                out,
                "bgp as-path access-list {} seq {} {} {}",
                acl.name, seq, entry.action, entry.regex
            );
        }
    }
    if !set.community_lists.is_empty() || !set.large_community_lists.is_empty() || !set.as_path_acls.is_empty() {
        out.push_str("!\n");
    }

    for map in set.route_maps.values() {
        let mut entries: Vec<&RouteMapEntry> = map.entries.iter().collect();
        entries.sort_by_key(|e| e.seq);
        for entry in entries {
            let _ = writeln!(out, "route-map {} {} {}", map.name, entry.action, entry.seq);
            render_route_map_entry(out, set, entry);
            out.push_str("exit\n!\n");
        }
    }
}

fn render_route_map_entry(out: &mut String, set: &PolicySet, entry: &RouteMapEntry) {
    let m = &entry.matches;
    if let Some(name) = &m.prefix_list {
        let keyword = match set.prefix_lists.get(name).map(|l| l.family) {
            Some(AddressFamily::Ipv6) => "ipv6",
            _ => "ip",
        };
        let _ = writeln!(out, " match {} address prefix-list {}", keyword, name);
    }
    if let Some(name) = &m.as_path {
        let _ = writeln!(out, " match as-path {}", name);
    }
    if let Some(name) = &m.community_list {
        let _ = writeln!(out, " match community {}", name);
    }
    if let Some(name) = &m.large_community_list {
        let _ = writeln!(out, " match large-community {}", name);
    }

    let s = &entry.set;
    if let Some(pref) = s.local_preference {
        let _ = writeln!(out, " set local-preference {}", pref);
    }
    if let Some(metric) = s.metric {
        let _ = writeln!(out, " set metric {}", metric);
    }
    if let Some(name) = &s.community_delete {
        let _ = writeln!(out, " set comm-list {} delete", name);
    }
    if let Some(name) = &s.large_community_delete {
        let _ = writeln!(out, " set large-comm-list {} delete", name);
    }
    if !s.community_additive.is_empty() {
        let values: Vec<String> = s.community_additive.iter().map(|c| c.to_string()).collect();
        let _ = writeln!(out, " set community {} additive", values.join(" "));
    }
    if !s.large_community_additive.is_empty() {
        let values: Vec<String> = s
            .large_community_additive
            .iter()
            .map(|c| c.to_string())
            .collect();
        let _ = writeln!(out, " set large-community {} additive", values.join(" "));
    }
}

/// `ge`/`le` suffix; bounds equal to the prefix length are implied and omitted
fn length_bounds(entry: &PrefixEntry) -> String {
    let mut bounds = String::new();
    if let Some(ge) = entry.ge.filter(|ge| *ge > entry.prefix.len) {
        let _ = write!(bounds, " ge {}", ge);
    }
    if let Some(le) = entry.le.filter(|le| *le > entry.prefix.len) {
        let _ = write!(bounds, " le {}", le);
    }
    bounds
}
