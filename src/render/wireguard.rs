//! WireGuard interface definitions for `wg-quick`.

use std::fmt::Write;
use std::net::IpAddr;

use crate::ip::{PeerLink, TunnelSpec};
use crate::topology::{ExternalPeer, Router};
use crate::utils::ip_utils::Prefix;

use super::{managed_header, Artifact, ArtifactCategory};

pub const DIRECTORY: &str = "etc/wireguard";

/// Path of the definition for `interface`
pub fn path_for(interface: &str) -> String {
    format!("{}/{}.conf", DIRECTORY, interface)
}

/// Intra-fleet tunnel as seen from `router`
pub fn render_tunnel(router: &Router, tunnel: &TunnelSpec) -> Option<Artifact> {
    let (local, remote) = tunnel.ends_for(&router.name)?;
    let mut out = managed_header("#");

    let _ = writeln!(out, "# {} <-> {}", local.router, remote.router);
    out.push_str("[Interface]\n");
    let _ = writeln!(out, "PrivateKey = {}", router.private_key.expose());
    let _ = writeln!(out, "ListenPort = {}", tunnel.port);
    let _ = writeln!(out, "Address = {}/30, {}/64", local.address_v4, local.address_v6);
    out.push_str("Table = off\n");
    let _ = writeln!(out, "MTU = {}", router.wireguard.mtu);
    out.push('\n');
    out.push_str("[Peer]\n");
    let _ = writeln!(out, "# {}", remote.router);
    let _ = writeln!(out, "PublicKey = {}", remote.public_key);
    let _ = writeln!(out, "Endpoint = {}", remote.endpoint);
    // Routing over the tunnel is decided by OSPF/BGP, not by cryptokey routing
    out.push_str("AllowedIPs = 0.0.0.0/0, ::/0\n");
    let _ = writeln!(
        out,
        "PersistentKeepalive = {}",
        router.wireguard.persistent_keepalive
    );

    Some(Artifact::new(
        ArtifactCategory::Wireguard,
        path_for(&tunnel.interface),
        tunnel.interface.clone(),
        out,
    ))
}

/// External peer tunnel
pub fn render_peer(router: &Router, peer: &ExternalPeer, link: &PeerLink) -> Artifact {
    let mut out = managed_header("#");

    let _ = writeln!(out, "# {} AS{}", peer.name, peer.asn);
    out.push_str("[Interface]\n");
    let _ = writeln!(out, "PrivateKey = {}", router.private_key.expose());
    let _ = writeln!(out, "ListenPort = {}", link.listen_port);
    match peer.tunnel_address {
        Some(local) if is_point_to_point(&local, &peer.peer_ip) => {
            let _ = writeln!(
                out,
                "PostUp = ip addr add {} peer {} dev %i",
                local,
                peer.peer_ip
            );
        }
        Some(local) => {
            let _ = writeln!(out, "Address = {}", local);
        }
        None => {}
    }
    out.push_str("Table = off\n");
    let _ = writeln!(out, "MTU = {}", peer.mtu.unwrap_or(router.wireguard.mtu));
    out.push('\n');
    out.push_str("[Peer]\n");
    let _ = writeln!(out, "PublicKey = {}", peer.public_key);
    if let Some(endpoint) = &peer.endpoint {
        let _ = writeln!(out, "Endpoint = {}", endpoint);
    }
    let allowed: Vec<String> = router
        .wireguard
        .allowed_ips
        .iter()
        .map(|p| p.to_string())
        .collect();
    let _ = writeln!(out, "AllowedIPs = {}", allowed.join(", "));
    if peer.endpoint.is_some() {
        let _ = writeln!(
            out,
            "PersistentKeepalive = {}",
            router.wireguard.persistent_keepalive
        );
    }

    Artifact::new(
        ArtifactCategory::Wireguard,
        path_for(&link.interface),
        link.interface.clone(),
        out,
    )
}

/// A host-length local address needs an explicit peer route
fn is_point_to_point(local: &Prefix, peer_ip: &IpAddr) -> bool {
    local.len == local.max_len() && local.is_ipv4() == peer_ip.is_ipv4()
}
