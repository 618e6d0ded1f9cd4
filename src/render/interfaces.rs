//! Loopback dummy interface definitions.
//!
//! Debian hosts get an ifupdown stanza under `interfaces.d`; systemd hosts get
//! a `.netdev`/`.network` pair for systemd-networkd.

use std::fmt::Write;

use crate::config::OsFamily;
use crate::topology::Router;

use super::{managed_header, Artifact, ArtifactCategory};

pub const DEBIAN_DIRECTORY: &str = "etc/network/interfaces.d";
pub const NETWORKD_DIRECTORY: &str = "etc/systemd/network";

pub fn render(router: &Router) -> Vec<Artifact> {
    match router.os_family {
        OsFamily::Debian => vec![render_debian(router)],
        OsFamily::Systemd => render_networkd(router),
    }
}

fn render_debian(router: &Router) -> Artifact {
    let name = &router.dummy_interface;
    let mut out = managed_header("#");

    let _ = writeln!(out, "auto {}", name);
    let _ = writeln!(out, "iface {} inet static", name);
    let _ = writeln!(out, "    address {}/32", router.loopback);
    let _ = writeln!(out, "    pre-up ip link add {} type dummy || true", name);
    if let Some(mtu) = router.dummy_mtu {
        let _ = writeln!(out, "    mtu {}", mtu);
    }
    let _ = writeln!(out, "    post-down ip link del {} || true", name);
    if let Some(v6) = router.loopback_v6 {
        out.push('\n');
        let _ = writeln!(out, "iface {} inet6 static", name);
        let _ = writeln!(out, "    address {}/128", v6);
    }

    Artifact::new(
        ArtifactCategory::Network,
        format!("{}/{}", DEBIAN_DIRECTORY, name),
        name.clone(),
        out,
    )
}

fn render_networkd(router: &Router) -> Vec<Artifact> {
    let name = &router.dummy_interface;

    let mut netdev = managed_header("#");
    netdev.push_str("[NetDev]\n");
    let _ = writeln!(netdev, "Name={}", name);
    netdev.push_str("Kind=dummy\n");
    if let Some(mtu) = router.dummy_mtu {
        let _ = writeln!(netdev, "MTUBytes={}", mtu);
    }

    let mut network = managed_header("#");
    network.push_str("[Match]\n");
    let _ = writeln!(network, "Name={}", name);
    network.push('\n');
    network.push_str("[Network]\n");
    let _ = writeln!(network, "Address={}/32", router.loopback);
    if let Some(v6) = router.loopback_v6 {
        let _ = writeln!(network, "Address={}/128", v6);
    }

    vec![
        Artifact::new(
            ArtifactCategory::Network,
            format!("{}/50-{}.netdev", NETWORKD_DIRECTORY, name),
            name.clone(),
            netdev,
        ),
        Artifact::new(
            ArtifactCategory::Network,
            format!("{}/50-{}.network", NETWORKD_DIRECTORY, name),
            name.clone(),
            network,
        ),
    ]
}
