//! End-to-end pipeline tests over temporary inventories and deploy roots.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use dn42gen::error::CompileError;
use dn42gen::orchestrator::{run, Mode, RunOptions, Scope};
use dn42gen::process::MockRunner;
use dn42gen::render::ArtifactCategory;

const GLOBAL: &str = r#"asn: 4242421869
own_prefixes:
  ipv4: [172.22.144.0/27]
  ipv6: ["fd42:1869::/48"]
intra_network_tunnels:
  - routers: [lhr-r001, ewr-r001]
    port: auto
"#;

const LHR: &str = r#"loopback: 172.22.144.1
wan: 203.0.113.161
region: Europe
country: GB
wireguard_private_key: bGhyLXByaXZhdGUta2V5
wireguard_public_key: bGhyLXB1YmxpYy1rZXk=
ansible_host: 203.0.113.161
peers:
  - name: kioubit
    asn: 4242423914
    public_key: a2lvdWJpdA==
    endpoint: "de2.g-load.eu:21869"
    tunnel_address: "fe80::1869/64"
    peer_ip: "fe80::ade0"
    extended_nexthop: true
    latency_us: "5000"
    region: Europe
    iso_3166_country_code: GB
"#;

const EWR: &str = r#"loopback: 172.22.144.2
wan: 203.0.113.162
region: North America-E
country: US
wireguard_private_key: ZXdyLXByaXZhdGUta2V5
wireguard_public_key: ZXdyLXB1YmxpYy1rZXk=
os_family: systemd
"#;

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn inventory(global: &str, hosts: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    let mut listing = String::from("all:\n  children:\n    routers:\n      hosts:\n");
    for (host, vars) in hosts {
        listing.push_str(&format!("        {}:\n", host));
        write(dir.path(), &format!("host_vars/{}/main.yml", host), vars);
    }
    write(dir.path(), "hosts.yml", &listing);
    write(dir.path(), "group_vars/all/global.yml", global);
    dir
}

fn fleet() -> TempDir {
    inventory(GLOBAL, &[("lhr-r001", LHR), ("ewr-r001", EWR)])
}

fn options(inventory: &Path, mode: Mode, work: &Path) -> RunOptions {
    RunOptions {
        inventory: inventory.to_path_buf(),
        mode,
        scope: Scope::default(),
        deploy_root: work.join("deploy"),
        output: work.join("rendered"),
    }
}

/// Every file under `root`, keyed by relative path
fn tree(root: &Path) -> BTreeMap<PathBuf, String> {
    fn walk(base: &Path, dir: &Path, out: &mut BTreeMap<PathBuf, String>) {
        for entry in fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                walk(base, &path, out);
            } else {
                let rel = path.strip_prefix(base).unwrap().to_path_buf();
                out.insert(rel, fs::read_to_string(&path).unwrap());
            }
        }
    }
    let mut out = BTreeMap::new();
    walk(root, root, &mut out);
    out
}

#[test]
fn test_two_router_tunnel_scenario() {
    let inv = fleet();
    let work = TempDir::new().unwrap();
    let report = run(&options(inv.path(), Mode::Render, work.path()), &MockRunner::new()).unwrap();
    assert_eq!(report.exit_code(), 0);

    let rendered = work.path().join("rendered");
    let lhr = fs::read_to_string(rendered.join("lhr-r001/etc/wireguard/wg-ewr-lhr.conf")).unwrap();
    let ewr = fs::read_to_string(rendered.join("ewr-r001/etc/wireguard/wg-ewr-lhr.conf")).unwrap();

    assert!(lhr.contains("ListenPort = 5323\n"));
    assert!(ewr.contains("ListenPort = 5323\n"));
    assert!(lhr.contains("Endpoint = 203.0.113.162:5323\n"));
    assert!(ewr.contains("Endpoint = 203.0.113.161:5323\n"));
    assert!(lhr.contains("PublicKey = ZXdyLXB1YmxpYy1rZXk=\n"));
    assert!(ewr.contains("PrivateKey = ZXdyLXByaXZhdGUta2V5\n"));

    // Both ends sit in the same /30
    let address = |conf: &str| {
        conf.lines()
            .find_map(|l| l.strip_prefix("Address = "))
            .unwrap()
            .split(',')
            .next()
            .unwrap()
            .to_string()
    };
    let (a, b) = (address(&lhr), address(&ewr));
    assert_ne!(a, b);
    assert_eq!(a.rsplit_once('.').unwrap().0, b.rsplit_once('.').unwrap().0);

    assert!(rendered.join("lhr-r001/etc/wireguard/wg4242423914.conf").exists());
    assert!(rendered.join("lhr-r001/etc/network/interfaces.d/dn42").exists());
    assert!(rendered.join("ewr-r001/etc/systemd/network/50-dn42.netdev").exists());
    assert!(rendered.join("ewr-r001/etc/systemd/network/50-dn42.network").exists());
}

#[test]
fn test_rendering_is_deterministic() {
    let inv = fleet();
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();
    run(&options(inv.path(), Mode::Render, first.path()), &MockRunner::new()).unwrap();
    run(&options(inv.path(), Mode::Render, second.path()), &MockRunner::new()).unwrap();

    let a = tree(&first.path().join("rendered"));
    let b = tree(&second.path().join("rendered"));
    assert!(!a.is_empty());
    assert_eq!(a, b);
}

#[test]
fn test_peer_latency_and_location_in_inbound_policy() {
    let inv = fleet();
    let work = TempDir::new().unwrap();
    run(&options(inv.path(), Mode::Render, work.path()), &MockRunner::new()).unwrap();

    let frr = fs::read_to_string(work.path().join("rendered/lhr-r001/etc/frr/frr.conf")).unwrap();
    let map: Vec<&str> = frr
        .split("route-map rm-in-kioubit-4242423914-v4 permit 20\n")
        .nth(1)
        .unwrap()
        .lines()
        .take_while(|l| *l != "exit")
        .collect();
    assert!(map.contains(&" set metric 5000"));
    assert!(map.contains(&" set community 64511:41 64511:1826 additive"));
    assert!(map.contains(&" set local-preference 300"));
}

#[test]
fn test_second_apply_is_a_no_op() {
    let inv = fleet();
    let work = TempDir::new().unwrap();
    let runner = MockRunner::new();
    let opts = options(inv.path(), Mode::Apply, work.path());

    let first = run(&opts, &runner).unwrap();
    assert_eq!(first.exit_code(), 0);
    assert!(!runner.commands_matching("systemctl reload frr").is_empty());
    assert!(work.path().join("deploy/lhr-r001/etc/frr/frr.conf").exists());

    runner.clear();
    let second = run(&opts, &runner).unwrap();
    assert_eq!(second.exit_code(), 0);
    for host in &second.hosts {
        assert!(host.plan.as_ref().unwrap().is_empty(), "{} changed", host.host);
        assert!(host.applied.as_ref().unwrap().reloads.is_empty());
    }
    assert!(runner.commands_matching("systemctl").is_empty());
    assert!(runner.commands_matching("networkctl").is_empty());
}

#[test]
fn test_missing_loopback_rejected_before_rendering() {
    let lhr = LHR.replace("loopback: 172.22.144.1\n", "");
    let inv = inventory(GLOBAL, &[("lhr-r001", lhr.as_str()), ("ewr-r001", EWR)]);
    let work = TempDir::new().unwrap();

    let err = run(&options(inv.path(), Mode::Render, work.path()), &MockRunner::new()).unwrap_err();
    assert_eq!(err.exit_code(), 2);
    match err {
        CompileError::Schema(schema) => {
            assert_eq!(schema.fields(), vec!["host_vars/lhr-r001.loopback"]);
        }
        other => panic!("expected a schema error, got {}", other),
    }
    assert!(!work.path().join("rendered").exists());
}

#[test]
fn test_validation_failure_isolated_to_one_host() {
    let global = format!("{}validation:\n  frr: \"frr-check {{host}} {{file}}\"\n", GLOBAL);
    let inv = inventory(&global, &[("lhr-r001", LHR), ("ewr-r001", EWR)]);
    let work = TempDir::new().unwrap();
    let runner = MockRunner::new().fail_on("frr-check lhr-r001", "line 12: % Unknown command");

    let report = run(&options(inv.path(), Mode::Apply, work.path()), &runner).unwrap();
    assert_eq!(report.exit_code(), 5);
    assert_eq!(report.failed_hosts(), vec!["lhr-r001"]);

    let lhr = report.hosts.iter().find(|h| h.host == "lhr-r001").unwrap();
    assert!(lhr.error.as_ref().unwrap().contains("Unknown command"));
    assert!(!work.path().join("deploy/lhr-r001").exists());
    assert!(work.path().join("deploy/ewr-r001/etc/frr/frr.conf").exists());
}

#[test]
fn test_limit_and_tags_scope_the_run() {
    let inv = fleet();
    let work = TempDir::new().unwrap();
    let mut opts = options(inv.path(), Mode::Apply, work.path());
    opts.scope = Scope {
        limit: vec!["ewr-r001".to_string()],
        tags: vec![ArtifactCategory::Wireguard],
    };

    let report = run(&opts, &MockRunner::new()).unwrap();
    assert_eq!(report.hosts.len(), 1);
    let deployed = tree(&work.path().join("deploy"));
    assert_eq!(
        deployed.keys().cloned().collect::<Vec<_>>(),
        vec![PathBuf::from("ewr-r001/etc/wireguard/wg-ewr-lhr.conf")]
    );

    opts.scope.limit = vec!["sin-r001".to_string()];
    let err = run(&opts, &MockRunner::new()).unwrap_err();
    match err {
        CompileError::Schema(schema) => assert_eq!(schema.fields(), vec!["--limit"]),
        other => panic!("expected a schema error, got {}", other),
    }
}

#[test]
fn test_removed_tunnel_is_stopped_and_deleted() {
    let inv = fleet();
    let work = TempDir::new().unwrap();
    let runner = MockRunner::new();
    run(&options(inv.path(), Mode::Apply, work.path()), &runner).unwrap();

    write(
        inv.path(),
        "group_vars/all/global.yml",
        &GLOBAL.replace("intra_network_tunnels:\n  - routers: [lhr-r001, ewr-r001]\n    port: auto\n", ""),
    );
    runner.clear();
    let report = run(&options(inv.path(), Mode::Apply, work.path()), &runner).unwrap();
    assert_eq!(report.exit_code(), 0);
    assert!(!work.path().join("deploy/lhr-r001/etc/wireguard/wg-ewr-lhr.conf").exists());
    assert_eq!(runner.commands_matching("systemctl stop wg-quick@wg-ewr-lhr").len(), 2);
}
