//! Declarative inventory configuration.
//!
//! Two layers feed the compiler: the fleet-wide document
//! (`group_vars/all/global.yml`) and one document per router
//! (`host_vars/<host>/main.yml`). Both share the [`Overrides`] block; a host
//! value replaces the global value field by field, except `static_routes`
//! which concatenate and policy libraries which merge by object name.
//!
//! Each document is checked against the schema tables at the bottom of this
//! file before it is deserialized into these types.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer};

use crate::policy::PolicyLibrary;
use crate::utils::duration::parse_duration_to_seconds;
use crate::utils::ip_utils::Prefix;
use crate::utils::validation::{Field, Kind};

/// Requested port: derived automatically or given explicitly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PortSpec {
    #[default]
    Auto,
    Explicit(u16),
}

impl<'de> Deserialize<'de> for PortSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u16),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(port) => Ok(PortSpec::Explicit(port)),
            Raw::Text(text) if text == "auto" => Ok(PortSpec::Auto),
            Raw::Text(text) => Err(serde::de::Error::custom(format!(
                "invalid port '{}', expected \"auto\" or a number",
                text
            ))),
        }
    }
}

/// Timer value in whole seconds, written as `30`, `"30s"` or `"2m"`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Seconds(pub u64);

impl<'de> Deserialize<'de> for Seconds {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(secs) => Ok(Seconds(secs)),
            Raw::Text(text) => parse_duration_to_seconds(&text)
                .map(Seconds)
                .map_err(serde::de::Error::custom),
        }
    }
}

/// Accept an integer or a string holding one (`latency_us: "5000"`)
fn numeric<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u32),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Secret material, supplied already decrypted. Never printed by `Debug`.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Secret(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret(<redacted>)")
    }
}

/// Target OS family, selects the network-interface definition format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    /// ifupdown `interfaces.d` stanzas
    #[default]
    Debian,
    /// systemd-networkd `.netdev` / `.network` units
    Systemd,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IbgpConfig {
    #[serde(default)]
    pub enabled: Option<bool>,
    /// Mesh membership; all routers when absent. Only read from the global layer.
    #[serde(default)]
    pub members: Option<Vec<String>>,
    #[serde(default)]
    pub keepalive: Option<Seconds>,
    #[serde(default)]
    pub hold: Option<Seconds>,
}

impl IbgpConfig {
    pub fn overlay(&self, base: &IbgpConfig) -> IbgpConfig {
        IbgpConfig {
            enabled: self.enabled.or(base.enabled),
            members: base.members.clone(),
            keepalive: self.keepalive.or(base.keepalive),
            hold: self.hold.or(base.hold),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OspfConfig {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub area: Option<std::net::Ipv4Addr>,
    #[serde(default)]
    pub hello_interval: Option<Seconds>,
    #[serde(default)]
    pub dead_interval: Option<Seconds>,
    #[serde(default)]
    pub cost: Option<u32>,
}

impl OspfConfig {
    pub fn overlay(&self, base: &OspfConfig) -> OspfConfig {
        OspfConfig {
            enabled: self.enabled.or(base.enabled),
            area: self.area.or(base.area),
            hello_interval: self.hello_interval.or(base.hello_interval),
            dead_interval: self.dead_interval.or(base.dead_interval),
            cost: self.cost.or(base.cost),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WireguardConfig {
    #[serde(default)]
    pub mtu: Option<u16>,
    #[serde(default)]
    pub persistent_keepalive: Option<Seconds>,
    /// AllowedIPs for external peer tunnels
    #[serde(default)]
    pub allowed_ips: Option<Vec<Prefix>>,
}

impl WireguardConfig {
    pub fn overlay(&self, base: &WireguardConfig) -> WireguardConfig {
        WireguardConfig {
            mtu: self.mtu.or(base.mtu),
            persistent_keepalive: self.persistent_keepalive.or(base.persistent_keepalive),
            allowed_ips: self.allowed_ips.clone().or_else(|| base.allowed_ips.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StaticRoute {
    pub prefix: Prefix,
    /// Next-hop address, interface name, or `blackhole`
    pub via: String,
    #[serde(default)]
    pub distance: Option<u8>,
}

/// Settings present in both layers; host values win field by field
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Overrides {
    #[serde(default)]
    pub asn: Option<u32>,
    #[serde(default)]
    pub ibgp: Option<IbgpConfig>,
    #[serde(default)]
    pub ospf: Option<OspfConfig>,
    #[serde(default)]
    pub wireguard: Option<WireguardConfig>,
    #[serde(default)]
    pub os_family: Option<OsFamily>,
    #[serde(default)]
    pub static_routes: Vec<StaticRoute>,
    #[serde(default)]
    pub policy: PolicyLibrary,
    /// Replaces the generated outbound route-map for every external peer
    #[serde(default)]
    pub outbound_route_map: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrefixSet {
    #[serde(default)]
    pub ipv4: Vec<Prefix>,
    #[serde(default)]
    pub ipv6: Vec<Prefix>,
}

/// Local-preference values per tier; unset tiers keep their default
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocalPreferenceConfig {
    #[serde(default)]
    pub anycast: Option<u32>,
    #[serde(default)]
    pub direct: Option<u32>,
    #[serde(default)]
    pub own_country: Option<u32>,
    #[serde(default)]
    pub peer_country: Option<u32>,
    #[serde(default)]
    pub own_region: Option<u32>,
    #[serde(default)]
    pub peer_region: Option<u32>,
    #[serde(default)]
    pub default: Option<u32>,
}

/// External command templates per artifact category.
///
/// Validators see `{file}` and `{host}`; reload commands see `{action}`,
/// `{unit}` and `{host}`. An empty string disables the command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandTable {
    #[serde(default)]
    pub wireguard: Option<String>,
    #[serde(default)]
    pub frr: Option<String>,
    #[serde(default)]
    pub network: Option<String>,
}

/// Intra-fleet tunnel declaration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TunnelConfig {
    pub routers: Vec<String>,
    #[serde(default)]
    pub port: PortSpec,
    #[serde(default)]
    pub cost: Option<u32>,
    #[serde(default)]
    pub interface: Option<String>,
    #[serde(default)]
    pub subnet_index: Option<u8>,
}

/// `group_vars/all/global.yml`
#[derive(Debug, Clone, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub intra_network_tunnels: Vec<TunnelConfig>,
    #[serde(default)]
    pub segment_routing_enabled: bool,
    #[serde(default)]
    pub own_prefixes: PrefixSet,
    #[serde(default)]
    pub anycast_prefixes: PrefixSet,
    /// Expected DN42 address space; defaults to the registry ranges
    #[serde(default)]
    pub address_space: Option<PrefixSet>,
    #[serde(default)]
    pub local_preference: LocalPreferenceConfig,
    /// Extra or replacement region community codes, keyed by region name
    #[serde(default)]
    pub regions: BTreeMap<String, u16>,
    /// Extra or replacement ISO 3166-1 numeric codes, keyed by alpha-2 code
    #[serde(default)]
    pub countries: BTreeMap<String, u16>,
    #[serde(default)]
    pub validation: CommandTable,
    #[serde(default)]
    pub reload: CommandTable,
    #[serde(flatten)]
    pub defaults: Overrides,
}

/// External (eBGP over WireGuard) peer declaration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PeerConfig {
    pub name: String,
    pub asn: u32,
    pub public_key: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Local address on the tunnel, e.g. `fe80::1869/64`
    #[serde(default)]
    pub tunnel_address: Option<Prefix>,
    #[serde(default)]
    pub listen_port: PortSpec,
    pub peer_ip: std::net::IpAddr,
    #[serde(deserialize_with = "numeric")]
    pub latency_us: u32,
    pub region: String,
    #[serde(alias = "iso_3166_country_code")]
    pub country: String,
    #[serde(default)]
    pub extended_nexthop: bool,
    #[serde(default)]
    pub interface: Option<String>,
    #[serde(default)]
    pub mtu: Option<u16>,
}

/// Plain BGP neighbor without a managed tunnel
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BgpPeerConfig {
    pub name: String,
    pub remote_as: u32,
    pub neighbor: std::net::IpAddr,
    #[serde(default, rename = "type")]
    pub peer_type: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub route_map_in: Option<String>,
    #[serde(default)]
    pub route_map_out: Option<String>,
    #[serde(default)]
    pub update_source: Option<String>,
    #[serde(default)]
    pub multihop: Option<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkInterfaceConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub mtu: Option<u16>,
}

/// `host_vars/<host>/main.yml`
#[derive(Debug, Clone, Deserialize)]
pub struct HostConfig {
    pub loopback: std::net::Ipv4Addr,
    #[serde(default)]
    pub loopback_v6: Option<std::net::Ipv6Addr>,
    pub wan: std::net::IpAddr,
    pub region: String,
    #[serde(alias = "iso_3166_country_code")]
    pub country: String,
    /// Numeric identifier used for port derivation; defaults to the WAN last octet
    #[serde(default)]
    pub id: Option<u16>,
    #[serde(default)]
    pub router_id: Option<std::net::Ipv4Addr>,
    #[serde(default)]
    pub network_interface: Option<NetworkInterfaceConfig>,
    pub wireguard_private_key: Secret,
    pub wireguard_public_key: String,
    #[serde(default)]
    pub peers: Vec<PeerConfig>,
    #[serde(default)]
    pub bgp_peers: Vec<BgpPeerConfig>,
    #[serde(flatten)]
    pub overrides: Overrides,
}

// ============================================================================
// Schema tables
// ============================================================================

const MAX_ASN: i64 = u32::MAX as i64;

/// Linux interface names: 1-15 characters, no whitespace or slashes
pub fn check_interface_name(name: &str) -> Result<(), String> {
    if name.is_empty() || name.len() > 15 {
        return Err(format!("interface name '{}' must be 1-15 characters", name));
    }
    if name.chars().any(|c| c.is_whitespace() || c == '/' || c == ':') {
        return Err(format!("interface name '{}' contains invalid characters", name));
    }
    Ok(())
}

fn check_hostname(name: &str) -> Result<(), String> {
    static HOSTNAME: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    let re = HOSTNAME.get_or_init(|| {
        regex::Regex::new(r"^[a-z0-9]+(-[a-z0-9]+)*$").expect("Invalid hostname regex")
    });
    if re.is_match(name) {
        Ok(())
    } else {
        Err(format!("'{}' is not a valid router hostname", name))
    }
}

fn check_community(value: &str) -> Result<(), String> {
    value.parse::<crate::policy::Community>().map(|_| ())
}

fn check_large_community(value: &str) -> Result<(), String> {
    value.parse::<crate::policy::LargeCommunity>().map(|_| ())
}

fn check_regex(value: &str) -> Result<(), String> {
    regex::Regex::new(value)
        .map(|_| ())
        .map_err(|e| format!("invalid regular expression: {}", e))
}

const ACTION: Kind = Kind::OneOf(&["permit", "deny"]);

const PREFIX_SET: &[Field] = &[
    Field::optional("ipv4", Kind::List(&Kind::Prefix)),
    Field::optional("ipv6", Kind::List(&Kind::Prefix)),
];

const TUNNEL: &[Field] = &[
    Field::required("routers", Kind::List(&Kind::Text(check_hostname))),
    Field::optional("port", Kind::IntOrAuto { min: 1, max: 65535 }),
    Field::optional("cost", Kind::Int { min: 1, max: 65535 }),
    Field::optional("interface", Kind::Text(check_interface_name)),
    Field::optional("subnet_index", Kind::Int { min: 0, max: 63 }),
];

const LOCAL_PREFERENCE: &[Field] = &[
    Field::optional("anycast", Kind::Int { min: 0, max: MAX_ASN }),
    Field::optional("direct", Kind::Int { min: 0, max: MAX_ASN }),
    Field::optional("own_country", Kind::Int { min: 0, max: MAX_ASN }),
    Field::optional("peer_country", Kind::Int { min: 0, max: MAX_ASN }),
    Field::optional("own_region", Kind::Int { min: 0, max: MAX_ASN }),
    Field::optional("peer_region", Kind::Int { min: 0, max: MAX_ASN }),
    Field::optional("default", Kind::Int { min: 0, max: MAX_ASN }),
];

const COMMANDS: &[Field] = &[
    Field::optional("wireguard", Kind::Str),
    Field::optional("frr", Kind::Str),
    Field::optional("network", Kind::Str),
];

const IBGP_GLOBAL: &[Field] = &[
    Field::optional("enabled", Kind::Bool),
    Field::optional("members", Kind::List(&Kind::Text(check_hostname))),
    Field::optional("keepalive", Kind::Duration),
    Field::optional("hold", Kind::Duration),
];

const IBGP_HOST: &[Field] = &[
    Field::optional("enabled", Kind::Bool),
    Field::optional("keepalive", Kind::Duration),
    Field::optional("hold", Kind::Duration),
];

const OSPF: &[Field] = &[
    Field::optional("enabled", Kind::Bool),
    Field::optional("area", Kind::Ipv4),
    Field::optional("hello_interval", Kind::Duration),
    Field::optional("dead_interval", Kind::Duration),
    Field::optional("cost", Kind::Int { min: 1, max: 65535 }),
];

const WIREGUARD: &[Field] = &[
    Field::optional("mtu", Kind::Int { min: 1280, max: 9000 }),
    Field::optional("persistent_keepalive", Kind::Duration),
    Field::optional("allowed_ips", Kind::List(&Kind::Prefix)),
];

const STATIC_ROUTE: &[Field] = &[
    Field::required("prefix", Kind::Prefix),
    Field::required("via", Kind::NonEmptyStr),
    Field::optional("distance", Kind::Int { min: 1, max: 255 }),
];

const PREFIX_ENTRY: &[Field] = &[
    Field::optional("seq", Kind::Int { min: 1, max: 65535 }),
    Field::required("action", ACTION),
    Field::required("prefix", Kind::Prefix),
    Field::optional("ge", Kind::Int { min: 0, max: 128 }),
    Field::optional("le", Kind::Int { min: 0, max: 128 }),
];

const COMMUNITY_ENTRY: &[Field] = &[
    Field::required("action", ACTION),
    Field::required("community", Kind::Text(check_community)),
];

const LARGE_COMMUNITY_ENTRY: &[Field] = &[
    Field::required("action", ACTION),
    Field::optional("community", Kind::Text(check_large_community)),
    Field::optional("regex", Kind::Text(check_regex)),
];

const AS_PATH_ENTRY: &[Field] = &[
    Field::optional("seq", Kind::Int { min: 1, max: 65535 }),
    Field::required("action", ACTION),
    Field::required("regex", Kind::Text(check_regex)),
];

const ROUTE_MATCH: &[Field] = &[
    Field::optional("prefix_list", Kind::NonEmptyStr),
    Field::optional("community_list", Kind::NonEmptyStr),
    Field::optional("large_community_list", Kind::NonEmptyStr),
    Field::optional("as_path", Kind::NonEmptyStr),
];

const ROUTE_SET: &[Field] = &[
    Field::optional("local_preference", Kind::Int { min: 0, max: MAX_ASN }),
    Field::optional("metric", Kind::Int { min: 0, max: MAX_ASN }),
    Field::optional("community_additive", Kind::List(&Kind::Text(check_community))),
    Field::optional("large_community_additive", Kind::List(&Kind::Text(check_large_community))),
    Field::optional("community_delete", Kind::NonEmptyStr),
    Field::optional("large_community_delete", Kind::NonEmptyStr),
];

const ROUTE_MAP_ENTRY: &[Field] = &[
    Field::required("seq", Kind::Int { min: 1, max: 65535 }),
    Field::required("action", ACTION),
    Field::optional("match", Kind::Object(ROUTE_MATCH)),
    Field::optional("set", Kind::Object(ROUTE_SET)),
];

const PREFIX_LIST: &[Field] = &[
    Field::required("name", Kind::NonEmptyStr),
    Field::required("entries", Kind::List(&Kind::Object(PREFIX_ENTRY))),
];

const COMMUNITY_LIST: &[Field] = &[
    Field::required("name", Kind::NonEmptyStr),
    Field::required("entries", Kind::List(&Kind::Object(COMMUNITY_ENTRY))),
];

const LARGE_COMMUNITY_LIST: &[Field] = &[
    Field::required("name", Kind::NonEmptyStr),
    Field::required("entries", Kind::List(&Kind::Object(LARGE_COMMUNITY_ENTRY))),
];

const AS_PATH_ACL: &[Field] = &[
    Field::required("name", Kind::NonEmptyStr),
    Field::required("entries", Kind::List(&Kind::Object(AS_PATH_ENTRY))),
];

const ROUTE_MAP: &[Field] = &[
    Field::required("name", Kind::NonEmptyStr),
    Field::required("entries", Kind::List(&Kind::Object(ROUTE_MAP_ENTRY))),
];

const POLICY: &[Field] = &[
    Field::optional("prefix_lists", Kind::List(&Kind::Object(PREFIX_LIST))),
    Field::optional("community_lists", Kind::List(&Kind::Object(COMMUNITY_LIST))),
    Field::optional(
        "large_community_lists",
        Kind::List(&Kind::Object(LARGE_COMMUNITY_LIST)),
    ),
    Field::optional("as_path_acls", Kind::List(&Kind::Object(AS_PATH_ACL))),
    Field::optional("route_maps", Kind::List(&Kind::Object(ROUTE_MAP))),
];

const PEER: &[Field] = &[
    Field::required("name", Kind::NonEmptyStr),
    Field::required("asn", Kind::Int { min: 1, max: MAX_ASN }),
    Field::required("public_key", Kind::NonEmptyStr),
    Field::optional("endpoint", Kind::NonEmptyStr),
    Field::optional("tunnel_address", Kind::Prefix),
    Field::optional("listen_port", Kind::IntOrAuto { min: 1, max: 65535 }),
    Field::required("peer_ip", Kind::Ip),
    Field::required("latency_us", Kind::Numeric { min: 0, max: MAX_ASN }),
    Field::required("region", Kind::NonEmptyStr),
    Field::required("country", Kind::NonEmptyStr).or_alias("iso_3166_country_code"),
    Field::optional("extended_nexthop", Kind::Bool),
    Field::optional("interface", Kind::Text(check_interface_name)),
    Field::optional("mtu", Kind::Int { min: 1280, max: 9000 }),
];

const BGP_PEER: &[Field] = &[
    Field::required("name", Kind::NonEmptyStr),
    Field::required("remote_as", Kind::Int { min: 1, max: MAX_ASN }),
    Field::required("neighbor", Kind::Ip),
    Field::optional("type", Kind::NonEmptyStr),
    Field::optional("region", Kind::NonEmptyStr),
    Field::optional("country", Kind::NonEmptyStr),
    Field::optional("route_map_in", Kind::NonEmptyStr),
    Field::optional("route_map_out", Kind::NonEmptyStr),
    Field::optional("update_source", Kind::NonEmptyStr),
    Field::optional("multihop", Kind::Int { min: 1, max: 255 }),
];

const NETWORK_INTERFACE: &[Field] = &[
    Field::optional("name", Kind::Text(check_interface_name)),
    Field::optional("mtu", Kind::Int { min: 1280, max: 9000 }),
];

const OS_FAMILY: Kind = Kind::OneOf(&["debian", "systemd"]);

/// Schema of `group_vars/all/global.yml`
pub const GLOBAL_SCHEMA: &[Field] = &[
    Field::required("asn", Kind::Int { min: 1, max: MAX_ASN }),
    Field::optional("intra_network_tunnels", Kind::List(&Kind::Object(TUNNEL))),
    Field::optional("segment_routing_enabled", Kind::Bool),
    Field::optional("own_prefixes", Kind::Object(PREFIX_SET)),
    Field::optional("anycast_prefixes", Kind::Object(PREFIX_SET)),
    Field::optional("address_space", Kind::Object(PREFIX_SET)),
    Field::optional("local_preference", Kind::Object(LOCAL_PREFERENCE)),
    Field::optional("regions", Kind::Map(&Kind::Int { min: 1, max: 65535 })),
    Field::optional("countries", Kind::Map(&Kind::Int { min: 1, max: 999 })),
    Field::optional("validation", Kind::Object(COMMANDS)),
    Field::optional("reload", Kind::Object(COMMANDS)),
    Field::optional("ibgp", Kind::Object(IBGP_GLOBAL)),
    Field::optional("ospf", Kind::Object(OSPF)),
    Field::optional("wireguard", Kind::Object(WIREGUARD)),
    Field::optional("os_family", OS_FAMILY),
    Field::optional("static_routes", Kind::List(&Kind::Object(STATIC_ROUTE))),
    Field::optional("policy", Kind::Object(POLICY)),
    Field::optional("outbound_route_map", Kind::NonEmptyStr),
];

/// Schema of `host_vars/<host>/main.yml`
pub const HOST_SCHEMA: &[Field] = &[
    Field::required("loopback", Kind::Ipv4),
    Field::optional("loopback_v6", Kind::Ip),
    Field::required("wan", Kind::Ip),
    Field::required("region", Kind::NonEmptyStr),
    Field::required("country", Kind::NonEmptyStr).or_alias("iso_3166_country_code"),
    Field::optional("id", Kind::Int { min: 0, max: 30000 }),
    Field::optional("router_id", Kind::Ipv4),
    Field::optional("network_interface", Kind::Object(NETWORK_INTERFACE)),
    Field::required("wireguard_private_key", Kind::NonEmptyStr),
    Field::required("wireguard_public_key", Kind::NonEmptyStr),
    Field::optional("peers", Kind::List(&Kind::Object(PEER))),
    Field::optional("bgp_peers", Kind::List(&Kind::Object(BGP_PEER))),
    Field::optional("asn", Kind::Int { min: 1, max: MAX_ASN }),
    Field::optional("ibgp", Kind::Object(IBGP_HOST)),
    Field::optional("ospf", Kind::Object(OSPF)),
    Field::optional("wireguard", Kind::Object(WIREGUARD)),
    Field::optional("os_family", OS_FAMILY),
    Field::optional("static_routes", Kind::List(&Kind::Object(STATIC_ROUTE))),
    Field::optional("policy", Kind::Object(POLICY)),
    Field::optional("outbound_route_map", Kind::NonEmptyStr),
];

/// Schema of `hosts.yml`; only the router group is read
pub const HOSTS_SCHEMA: &[Field] = &[Field::required(
    "all",
    Kind::Record(&[Field::required(
        "children",
        Kind::Record(&[Field::required(
            "routers",
            Kind::Record(&[Field::required("hosts", Kind::Map(&Kind::Any))]),
        )]),
    )]),
)];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::validation::check_document;

    const HOST_YAML: &str = r#"
loopback: 172.22.144.1
wan: 203.0.113.161
region: Europe
iso_3166_country_code: GB
wireguard_private_key: cHJpdmF0ZS1rZXktbGhy
wireguard_public_key: cHVibGljLWtleS1saHI=
ospf:
  cost: 20
static_routes:
  - prefix: 172.22.144.0/27
    via: blackhole
peers:
  - name: kioubit
    asn: 4242423914
    public_key: a2lvdWJpdA==
    endpoint: uk1.g-load.eu:21869
    listen_port: auto
    peer_ip: fe80::ade0
    latency_us: "5000"
    region: Europe
    iso_3166_country_code: GB
"#;

    #[test]
    fn test_host_config_parsing() {
        let value: serde_yaml::Value = serde_yaml::from_str(HOST_YAML).unwrap();
        assert!(check_document(&value, HOST_SCHEMA, "host").is_empty());

        let host: HostConfig = serde_yaml::from_value(value).unwrap();
        assert_eq!(host.country, "GB");
        assert_eq!(host.peers[0].latency_us, 5000);
        assert_eq!(host.peers[0].listen_port, PortSpec::Auto);
        assert_eq!(host.peers[0].country, "GB");
        assert_eq!(host.overrides.ospf.as_ref().unwrap().cost, Some(20));
        assert_eq!(host.overrides.static_routes.len(), 1);
        assert_eq!(host.wireguard_private_key.expose(), "cHJpdmF0ZS1rZXktbGhy");
    }

    #[test]
    fn test_secret_is_redacted_in_debug() {
        let secret = Secret::new("super-secret");
        assert_eq!(format!("{:?}", secret), "Secret(<redacted>)");
    }

    #[test]
    fn test_port_and_timer_forms() {
        let tunnel: TunnelConfig =
            serde_yaml::from_str("routers: [lhr-r001, ewr-r001]\nport: 51820\n").unwrap();
        assert_eq!(tunnel.port, PortSpec::Explicit(51820));

        let tunnel: TunnelConfig = serde_yaml::from_str("routers: [lhr-r001, ewr-r001]\n").unwrap();
        assert_eq!(tunnel.port, PortSpec::Auto);

        let ibgp: IbgpConfig = serde_yaml::from_str("keepalive: 10s\nhold: 1m\n").unwrap();
        assert_eq!(ibgp.keepalive, Some(Seconds(10)));
        assert_eq!(ibgp.hold, Some(Seconds(60)));
    }

    #[test]
    fn test_host_overlay_is_field_by_field() {
        let global = OspfConfig {
            enabled: Some(true),
            area: Some("0.0.0.0".parse().unwrap()),
            hello_interval: Some(Seconds(10)),
            dead_interval: Some(Seconds(40)),
            cost: Some(10),
        };
        let host = OspfConfig {
            cost: Some(50),
            ..Default::default()
        };
        let effective = host.overlay(&global);
        assert_eq!(effective.cost, Some(50));
        assert_eq!(effective.hello_interval, Some(Seconds(10)));
        assert_eq!(effective.enabled, Some(true));
    }

    #[test]
    fn test_global_schema_rejects_bad_tunnel() {
        let value: serde_yaml::Value = serde_yaml::from_str(
            r#"
asn: 4242421869
intra_network_tunnels:
  - routers: [lhr-r001, EWR_R001]
    port: manual
"#,
        )
        .unwrap();
        let fields: Vec<String> = check_document(&value, GLOBAL_SCHEMA, "global")
            .into_iter()
            .map(|v| v.field)
            .collect();
        assert_eq!(
            fields,
            vec![
                "global.intra_network_tunnels[0].routers[1]".to_string(),
                "global.intra_network_tunnels[0].port".to_string(),
            ]
        );
    }
}
