//! Policy object definitions.
//!
//! These are the routing-daemon objects the compiler emits: prefix lists,
//! community lists, large community lists, AS-path access lists and
//! route-maps. User policy libraries deserialize directly into the same types.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::PolicyError;
use crate::utils::ip_utils::Prefix;

/// Entry disposition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Permit,
    Deny,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Permit => write!(f, "permit"),
            Action::Deny => write!(f, "deny"),
        }
    }
}

/// Address family of a prefix list or BGP session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
}

impl AddressFamily {
    pub const ALL: [AddressFamily; 2] = [AddressFamily::Ipv4, AddressFamily::Ipv6];

    /// Suffix used in generated object names
    pub fn suffix(&self) -> &'static str {
        match self {
            AddressFamily::Ipv4 => "v4",
            AddressFamily::Ipv6 => "v6",
        }
    }

    pub fn of(prefix: &Prefix) -> Self {
        if prefix.is_ipv4() {
            AddressFamily::Ipv4
        } else {
            AddressFamily::Ipv6
        }
    }

    pub fn of_addr(addr: &std::net::IpAddr) -> Self {
        if addr.is_ipv4() {
            AddressFamily::Ipv4
        } else {
            AddressFamily::Ipv6
        }
    }
}

/// Standard BGP community `asn:value`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(try_from = "String")]
pub struct Community {
    pub asn: u16,
    pub value: u16,
}

impl Community {
    pub const fn new(asn: u16, value: u16) -> Self {
        Community { asn, value }
    }
}

impl fmt::Display for Community {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.asn, self.value)
    }
}

impl FromStr for Community {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (asn, value) = s
            .split_once(':')
            .ok_or_else(|| format!("Invalid community '{}', expected asn:value", s))?;
        let asn = asn
            .parse::<u16>()
            .map_err(|_| format!("Invalid community '{}': asn must fit 16 bits", s))?;
        let value = value
            .parse::<u16>()
            .map_err(|_| format!("Invalid community '{}': value must fit 16 bits", s))?;
        Ok(Community { asn, value })
    }
}

impl TryFrom<String> for Community {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Large BGP community `global:local1:local2`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(try_from = "String")]
pub struct LargeCommunity {
    pub global: u32,
    pub local1: u32,
    pub local2: u32,
}

impl LargeCommunity {
    pub const fn new(global: u32, local1: u32, local2: u32) -> Self {
        LargeCommunity {
            global,
            local1,
            local2,
        }
    }
}

impl fmt::Display for LargeCommunity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.global, self.local1, self.local2)
    }
}

impl FromStr for LargeCommunity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 3 {
            return Err(format!("Invalid large community '{}', expected a:b:c", s));
        }
        let parse = |part: &str| {
            part.parse::<u32>()
                .map_err(|_| format!("Invalid large community '{}'", s))
        };
        Ok(LargeCommunity {
            global: parse(parts[0])?,
            local1: parse(parts[1])?,
            local2: parse(parts[2])?,
        })
    }
}

impl TryFrom<String> for LargeCommunity {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// One prefix-list entry. Without `ge`/`le` only the exact prefix matches.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrefixEntry {
    #[serde(default)]
    pub seq: u32,
    pub action: Action,
    pub prefix: Prefix,
    #[serde(default)]
    pub ge: Option<u8>,
    #[serde(default)]
    pub le: Option<u8>,
}

impl PrefixEntry {
    pub fn new(action: Action, prefix: Prefix, ge: Option<u8>, le: Option<u8>) -> Self {
        PrefixEntry {
            seq: 0,
            action,
            prefix,
            ge,
            le,
        }
    }

    pub fn matches(&self, route: &Prefix) -> bool {
        if !self.prefix.contains(route) {
            return false;
        }
        let (min, max) = match (self.ge, self.le) {
            (None, None) => (self.prefix.len, self.prefix.len),
            (Some(ge), None) => (ge, self.prefix.max_len()),
            (None, Some(le)) => (self.prefix.len, le),
            (Some(ge), Some(le)) => (ge, le),
        };
        route.len >= min && route.len <= max
    }
}

/// Prefix list as declared in a policy library
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrefixListDef {
    pub name: String,
    pub entries: Vec<PrefixEntry>,
}

/// Prefix list bound to one address family. An empty list matches nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixList {
    pub name: String,
    pub family: AddressFamily,
    pub entries: Vec<PrefixEntry>,
}

impl PrefixList {
    /// Build a list, numbering entries that carry no explicit sequence
    pub fn new(name: impl Into<String>, family: AddressFamily, entries: Vec<PrefixEntry>) -> Self {
        PrefixList {
            name: name.into(),
            family,
            entries: number_entries(entries),
        }
    }

    pub fn from_def(def: &PrefixListDef) -> Result<Self, PolicyError> {
        let mut families = def.entries.iter().map(|e| AddressFamily::of(&e.prefix));
        let family = families.next().unwrap_or(AddressFamily::Ipv4);
        if families.any(|f| f != family) {
            return Err(PolicyError::MixedAddressFamily {
                name: def.name.clone(),
            });
        }
        Ok(PrefixList::new(def.name.clone(), family, def.entries.clone()))
    }

    /// First matching entry's action; `None` means no entry matched
    pub fn evaluate(&self, route: &Prefix) -> Option<Action> {
        if AddressFamily::of(route) != self.family {
            return None;
        }
        self.entries
            .iter()
            .find(|entry| entry.matches(route))
            .map(|entry| entry.action)
    }
}

fn number_entries(mut entries: Vec<PrefixEntry>) -> Vec<PrefixEntry> {
    for (index, entry) in entries.iter_mut().enumerate() {
        if entry.seq == 0 {
            entry.seq = (index as u32 + 1) * 5;
        }
    }
    entries
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommunityEntry {
    pub action: Action,
    pub community: Community,
}

/// Standard community list
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommunityList {
    pub name: String,
    pub entries: Vec<CommunityEntry>,
}

impl CommunityList {
    pub fn single(name: impl Into<String>, community: Community) -> Self {
        CommunityList {
            name: name.into(),
            entries: vec![CommunityEntry {
                action: Action::Permit,
                community,
            }],
        }
    }

    pub fn evaluate(&self, communities: &[Community]) -> Option<Action> {
        self.entries
            .iter()
            .find(|entry| communities.contains(&entry.community))
            .map(|entry| entry.action)
    }
}

/// How a large community list entry matches
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LargeCommunityMatcher {
    Exact(LargeCommunity),
    /// Expanded list entry, matched against `global:local1:local2`
    Regex(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawLargeCommunityEntry")]
pub struct LargeCommunityEntry {
    pub action: Action,
    pub matcher: LargeCommunityMatcher,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawLargeCommunityEntry {
    action: Action,
    #[serde(default)]
    community: Option<LargeCommunity>,
    #[serde(default)]
    regex: Option<String>,
}

impl TryFrom<RawLargeCommunityEntry> for LargeCommunityEntry {
    type Error = String;

    fn try_from(raw: RawLargeCommunityEntry) -> Result<Self, Self::Error> {
        let matcher = match (raw.community, raw.regex) {
            (Some(community), None) => LargeCommunityMatcher::Exact(community),
            (None, Some(regex)) => LargeCommunityMatcher::Regex(regex),
            _ => return Err("large community entry needs exactly one of community or regex".to_string()),
        };
        Ok(LargeCommunityEntry {
            action: raw.action,
            matcher,
        })
    }
}

/// Large community list; expanded if any entry is a regex
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LargeCommunityList {
    pub name: String,
    pub entries: Vec<LargeCommunityEntry>,
}

impl LargeCommunityList {
    pub fn is_expanded(&self) -> bool {
        self.entries
            .iter()
            .any(|e| matches!(e.matcher, LargeCommunityMatcher::Regex(_)))
    }

    pub fn evaluate(&self, communities: &[LargeCommunity]) -> Option<Action> {
        self.entries
            .iter()
            .find(|entry| match &entry.matcher {
                LargeCommunityMatcher::Exact(c) => communities.contains(c),
                LargeCommunityMatcher::Regex(pattern) => match regex::Regex::new(pattern) {
                    Ok(re) => communities.iter().any(|c| re.is_match(&c.to_string())),
                    Err(_) => false,
                },
            })
            .map(|entry| entry.action)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AsPathEntry {
    #[serde(default)]
    pub seq: u32,
    pub action: Action,
    pub regex: String,
}

/// AS-path access list
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AsPathAcl {
    pub name: String,
    pub entries: Vec<AsPathEntry>,
}

impl AsPathAcl {
    pub fn evaluate(&self, as_path: &[u32]) -> Option<Action> {
        let path = as_path
            .iter()
            .map(|asn| asn.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        self.entries
            .iter()
            .find(|entry| match regex::Regex::new(&entry.regex) {
                Ok(re) => re.is_match(&path),
                Err(_) => false,
            })
            .map(|entry| entry.action)
    }
}

/// Match clauses of a route-map entry; all present clauses must match
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteMatch {
    #[serde(default)]
    pub prefix_list: Option<String>,
    #[serde(default)]
    pub community_list: Option<String>,
    #[serde(default)]
    pub large_community_list: Option<String>,
    #[serde(default)]
    pub as_path: Option<String>,
}

/// Set clauses of a route-map entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteSet {
    #[serde(default)]
    pub local_preference: Option<u32>,
    #[serde(default)]
    pub metric: Option<u32>,
    #[serde(default)]
    pub community_additive: Vec<Community>,
    #[serde(default)]
    pub large_community_additive: Vec<LargeCommunity>,
    #[serde(default)]
    pub community_delete: Option<String>,
    #[serde(default)]
    pub large_community_delete: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteMapEntry {
    pub seq: u32,
    pub action: Action,
    #[serde(default, rename = "match")]
    pub matches: RouteMatch,
    #[serde(default)]
    pub set: RouteSet,
}

/// Ordered route-map; evaluated by ascending sequence number, first match wins
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteMap {
    pub name: String,
    pub entries: Vec<RouteMapEntry>,
}

/// User-declared policy objects from the global or host configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyLibrary {
    #[serde(default)]
    pub prefix_lists: Vec<PrefixListDef>,
    #[serde(default)]
    pub community_lists: Vec<CommunityList>,
    #[serde(default)]
    pub large_community_lists: Vec<LargeCommunityList>,
    #[serde(default)]
    pub as_path_acls: Vec<AsPathAcl>,
    #[serde(default)]
    pub route_maps: Vec<RouteMap>,
}

/// Every policy object one router's routing daemon receives, keyed by name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicySet {
    pub prefix_lists: BTreeMap<String, PrefixList>,
    pub community_lists: BTreeMap<String, CommunityList>,
    pub large_community_lists: BTreeMap<String, LargeCommunityList>,
    pub as_path_acls: BTreeMap<String, AsPathAcl>,
    pub route_maps: BTreeMap<String, RouteMap>,
}

impl PolicySet {
    pub fn add_prefix_list(&mut self, list: PrefixList) {
        self.prefix_lists.insert(list.name.clone(), list);
    }

    pub fn add_community_list(&mut self, list: CommunityList) {
        self.community_lists.insert(list.name.clone(), list);
    }

    pub fn add_large_community_list(&mut self, list: LargeCommunityList) {
        self.large_community_lists.insert(list.name.clone(), list);
    }

    pub fn add_as_path_acl(&mut self, acl: AsPathAcl) {
        self.as_path_acls.insert(acl.name.clone(), acl);
    }

    pub fn add_route_map(&mut self, map: RouteMap) {
        self.route_maps.insert(map.name.clone(), map);
    }

    /// Add every object of a library, replacing same-named objects
    pub fn extend_from_library(&mut self, library: &PolicyLibrary) -> Vec<PolicyError> {
        let mut errors = Vec::new();
        for def in &library.prefix_lists {
            match PrefixList::from_def(def) {
                Ok(list) => self.add_prefix_list(list),
                Err(e) => errors.push(e),
            }
        }
        for list in &library.community_lists {
            self.add_community_list(list.clone());
        }
        for list in &library.large_community_lists {
            self.add_large_community_list(list.clone());
        }
        for acl in &library.as_path_acls {
            self.add_as_path_acl(acl.clone());
        }
        for map in &library.route_maps {
            self.add_route_map(map.clone());
        }
        errors
    }

    /// Every route-map reference to a list that is not defined in this set
    pub fn check_references(&self) -> Vec<PolicyError> {
        let mut errors = Vec::new();
        for map in self.route_maps.values() {
            for entry in &map.entries {
                let mut require = |kind: &'static str, name: &Option<String>, defined: bool| {
                    if let Some(name) = name {
                        if !defined {
                            errors.push(PolicyError::UndefinedReference {
                                route_map: map.name.clone(),
                                seq: entry.seq,
                                kind,
                                name: name.clone(),
                            });
                        }
                    }
                };
                let m = &entry.matches;
                let s = &entry.set;
                require("prefix-list", &m.prefix_list, self.has(&self.prefix_lists, &m.prefix_list));
                require("community-list", &m.community_list, self.has(&self.community_lists, &m.community_list));
                require(
                    "large-community-list",
                    &m.large_community_list,
                    self.has(&self.large_community_lists, &m.large_community_list),
                );
                require("as-path access-list", &m.as_path, self.has(&self.as_path_acls, &m.as_path));
                require(
                    "community-list",
                    &s.community_delete,
                    self.has(&self.community_lists, &s.community_delete),
                );
                require(
                    "large-community-list",
                    &s.large_community_delete,
                    self.has(&self.large_community_lists, &s.large_community_delete),
                );
            }
        }
        errors
    }

    fn has<T>(&self, map: &BTreeMap<String, T>, name: &Option<String>) -> bool {
        name.as_ref().map_or(true, |n| map.contains_key(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::ip_utils::parse_prefix;

    fn prefix(s: &str) -> Prefix {
        parse_prefix(s).unwrap()
    }

    #[test]
    fn test_community_parsing() {
        assert_eq!("64511:41".parse::<Community>(), Ok(Community::new(64511, 41)));
        assert!("64511".parse::<Community>().is_err());
        assert!("4242421869:1".parse::<Community>().is_err());

        let large: LargeCommunity = "4242421869:1:1".parse().unwrap();
        assert_eq!(large, LargeCommunity::new(4242421869, 1, 1));
        assert_eq!(large.to_string(), "4242421869:1:1");
    }

    #[test]
    fn test_prefix_entry_length_bounds() {
        let exact = PrefixEntry::new(Action::Permit, prefix("172.20.0.0/14"), None, None);
        assert!(exact.matches(&prefix("172.20.0.0/14")));
        assert!(!exact.matches(&prefix("172.20.1.0/24")));

        let ranged = PrefixEntry::new(Action::Permit, prefix("172.20.0.0/14"), Some(21), Some(29));
        assert!(ranged.matches(&prefix("172.22.144.0/27")));
        assert!(!ranged.matches(&prefix("172.22.0.0/16")));
        assert!(!ranged.matches(&prefix("172.22.144.1/32")));
    }

    #[test]
    fn test_prefix_list_rejects_mixed_families() {
        let def: PrefixListDef = serde_yaml::from_str(
            r#"
name: pl-mixed
entries:
  - { action: permit, prefix: 172.20.0.0/14 }
  - { action: permit, prefix: "fd00::/8" }
"#,
        )
        .unwrap();
        assert_eq!(
            PrefixList::from_def(&def),
            Err(PolicyError::MixedAddressFamily {
                name: "pl-mixed".to_string()
            })
        );
    }

    #[test]
    fn test_undefined_references_reported() {
        let library: PolicyLibrary = serde_yaml::from_str(
            r#"
route_maps:
  - name: rm-custom-out
    entries:
      - seq: 10
        action: permit
        match:
          prefix_list: pl-missing
          community_list: cl-missing
"#,
        )
        .unwrap();
        let mut set = PolicySet::default();
        assert!(set.extend_from_library(&library).is_empty());

        let errors = set.check_references();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().any(|e| matches!(
            e,
            PolicyError::UndefinedReference { kind: "prefix-list", name, .. } if name == "pl-missing"
        )));
    }

    #[test]
    fn test_as_path_acl_direct_origin() {
        let acl = AsPathAcl {
            name: "asp-direct".to_string(),
            entries: vec![AsPathEntry {
                seq: 5,
                action: Action::Permit,
                regex: "^[0-9]+$".to_string(),
            }],
        };
        assert_eq!(acl.evaluate(&[4242423914]), Some(Action::Permit));
        assert_eq!(acl.evaluate(&[4242423914, 4242420207]), None);
    }
}
