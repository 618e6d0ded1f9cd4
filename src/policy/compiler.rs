//! Per-router policy compilation.
//!
//! Produces every policy object one router's routing daemon needs: the shared
//! global objects, one inbound route-map per external peer and address family
//! (built from a [`PeerProfile`]), the shared outbound route-maps and the
//! merged user policy library. All references are checked before returning.

use std::collections::BTreeMap;
use std::net::IpAddr;

use log::debug;

use crate::config::PrefixSet;
use crate::error::PolicyError;
use crate::topology::{Fleet, Router};
use crate::utils::ip_utils::Prefix;

use super::communities::{country_list_name, region_list_name, slug, CommunityTable};
use super::tiers::{Tier, TierTable};
use super::types::*;

pub const DN42_PREFIX_LIST: &str = "pl-dn42";
pub const OWN_PREFIX_LIST: &str = "pl-own";
pub const ANYCAST_PREFIX_LIST: &str = "pl-anycast";
pub const DIRECT_AS_PATH: &str = "asp-direct";
pub const LEARNED_EXTERNAL_LIST: &str = "lcl-learned-external";
pub const INTERNAL_LIST: &str = "lcl-internal";
pub const OUTBOUND_ROUTE_MAP: &str = "rm-out";

/// Sequence of the catch-all deny closing every inbound route-map
pub const FINAL_DENY_SEQ: u32 = 1000;

/// Large community marking routes learned from an external peer
pub fn learned_external(asn: u32) -> LargeCommunity {
    LargeCommunity::new(asn, 1, 1)
}

/// Name of a per-family object (`pl-own` + IPv6 -> `pl-own-v6`)
pub fn family_name(base: &str, family: AddressFamily) -> String {
    format!("{}-{}", base, family.suffix())
}

/// Address families a BGP session carries
pub fn session_families(peer_ip: &IpAddr, extended_nexthop: bool) -> Vec<AddressFamily> {
    match peer_ip {
        IpAddr::V4(_) => vec![AddressFamily::Ipv4],
        IpAddr::V6(_) if extended_nexthop => AddressFamily::ALL.to_vec(),
        IpAddr::V6(_) => vec![AddressFamily::Ipv6],
    }
}

/// Inputs of an inbound route-map template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerProfile {
    pub name: String,
    pub asn: u32,
    pub region: String,
    pub country: String,
    pub latency_us: u32,
}

impl PeerProfile {
    pub fn inbound_name(&self, family: AddressFamily) -> String {
        format!("rm-in-{}-{}-{}", slug(&self.name), self.asn, family.suffix())
    }
}

/// Route-maps bound to one BGP neighbor, per address family
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionPolicy {
    pub families: Vec<AddressFamily>,
    pub inbound: BTreeMap<AddressFamily, String>,
    pub outbound: BTreeMap<AddressFamily, String>,
}

impl SessionPolicy {
    pub fn inbound(&self, family: AddressFamily) -> Option<&str> {
        self.inbound.get(&family).map(String::as_str)
    }

    pub fn outbound(&self, family: AddressFamily) -> Option<&str> {
        self.outbound.get(&family).map(String::as_str)
    }
}

/// Everything the policy stage produces for one router
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompiledPolicy {
    pub objects: PolicySet,
    /// External peer name -> session route-maps
    pub peers: BTreeMap<String, SessionPolicy>,
    /// Plain BGP peer name -> session route-maps
    pub bgp_peers: BTreeMap<String, SessionPolicy>,
}

/// Fleet-wide context shared by every router's compilation
struct Context<'a> {
    fleet: &'a Fleet,
    router: &'a Router,
    tiers: TierTable,
    communities: CommunityTable,
    own_country: String,
    own_region: String,
}

/// Compile all policy objects for one router
pub fn compile_router(fleet: &Fleet, router: &Router) -> Result<CompiledPolicy, Vec<PolicyError>> {
    let mut errors = Vec::new();
    let has_anycast = !fleet.anycast_prefixes.ipv4.is_empty() || !fleet.anycast_prefixes.ipv6.is_empty();

    let tiers = match TierTable::from_config(&fleet.local_preference, has_anycast) {
        Ok(tiers) => tiers,
        Err(e) => return Err(vec![e]),
    };
    let ctx = Context {
        fleet,
        router,
        tiers,
        communities: CommunityTable::new(&fleet.regions, &fleet.countries),
        own_country: country_list_name(&router.country),
        own_region: region_list_name(&router.region),
    };

    let mut set = PolicySet::default();
    add_global_objects(&ctx, &mut set, &mut errors);
    errors.extend(set.extend_from_library(&router.policy));

    let outbound_override = router.outbound_route_map.clone();
    if let Some(name) = &outbound_override {
        if !set.route_maps.contains_key(name) {
            errors.push(PolicyError::UndefinedRouteMap {
                owner: router.name.clone(),
                name: name.clone(),
            });
        }
    }
    let outbound_for = |family: AddressFamily| {
        outbound_override
            .clone()
            .unwrap_or_else(|| family_name(OUTBOUND_ROUTE_MAP, family))
    };

    let mut compiled = CompiledPolicy::default();

    for peer in &router.peers {
        let profile = PeerProfile {
            name: peer.name.clone(),
            asn: peer.asn,
            region: peer.region.clone(),
            country: peer.country.clone(),
            latency_us: peer.latency_us,
        };
        let owner = format!("{}/{}", router.name, peer.name);
        let families = session_families(&peer.peer_ip, peer.extended_nexthop);
        match instantiate_inbound(&ctx, &profile, &families, &owner, &mut set) {
            Ok(inbound) => {
                let outbound = families.iter().map(|f| (*f, outbound_for(*f))).collect();
                compiled.peers.insert(
                    peer.name.clone(),
                    SessionPolicy {
                        families,
                        inbound,
                        outbound,
                    },
                );
            }
            Err(mut found) => errors.append(&mut found),
        }
    }

    for peer in &router.bgp_peers {
        let owner = format!("{}/{}", router.name, peer.name);
        let families = session_families(&peer.neighbor, false);
        let mut session = SessionPolicy {
            families: families.clone(),
            ..Default::default()
        };

        for (given, slot) in [(&peer.route_map_in, 0), (&peer.route_map_out, 1)] {
            let Some(name) = given else { continue };
            if !set.route_maps.contains_key(name) {
                errors.push(PolicyError::UndefinedRouteMap {
                    owner: owner.clone(),
                    name: name.clone(),
                });
            }
            let target = if slot == 0 {
                &mut session.inbound
            } else {
                &mut session.outbound
            };
            for family in &families {
                target.insert(*family, name.clone());
            }
        }

        if !peer.is_internal(router.asn) {
            if peer.route_map_in.is_none() {
                let profile = PeerProfile {
                    name: peer.name.clone(),
                    asn: peer.remote_as,
                    region: peer.region.clone().unwrap_or_else(|| router.region.clone()),
                    country: peer.country.clone().unwrap_or_else(|| router.country.clone()),
                    latency_us: 0,
                };
                match instantiate_inbound(&ctx, &profile, &families, &owner, &mut set) {
                    Ok(inbound) => session.inbound = inbound,
                    Err(mut found) => errors.append(&mut found),
                }
            }
            if peer.route_map_out.is_none() {
                session.outbound = families.iter().map(|f| (*f, outbound_for(*f))).collect();
            }
        }

        compiled.bgp_peers.insert(peer.name.clone(), session);
    }

    errors.extend(set.check_references());

    if errors.is_empty() {
        debug!(
            "Compiled {} route-map(s) and {} prefix-list(s) for {}",
            set.route_maps.len(),
            set.prefix_lists.len(),
            router.name
        );
        compiled.objects = set;
        Ok(compiled)
    } else {
        Err(errors)
    }
}

fn add_global_objects(ctx: &Context<'_>, set: &mut PolicySet, errors: &mut Vec<PolicyError>) {
    let fleet = ctx.fleet;
    let has_anycast = ctx.tiers.preference(Tier::Anycast).is_some();

    for family in AddressFamily::ALL {
        set.add_prefix_list(covering_list(DN42_PREFIX_LIST, family, &fleet.address_space));
        set.add_prefix_list(covering_list(OWN_PREFIX_LIST, family, &fleet.own_prefixes));
        if has_anycast {
            set.add_prefix_list(covering_list(ANYCAST_PREFIX_LIST, family, &fleet.anycast_prefixes));
        }
        set.add_route_map(outbound_route_map(family, has_anycast));
    }

    set.add_as_path_acl(AsPathAcl {
        name: DIRECT_AS_PATH.to_string(),
        entries: vec![AsPathEntry {
            seq: 5,
            action: Action::Permit,
            regex: "^[0-9]+$".to_string(),
        }],
    });

    set.add_large_community_list(LargeCommunityList {
        name: LEARNED_EXTERNAL_LIST.to_string(),
        entries: vec![LargeCommunityEntry {
            action: Action::Permit,
            matcher: LargeCommunityMatcher::Exact(learned_external(fleet.asn)),
        }],
    });
    set.add_large_community_list(LargeCommunityList {
        name: INTERNAL_LIST.to_string(),
        entries: vec![LargeCommunityEntry {
            action: Action::Permit,
            matcher: LargeCommunityMatcher::Regex(format!("^{}:", fleet.asn)),
        }],
    });

    let router = ctx.router;
    match ctx.communities.country(&router.country) {
        Some(community) => set.add_community_list(CommunityList::single(&ctx.own_country, community)),
        None => errors.push(PolicyError::UnknownCommunity {
            owner: router.name.clone(),
            kind: "country",
            value: router.country.clone(),
        }),
    }
    match ctx.communities.region(&router.region) {
        Some(community) => set.add_community_list(CommunityList::single(&ctx.own_region, community)),
        None => errors.push(PolicyError::UnknownCommunity {
            owner: router.name.clone(),
            kind: "region",
            value: router.region.clone(),
        }),
    }
}

/// Prefix list permitting each prefix of one family and everything more specific
fn covering_list(base: &str, family: AddressFamily, prefixes: &PrefixSet) -> PrefixList {
    let source: &[Prefix] = match family {
        AddressFamily::Ipv4 => &prefixes.ipv4,
        AddressFamily::Ipv6 => &prefixes.ipv6,
    };
    let entries = source
        .iter()
        .filter(|p| AddressFamily::of(p) == family)
        .map(|p| PrefixEntry::new(Action::Permit, p.network(), None, Some(p.max_len())))
        .collect();
    PrefixList::new(family_name(base, family), family, entries)
}

/// Shared outbound route-map: no transit, own prefixes only, internal communities stripped
fn outbound_route_map(family: AddressFamily, with_anycast: bool) -> RouteMap {
    let strip = RouteSet {
        large_community_delete: Some(INTERNAL_LIST.to_string()),
        ..Default::default()
    };
    let mut entries = vec![
        RouteMapEntry {
            seq: 10,
            action: Action::Deny,
            matches: RouteMatch {
                large_community_list: Some(LEARNED_EXTERNAL_LIST.to_string()),
                ..Default::default()
            },
            set: RouteSet::default(),
        },
        RouteMapEntry {
            seq: 20,
            action: Action::Permit,
            matches: RouteMatch {
                prefix_list: Some(family_name(OWN_PREFIX_LIST, family)),
                ..Default::default()
            },
            set: strip.clone(),
        },
    ];
    if with_anycast {
        entries.push(RouteMapEntry {
            seq: 30,
            action: Action::Permit,
            matches: RouteMatch {
                prefix_list: Some(family_name(ANYCAST_PREFIX_LIST, family)),
                ..Default::default()
            },
            set: strip,
        });
    }
    RouteMap {
        name: family_name(OUTBOUND_ROUTE_MAP, family),
        entries,
    }
}

/// Add a peer's community lists and inbound route-maps to `set`
fn instantiate_inbound(
    ctx: &Context<'_>,
    profile: &PeerProfile,
    families: &[AddressFamily],
    owner: &str,
    set: &mut PolicySet,
) -> Result<BTreeMap<AddressFamily, String>, Vec<PolicyError>> {
    let mut errors = Vec::new();
    let region = ctx.communities.region(&profile.region);
    let country = ctx.communities.country(&profile.country);
    if region.is_none() {
        errors.push(PolicyError::UnknownCommunity {
            owner: owner.to_string(),
            kind: "region",
            value: profile.region.clone(),
        });
    }
    if country.is_none() {
        errors.push(PolicyError::UnknownCommunity {
            owner: owner.to_string(),
            kind: "country",
            value: profile.country.clone(),
        });
    }
    let (Some(region), Some(country)) = (region, country) else {
        return Err(errors);
    };

    set.add_community_list(CommunityList::single(region_list_name(&profile.region), region));
    set.add_community_list(CommunityList::single(country_list_name(&profile.country), country));

    let tag = RouteSet {
        metric: Some(profile.latency_us),
        community_additive: vec![region, country],
        large_community_additive: vec![learned_external(ctx.fleet.asn)],
        ..Default::default()
    };

    let mut names = BTreeMap::new();
    for family in families {
        let map = inbound_route_map(ctx, profile, *family, &tag);
        names.insert(*family, map.name.clone());
        set.add_route_map(map);
    }
    Ok(names)
}

/// Inbound route-map template: one permit entry per tier, highest preference first
pub fn inbound_route_map_entries(
    tiers: &TierTable,
    profile: &PeerProfile,
    own_country: &str,
    own_region: &str,
    family: AddressFamily,
    tag: &RouteSet,
) -> Vec<RouteMapEntry> {
    let dn42 = Some(family_name(DN42_PREFIX_LIST, family));
    let peer_country = country_list_name(&profile.country);
    let peer_region = region_list_name(&profile.region);

    let mut entries = Vec::new();
    let mut used_lists: Vec<String> = Vec::new();
    let mut own_denied = false;
    let mut seq = 0;
    let mut next_seq = || {
        seq += 10;
        seq
    };

    for (tier, preference) in tiers.iter() {
        if *tier != Tier::Anycast && !own_denied {
            // Our own prefixes must never be learned back from outside
            entries.push(RouteMapEntry {
                seq: next_seq(),
                action: Action::Deny,
                matches: RouteMatch {
                    prefix_list: Some(family_name(OWN_PREFIX_LIST, family)),
                    ..Default::default()
                },
                set: RouteSet::default(),
            });
            own_denied = true;
        }

        let matches = match tier {
            Tier::Anycast => RouteMatch {
                prefix_list: Some(family_name(ANYCAST_PREFIX_LIST, family)),
                ..Default::default()
            },
            Tier::Direct => RouteMatch {
                prefix_list: dn42.clone(),
                as_path: Some(DIRECT_AS_PATH.to_string()),
                ..Default::default()
            },
            Tier::OwnCountry | Tier::PeerCountry | Tier::OwnRegion | Tier::PeerRegion => {
                let list = match tier {
                    Tier::OwnCountry => own_country,
                    Tier::PeerCountry => peer_country.as_str(),
                    Tier::OwnRegion => own_region,
                    _ => peer_region.as_str(),
                };
                // Same list as a higher tier: that tier already took every match
                if used_lists.iter().any(|l| l == list) {
                    continue;
                }
                used_lists.push(list.to_string());
                RouteMatch {
                    prefix_list: dn42.clone(),
                    community_list: Some(list.to_string()),
                    ..Default::default()
                }
            }
            Tier::Default => RouteMatch {
                prefix_list: dn42.clone(),
                ..Default::default()
            },
        };

        entries.push(RouteMapEntry {
            seq: next_seq(),
            action: Action::Permit,
            matches,
            set: RouteSet {
                local_preference: Some(*preference),
                ..tag.clone()
            },
        });
    }

    entries.push(RouteMapEntry {
        seq: FINAL_DENY_SEQ,
        action: Action::Deny,
        matches: RouteMatch::default(),
        set: RouteSet::default(),
    });
    entries
}

fn inbound_route_map(
    ctx: &Context<'_>,
    profile: &PeerProfile,
    family: AddressFamily,
    tag: &RouteSet,
) -> RouteMap {
    RouteMap {
        name: profile.inbound_name(family),
        entries: inbound_route_map_entries(
            &ctx.tiers,
            profile,
            &ctx.own_country,
            &ctx.own_region,
            family,
            tag,
        ),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config_loader::Inventory;
    use crate::topology::resolve;

    pub(crate) fn fleet_with(global_extra: &str, host_extra: &str) -> Fleet {
        let global = format!(
            "asn: 4242421869\nown_prefixes:\n  ipv4: [172.22.144.0/27]\n  ipv6: [\"fd42:1869::/48\"]\n{}",
            global_extra
        );
        let host = format!(
            "loopback: 172.22.144.1\nwan: 203.0.113.161\nregion: Europe\ncountry: GB\n\
             wireguard_private_key: k\nwireguard_public_key: p\n{}",
            host_extra
        );
        resolve(Inventory {
            root: std::path::PathBuf::from("inventory"),
            global: serde_yaml::from_str(&global).unwrap(),
            hosts: [("lhr-r001".to_string(), serde_yaml::from_str(&host).unwrap())]
                .into_iter()
                .collect(),
        })
        .unwrap()
    }

    const PEER: &str = r#"peers:
  - name: Kioubit
    asn: 4242423914
    public_key: a2lvdWJpdA==
    peer_ip: fe80::ade0
    extended_nexthop: true
    latency_us: "5000"
    region: Europe
    country: DE
"#;

    fn compile(global_extra: &str, host_extra: &str) -> Result<CompiledPolicy, Vec<PolicyError>> {
        let fleet = fleet_with(global_extra, host_extra);
        let router = fleet.router("lhr-r001").unwrap().clone();
        compile_router(&fleet, &router)
    }

    #[test]
    fn test_inbound_route_map_per_family() {
        let compiled = compile("", PEER).unwrap();
        let session = &compiled.peers["Kioubit"];
        assert_eq!(session.families, AddressFamily::ALL.to_vec());
        assert_eq!(
            session.inbound(AddressFamily::Ipv4),
            Some("rm-in-kioubit-4242423914-v4")
        );
        assert_eq!(session.outbound(AddressFamily::Ipv6), Some("rm-out-v6"));

        let map = &compiled.objects.route_maps["rm-in-kioubit-4242423914-v6"];
        let prefs: Vec<Option<u32>> = map.entries.iter().map(|e| e.set.local_preference).collect();
        assert_eq!(
            prefs,
            vec![None, Some(300), Some(230), Some(220), Some(210), Some(100), None]
        );
        let tagged = &map.entries[1].set;
        assert_eq!(tagged.metric, Some(5000));
        assert_eq!(
            tagged.community_additive,
            vec![Community::new(64511, 41), Community::new(64511, 1276)]
        );
        assert_eq!(
            tagged.large_community_additive,
            vec![LargeCommunity::new(4242421869, 1, 1)]
        );
        assert_eq!(map.entries.last().unwrap().seq, FINAL_DENY_SEQ);
        assert!(compiled.objects.community_lists.contains_key("cl-country-DE"));
        assert!(compiled.objects.community_lists.contains_key("cl-country-GB"));
    }

    #[test]
    fn test_anycast_tier_emitted_when_configured() {
        let compiled = compile("anycast_prefixes:\n  ipv4: [172.22.144.32/32]\n", PEER).unwrap();
        let map = &compiled.objects.route_maps["rm-in-kioubit-4242423914-v4"];
        assert_eq!(map.entries[0].set.local_preference, Some(500));
        assert_eq!(map.entries[1].action, Action::Deny);
        assert!(compiled.objects.prefix_lists.contains_key("pl-anycast-v4"));
    }

    #[test]
    fn test_unknown_peer_country() {
        let peer = PEER.replace("country: DE", "country: XX");
        let errors = compile("", &peer).unwrap_err();
        assert_eq!(
            errors,
            vec![PolicyError::UnknownCommunity {
                owner: "lhr-r001/Kioubit".to_string(),
                kind: "country",
                value: "XX".to_string(),
            }]
        );
    }

    #[test]
    fn test_outbound_override_must_exist() {
        let errors = compile("", "outbound_route_map: rm-custom\n").unwrap_err();
        assert!(matches!(
            errors.as_slice(),
            [PolicyError::UndefinedRouteMap { name, .. }] if name == "rm-custom"
        ));
    }

    #[test]
    fn test_user_route_map_with_dangling_reference() {
        let library = r#"policy:
  route_maps:
    - name: rm-custom
      entries:
        - seq: 10
          action: permit
          match:
            community_list: cl-nowhere
"#;
        let errors = compile(library, "").unwrap_err();
        assert!(matches!(
            errors.as_slice(),
            [PolicyError::UndefinedReference { kind: "community-list", .. }]
        ));
    }

    #[test]
    fn test_ebgp_bgp_peer_gets_generated_inbound() {
        let bgp = "bgp_peers:\n  - name: upstream\n    remote_as: 4242420207\n    neighbor: 172.20.0.53\n    multihop: 2\n";
        let compiled = compile("", bgp).unwrap();
        let session = &compiled.bgp_peers["upstream"];
        assert_eq!(session.families, vec![AddressFamily::Ipv4]);
        assert_eq!(
            session.inbound(AddressFamily::Ipv4),
            Some("rm-in-upstream-4242420207-v4")
        );
        assert_eq!(session.outbound(AddressFamily::Ipv4), Some("rm-out-v4"));
    }
}
