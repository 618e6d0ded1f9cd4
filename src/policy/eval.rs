//! First-match route-map evaluation.
//!
//! Applies a compiled route-map to a single route the way the routing daemon
//! would: entries in ascending sequence order, all match clauses of an entry
//! must hold, the first matching entry decides, and no match means deny.
//! There is no best-path selection here.

use super::types::*;
use crate::utils::ip_utils::Prefix;

/// A route as seen by a route-map
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub prefix: Prefix,
    pub as_path: Vec<u32>,
    pub communities: Vec<Community>,
    pub large_communities: Vec<LargeCommunity>,
    pub local_preference: Option<u32>,
    pub med: Option<u32>,
}

impl Route {
    pub fn new(prefix: Prefix, as_path: Vec<u32>) -> Self {
        Route {
            prefix,
            as_path,
            communities: Vec::new(),
            large_communities: Vec::new(),
            local_preference: None,
            med: None,
        }
    }

    pub fn with_communities(mut self, communities: &[Community]) -> Self {
        self.communities.extend_from_slice(communities);
        self
    }

    pub fn with_large_communities(mut self, communities: &[LargeCommunity]) -> Self {
        self.large_communities.extend_from_slice(communities);
        self
    }
}

/// Result of running a route through a route-map
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Accepted, with the route as modified by the set clauses
    Permit { seq: u32, route: Route },
    /// Rejected by an explicit deny entry, or by no entry matching (`seq` is `None`)
    Deny { seq: Option<u32> },
}

impl Verdict {
    pub fn is_permit(&self) -> bool {
        matches!(self, Verdict::Permit { .. })
    }

    pub fn route(&self) -> Option<&Route> {
        match self {
            Verdict::Permit { route, .. } => Some(route),
            Verdict::Deny { .. } => None,
        }
    }
}

/// Evaluate `route` against the route-map `name`; `None` if it is not defined
pub fn evaluate(set: &PolicySet, name: &str, route: &Route) -> Option<Verdict> {
    let map = set.route_maps.get(name)?;
    let mut entries: Vec<&RouteMapEntry> = map.entries.iter().collect();
    entries.sort_by_key(|e| e.seq);

    for entry in entries {
        if !entry_matches(set, &entry.matches, route) {
            continue;
        }
        return Some(match entry.action {
            Action::Deny => Verdict::Deny { seq: Some(entry.seq) },
            Action::Permit => Verdict::Permit {
                seq: entry.seq,
                route: apply(set, &entry.set, route),
            },
        });
    }
    Some(Verdict::Deny { seq: None })
}

fn entry_matches(set: &PolicySet, matches: &RouteMatch, route: &Route) -> bool {
    let permitted = |result: Option<Action>| result == Some(Action::Permit);

    if let Some(name) = &matches.prefix_list {
        match set.prefix_lists.get(name) {
            Some(list) if permitted(list.evaluate(&route.prefix)) => {}
            _ => return false,
        }
    }
    if let Some(name) = &matches.community_list {
        match set.community_lists.get(name) {
            Some(list) if permitted(list.evaluate(&route.communities)) => {}
            _ => return false,
        }
    }
    if let Some(name) = &matches.large_community_list {
        match set.large_community_lists.get(name) {
            Some(list) if permitted(list.evaluate(&route.large_communities)) => {}
            _ => return false,
        }
    }
    if let Some(name) = &matches.as_path {
        match set.as_path_acls.get(name) {
            Some(acl) if permitted(acl.evaluate(&route.as_path)) => {}
            _ => return false,
        }
    }
    true
}

fn apply(set: &PolicySet, clauses: &RouteSet, route: &Route) -> Route {
    let mut route = route.clone();

    if let Some(pref) = clauses.local_preference {
        route.local_preference = Some(pref);
    }
    if let Some(metric) = clauses.metric {
        route.med = Some(metric);
    }
    if let Some(list) = clauses
        .community_delete
        .as_ref()
        .and_then(|name| set.community_lists.get(name))
    {
        route
            .communities
            .retain(|c| list.evaluate(std::slice::from_ref(c)) != Some(Action::Permit));
    }
    if let Some(list) = clauses
        .large_community_delete
        .as_ref()
        .and_then(|name| set.large_community_lists.get(name))
    {
        route
            .large_communities
            .retain(|c| list.evaluate(std::slice::from_ref(c)) != Some(Action::Permit));
    }
    for community in &clauses.community_additive {
        if !route.communities.contains(community) {
            route.communities.push(*community);
        }
    }
    for community in &clauses.large_community_additive {
        if !route.large_communities.contains(community) {
            route.large_communities.push(*community);
        }
    }
    route
}
