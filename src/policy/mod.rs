//! BGP policy compilation.
//!
//! This module encodes the cold-potato local-preference hierarchy as routing
//! daemon policy objects: DN42 community tables, the tier table, the per-peer
//! route-map templates and a first-match evaluator for checking their order.

pub mod communities;
pub mod compiler;
pub mod eval;
pub mod tiers;
pub mod types;

pub use communities::CommunityTable;
pub use compiler::{compile_router, CompiledPolicy, PeerProfile, SessionPolicy};
pub use tiers::{Tier, TierTable};
pub use types::{
    Action, AddressFamily, Community, LargeCommunity, PolicyLibrary, PolicySet, RouteMap,
};
