//! Tunnel parameter derivation.
//!
//! This module computes interface names, link addresses and ports for every
//! intra-fleet tunnel and external peer, and rejects collisions fleet-wide.

pub mod allocator;
pub mod as_manager;
pub mod registry;

// Re-export commonly used types
pub use allocator::{derive_fleet, derive_pair, derive_peer_link, Derivation, PeerLink, TunnelEnd, TunnelSpec};
pub use registry::LinkRegistry;
