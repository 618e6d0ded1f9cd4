//! Fleet topology model.
//!
//! This module turns the validated inventory into the resolved per-router
//! model that every later stage reads.

pub mod resolve;
pub mod types;

// Re-export key types and functions for easier access
pub use resolve::{location_code, resolve};
pub use types::{BgpPeer, ExternalPeer, Fleet, Router, TunnelDeclaration};
