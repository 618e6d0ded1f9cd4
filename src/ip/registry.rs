//! Link resource registry.
//!
//! Tracks every link subnet, listen port and interface name handed out during
//! fleet derivation so that two tunnels can never silently share one. A claim
//! for a resource already held by a different owner is rejected with an error
//! naming both owners.

use std::collections::HashMap;

use crate::error::DerivationError;

/// Fleet-wide registry of claimed link resources
#[derive(Debug, Default)]
pub struct LinkRegistry {
    /// Subnet index -> tunnel label
    subnets: HashMap<u8, String>,
    /// (router, port) -> owner
    ports: HashMap<(String, u16), String>,
    /// (router, interface) -> owner
    interfaces: HashMap<(String, String), String>,
}

impl LinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a link subnet for a tunnel
    pub fn claim_subnet(&mut self, index: u8, tunnel: &str) -> Result<(), DerivationError> {
        match self.subnets.get(&index) {
            Some(other) if other != tunnel => Err(DerivationError::SubnetCollision {
                tunnel: tunnel.to_string(),
                other: other.clone(),
                index,
            }),
            Some(_) => Ok(()),
            None => {
                self.subnets.insert(index, tunnel.to_string());
                Ok(())
            }
        }
    }

    /// Claim a listen port on one router
    pub fn claim_port(&mut self, router: &str, port: u16, owner: &str) -> Result<(), DerivationError> {
        let key = (router.to_string(), port);
        match self.ports.get(&key) {
            Some(first) if first != owner => Err(DerivationError::PortCollision {
                router: router.to_string(),
                port,
                first: first.clone(),
                second: owner.to_string(),
            }),
            Some(_) => Ok(()),
            None => {
                self.ports.insert(key, owner.to_string());
                Ok(())
            }
        }
    }

    /// Claim an interface name on one router
    pub fn claim_interface(
        &mut self,
        router: &str,
        interface: &str,
        owner: &str,
    ) -> Result<(), DerivationError> {
        let key = (router.to_string(), interface.to_string());
        match self.interfaces.get(&key) {
            Some(first) if first != owner => Err(DerivationError::InterfaceCollision {
                router: router.to_string(),
                interface: interface.to_string(),
                first: first.clone(),
                second: owner.to_string(),
            }),
            Some(_) => Ok(()),
            None => {
                self.interfaces.insert(key, owner.to_string());
                Ok(())
            }
        }
    }

    /// Drop every claim held by `owner`
    pub fn release(&mut self, owner: &str) {
        self.subnets.retain(|_, held| held != owner);
        self.ports.retain(|_, held| held != owner);
        self.interfaces.retain(|_, held| held != owner);
    }

    /// Tunnel currently holding a subnet index
    pub fn subnet_owner(&self, index: u8) -> Option<&str> {
        self.subnets.get(&index).map(String::as_str)
    }

    /// Number of link subnets handed out
    pub fn subnet_count(&self) -> usize {
        self.subnets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subnet_collision_names_both_tunnels() {
        let mut registry = LinkRegistry::new();
        registry.claim_subnet(7, "ewr-r001<->lhr-r001").unwrap();
        // Re-claiming for the same tunnel is harmless
        registry.claim_subnet(7, "ewr-r001<->lhr-r001").unwrap();

        let err = registry.claim_subnet(7, "fra-r001<->sin-r001").unwrap_err();
        assert_eq!(
            err,
            DerivationError::SubnetCollision {
                tunnel: "fra-r001<->sin-r001".to_string(),
                other: "ewr-r001<->lhr-r001".to_string(),
                index: 7,
            }
        );
        assert_eq!(registry.subnet_owner(7), Some("ewr-r001<->lhr-r001"));
        assert_eq!(registry.subnet_count(), 1);
    }

    #[test]
    fn test_ports_are_scoped_per_router() {
        let mut registry = LinkRegistry::new();
        registry.claim_port("lhr-r001", 5323, "wg-ewr-lhr").unwrap();
        registry.claim_port("ewr-r001", 5323, "wg-ewr-lhr").unwrap();

        let err = registry.claim_port("lhr-r001", 5323, "wg4242423914").unwrap_err();
        assert!(matches!(err, DerivationError::PortCollision { port: 5323, .. }));
    }

    #[test]
    fn test_release_frees_only_that_owner() {
        let mut registry = LinkRegistry::new();
        registry.claim_subnet(3, "fra-r001<->lhr-r001").unwrap();
        registry.claim_port("lhr-r001", 6000, "fra-r001<->lhr-r001").unwrap();
        registry.claim_port("lhr-r001", 6001, "ewr-r001<->lhr-r001").unwrap();

        registry.release("fra-r001<->lhr-r001");
        assert_eq!(registry.subnet_owner(3), None);
        registry.claim_port("lhr-r001", 6000, "lhr-r001/kioubit").unwrap();
        assert!(registry.claim_port("lhr-r001", 6001, "lhr-r001/kioubit").is_err());
    }

    #[test]
    fn test_interface_collision() {
        let mut registry = LinkRegistry::new();
        registry.claim_interface("lhr-r001", "wg-lhr-lhr", "lhr-r001<->lhr-r002").unwrap();
        let err = registry
            .claim_interface("lhr-r001", "wg-lhr-lhr", "lhr-r001<->lhr-r003")
            .unwrap_err();
        assert!(matches!(err, DerivationError::InterfaceCollision { .. }));
    }
}
