//! ASN- and pair-derived link addressing.
//!
//! Intra-fleet tunnels take a /30 out of `169.254.255.0/24` numbered by the
//! ranks of the router pair, and an IPv6 link-local address built from the
//! fleet ASN.
//! External peers get their listen port and interface name from the peer ASN.

use std::net::{Ipv4Addr, Ipv6Addr};

/// Base of the block that link /30s are carved from
pub const LINK_BLOCK: Ipv4Addr = Ipv4Addr::new(169, 254, 255, 0);

/// Number of /30 subnets in the link block
pub const LINK_SUBNETS: u8 = 64;

pub const TUNNEL_PORT_BASE: u32 = 5000;
pub const EXTERNAL_PORT_BASE: u32 = 20000;

/// Last four decimal digits of an ASN (`1869` for AS4242421869)
pub fn asn_suffix(asn: u32) -> u32 {
    asn % 10000
}

/// Symmetric subnet index for an unordered pair of distinct router ranks
///
/// Pairs are numbered in triangular order, `j * (j - 1) / 2 + i` for `i < j`,
/// so distinct pairs never share an index. Eleven routers fit in full mesh;
/// past that, pairs whose index leaves the link block give `None`.
pub fn subnet_index(a: u16, b: u16) -> Option<u8> {
    let (i, j) = if a <= b { (u32::from(a), u32::from(b)) } else { (u32::from(b), u32::from(a)) };
    let index = j * j.saturating_sub(1) / 2 + i;
    u8::try_from(index).ok().filter(|index| *index < LINK_SUBNETS)
}

/// Host address inside link subnet `index`; `host` is 1 or 2
pub fn link_address_v4(index: u8, host: u8) -> Ipv4Addr {
    let [a, b, c, _] = LINK_BLOCK.octets();
    Ipv4Addr::new(a, b, c, index * 4 + host)
}

/// `fe80::{asn_suffix}:{host octet}`
///
/// Both groups are written as they read in decimal, so AS4242421869 and
/// host octet 13 give `fe80::1869:13`.
pub fn link_address_v6(asn: u32, host_octet: u8) -> Ipv6Addr {
    Ipv6Addr::new(
        0xfe80,
        0,
        0,
        0,
        0,
        0,
        decimal_group(asn_suffix(asn)),
        decimal_group(u32::from(host_octet)),
    )
}

/// Reinterpret decimal digits as a hex group; inputs stay below 10000
fn decimal_group(value: u32) -> u16 {
    u16::from_str_radix(&value.to_string(), 16).unwrap_or_default()
}

/// `auto` listen port for an external peer
pub fn external_port(peer_asn: u32) -> u32 {
    EXTERNAL_PORT_BASE + asn_suffix(peer_asn)
}

/// Default interface name for an external peer
pub fn external_interface(peer_asn: u32) -> String {
    format!("wg{}", peer_asn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subnet_index_is_symmetric() {
        assert_eq!(subnet_index(0, 1), Some(0));
        assert_eq!(subnet_index(3, 1), subnet_index(1, 3));
        assert_eq!(subnet_index(1, 3), Some(4));
    }

    #[test]
    fn test_subnet_index_distinct_across_full_mesh() {
        let mut seen = std::collections::BTreeMap::new();
        for j in 0..11u16 {
            for i in 0..j {
                let index = subnet_index(i, j).unwrap();
                assert!(index < LINK_SUBNETS);
                if let Some(other) = seen.insert(index, (i, j)) {
                    panic!("({}, {}) and {:?} share index {}", i, j, other, index);
                }
            }
        }
        assert_eq!(seen.len(), 55);
        assert_eq!(subnet_index(8, 11), Some(63));
        assert_eq!(subnet_index(9, 11), None);
    }

    #[test]
    fn test_link_addresses() {
        assert_eq!(link_address_v4(0, 1), Ipv4Addr::new(169, 254, 255, 1));
        assert_eq!(link_address_v4(63, 2), Ipv4Addr::new(169, 254, 255, 254));
        assert_eq!(link_address_v6(4242421869, 2).to_string(), "fe80::1869:2");
        assert_eq!(link_address_v6(4242421869, 13).to_string(), "fe80::1869:13");
    }

    #[test]
    fn test_external_defaults() {
        assert_eq!(external_port(4242423914), 23914);
        assert_eq!(external_interface(4242423914), "wg4242423914");
    }
}
