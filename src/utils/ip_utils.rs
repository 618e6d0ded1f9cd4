//! IP utility functions for validation and prefix arithmetic

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use serde::Deserialize;

/// An address prefix such as `172.20.0.0/14` or `fd00::/8`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(try_from = "String")]
pub struct Prefix {
    pub addr: IpAddr,
    pub len: u8,
}

impl Prefix {
    pub fn is_ipv4(&self) -> bool {
        self.addr.is_ipv4()
    }

    /// Maximum prefix length for this address family
    pub fn max_len(&self) -> u8 {
        if self.is_ipv4() {
            32
        } else {
            128
        }
    }

    /// The prefix with host bits cleared
    pub fn network(&self) -> Prefix {
        let addr = match self.addr {
            IpAddr::V4(v4) => IpAddr::V4(Ipv4Addr::from(mask_v4(u32::from(v4), self.len))),
            IpAddr::V6(v6) => IpAddr::V6(Ipv6Addr::from(mask_v6(u128::from(v6), self.len))),
        };
        Prefix { addr, len: self.len }
    }

    /// Whether `other` lies inside this prefix (same family, equal or longer length)
    pub fn contains(&self, other: &Prefix) -> bool {
        if other.len < self.len {
            return false;
        }
        match (self.addr, other.addr) {
            (IpAddr::V4(outer), IpAddr::V4(inner)) => {
                mask_v4(u32::from(outer), self.len) == mask_v4(u32::from(inner), self.len)
            }
            (IpAddr::V6(outer), IpAddr::V6(inner)) => {
                mask_v6(u128::from(outer), self.len) == mask_v6(u128::from(inner), self.len)
            }
            _ => false,
        }
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.len)
    }
}

impl FromStr for Prefix {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_prefix(s)
    }
}

impl TryFrom<String> for Prefix {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        parse_prefix(&value)
    }
}

fn mask_v4(addr: u32, len: u8) -> u32 {
    if len == 0 {
        0
    } else {
        addr & (u32::MAX << (32 - u32::from(len.min(32))))
    }
}

fn mask_v6(addr: u128, len: u8) -> u128 {
    if len == 0 {
        0
    } else {
        addr & (u128::MAX << (128 - u32::from(len.min(128))))
    }
}

/// Parse `address/length`. A bare address is treated as a host prefix.
pub fn parse_prefix(value: &str) -> Result<Prefix, String> {
    let (addr_part, len_part) = match value.split_once('/') {
        Some((addr, len)) => (addr, Some(len)),
        None => (value, None),
    };
    let addr: IpAddr = addr_part
        .trim()
        .parse()
        .map_err(|_| format!("Invalid IP address '{}'", addr_part))?;
    let max = if addr.is_ipv4() { 32 } else { 128 };
    let len = match len_part {
        Some(len) => len
            .trim()
            .parse::<u8>()
            .ok()
            .filter(|l| *l <= max)
            .ok_or_else(|| format!("Invalid prefix length in '{}'", value))?,
        None => max,
    };
    Ok(Prefix { addr, len })
}

/// Last octet of an IPv4 address; `None` for IPv6
pub fn last_octet(ip: &IpAddr) -> Option<u8> {
    match ip {
        IpAddr::V4(v4) => Some(v4.octets()[3]),
        IpAddr::V6(_) => None,
    }
}

/// Format `host:port`, bracketing IPv6 literals
pub fn format_endpoint(ip: &IpAddr, port: u16) -> String {
    match ip {
        IpAddr::V4(v4) => format!("{}:{}", v4, port),
        IpAddr::V6(v6) => format!("[{}]:{}", v6, port),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_prefix() {
        let prefix = parse_prefix("172.20.0.0/14").unwrap();
        assert!(prefix.is_ipv4());
        assert_eq!(prefix.len, 14);
        assert_eq!(prefix.to_string(), "172.20.0.0/14");

        let host = parse_prefix("fd42:1869::1").unwrap();
        assert_eq!(host.len, 128);

        assert!(parse_prefix("172.20.0.0/33").is_err());
        assert!(parse_prefix("not-an-ip/8").is_err());
    }

    #[test]
    fn test_prefix_contains() {
        let dn42 = parse_prefix("172.20.0.0/14").unwrap();
        assert!(dn42.contains(&parse_prefix("172.22.144.0/27").unwrap()));
        assert!(!dn42.contains(&parse_prefix("172.24.0.0/16").unwrap()));
        assert!(!dn42.contains(&parse_prefix("172.0.0.0/8").unwrap()));

        let ula = parse_prefix("fd00::/8").unwrap();
        assert!(ula.contains(&parse_prefix("fd42:1869::/48").unwrap()));
        assert!(!ula.contains(&dn42));
    }

    #[test]
    fn test_network_clears_host_bits() {
        let prefix = parse_prefix("169.254.255.150/30").unwrap();
        assert_eq!(prefix.network().to_string(), "169.254.255.148/30");
    }

    #[test]
    fn test_endpoint_formatting() {
        let v4: IpAddr = "203.0.113.161".parse().unwrap();
        let v6: IpAddr = "2001:db8::1".parse().unwrap();
        assert_eq!(format_endpoint(&v4, 5323), "203.0.113.161:5323");
        assert_eq!(format_endpoint(&v6, 5323), "[2001:db8::1]:5323");
        assert_eq!(last_octet(&v4), Some(161));
        assert_eq!(last_octet(&v6), None);
    }
}
