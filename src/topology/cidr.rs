//! # IPv4 CIDR Blocks
//!
//! Parsing, formatting and sequential allocation of IPv4 CIDR blocks for the
//! subnet planner.

use super::TopologyError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// An IPv4 network in CIDR notation (`10.0.0.0/16`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv4Cidr {
    network: Ipv4Addr,
    prefix: u8,
}

impl Ipv4Cidr {
    /// `0.0.0.0/0`, the default route destination
    pub const ANY: Ipv4Cidr = Ipv4Cidr {
        network: Ipv4Addr::UNSPECIFIED,
        prefix: 0,
    };

    /// Build a block, rejecting prefixes over 32 and host bits set in `network`
    pub fn new(network: Ipv4Addr, prefix: u8) -> Result<Self, TopologyError> {
        if prefix > 32 {
            return Err(TopologyError::InvalidCidr(format!("{network}/{prefix}")));
        }
        let cidr = Self { network, prefix };
        if u32::from(network) & !cidr.netmask() != 0 {
            return Err(TopologyError::InvalidCidr(format!(
                "{network}/{prefix} (host bits set)"
            )));
        }
        Ok(cidr)
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Number of addresses in the block
    pub fn size(&self) -> u64 {
        1u64 << (32 - u32::from(self.prefix))
    }

    fn netmask(&self) -> u32 {
        if self.prefix == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(self.prefix))
        }
    }

    fn first(&self) -> u64 {
        u64::from(u32::from(self.network))
    }

    fn end(&self) -> u64 {
        self.first() + self.size()
    }

    /// Whether `other` lies entirely within this block
    pub fn contains(&self, other: &Ipv4Cidr) -> bool {
        other.prefix >= self.prefix && other.first() >= self.first() && other.end() <= self.end()
    }

    /// Whether the two blocks share any address
    pub fn overlaps(&self, other: &Ipv4Cidr) -> bool {
        self.first() < other.end() && other.first() < self.end()
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

impl FromStr for Ipv4Cidr {
    type Err = TopologyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| TopologyError::InvalidCidr(s.to_string()))?;
        let network: Ipv4Addr = addr
            .parse()
            .map_err(|_| TopologyError::InvalidCidr(s.to_string()))?;
        let prefix: u8 = prefix
            .parse()
            .map_err(|_| TopologyError::InvalidCidr(s.to_string()))?;
        Self::new(network, prefix)
    }
}

impl Serialize for Ipv4Cidr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Ipv4Cidr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Hands out aligned, non-overlapping blocks from a parent range in order
#[derive(Debug, Clone)]
pub struct CidrAllocator {
    parent: Ipv4Cidr,
    cursor: u64,
}

impl CidrAllocator {
    pub fn new(parent: Ipv4Cidr) -> Self {
        Self {
            cursor: parent.first(),
            parent,
        }
    }

    /// Allocate the next `/mask` block, aligned to its own size.
    /// Returns `None` once the parent range is exhausted.
    pub fn allocate(&mut self, mask: u8) -> Option<Ipv4Cidr> {
        if mask < self.parent.prefix || mask > 32 {
            return None;
        }
        let size = 1u64 << (32 - u32::from(mask));
        let start = self.cursor.div_ceil(size) * size;
        if start + size > self.parent.end() {
            return None;
        }
        self.cursor = start + size;
        let network = Ipv4Addr::from(u32::try_from(start).ok()?);
        Some(Ipv4Cidr {
            network,
            prefix: mask,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let cidr: Ipv4Cidr = "10.0.0.0/16".parse().unwrap();
        assert_eq!(cidr.prefix(), 16);
        assert_eq!(cidr.size(), 65_536);
        assert_eq!(cidr.to_string(), "10.0.0.0/16");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for raw in ["10.0.0.0", "10.0.0/16", "10.0.0.0/33", "10.0.0.1/16", "abc/8"] {
            assert!(raw.parse::<Ipv4Cidr>().is_err(), "{raw} should be rejected");
        }
    }

    #[test]
    fn test_allocator_sequential_blocks() {
        let mut alloc = CidrAllocator::new("10.0.0.0/16".parse().unwrap());
        assert_eq!(alloc.allocate(24).unwrap().to_string(), "10.0.0.0/24");
        assert_eq!(alloc.allocate(24).unwrap().to_string(), "10.0.1.0/24");
        // a wider block realigns past the cursor
        assert_eq!(alloc.allocate(20).unwrap().to_string(), "10.0.16.0/20");
    }

    #[test]
    fn test_allocator_exhaustion() {
        let mut alloc = CidrAllocator::new("10.0.0.0/23".parse().unwrap());
        assert!(alloc.allocate(24).is_some());
        assert!(alloc.allocate(24).is_some());
        assert!(alloc.allocate(24).is_none());
    }

    #[test]
    fn test_contains_and_overlaps() {
        let vpc: Ipv4Cidr = "10.0.0.0/16".parse().unwrap();
        let subnet: Ipv4Cidr = "10.0.4.0/24".parse().unwrap();
        let outside: Ipv4Cidr = "10.1.0.0/24".parse().unwrap();
        assert!(vpc.contains(&subnet));
        assert!(!vpc.contains(&outside));
        assert!(vpc.overlaps(&subnet));
        assert!(!subnet.overlaps(&outside));
        assert!(Ipv4Cidr::ANY.contains(&vpc));
    }
}
