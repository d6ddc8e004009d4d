//! Prefix records and usage accounting.
//!
//! A [`Prefix`] is the persisted unit of the allocator: a CIDR, the set of
//! child CIDRs carved out of it, and the host addresses handed out from it.
//! Free space is never stored; it is derived from the child set on demand.

use std::collections::BTreeSet;
use std::net::IpAddr;

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use crate::error::{IpamError, IpamResult};

/// Parse a CIDR and mask off host bits.
///
/// Returns the network and its canonical string form, which is the key
/// used by every storage backend.
pub fn normalize_cidr(cidr: &str) -> IpamResult<(IpNet, String)> {
    let net = cidr
        .trim()
        .parse::<IpNet>()
        .map_err(|e| IpamError::InvalidCidr {
            cidr: cidr.to_string(),
            reason: e.to_string(),
        })?;
    let net = net.trunc();
    Ok((net, net.to_string()))
}

/// A CIDR block tracked by the allocator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Prefix {
    /// Canonical (masked) CIDR.
    pub cidr: String,
    /// CIDR of the prefix this one was acquired from, if any.
    pub parent_cidr: Option<String>,
    pub namespace: String,
    /// Acquired child prefixes.
    pub child_prefixes: BTreeSet<String>,
    /// Acquired host addresses (reserved addresses are not listed).
    pub ips: BTreeSet<IpAddr>,
    /// Incremented on every successful update.
    pub version: u64,
}

/// Usage statistics for a prefix.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    /// Host addresses still assignable from this prefix.
    pub available_ips: u64,
    /// Host addresses acquired from this prefix.
    pub acquired_ips: u64,
    /// Number of blocks with two host bits that fit in the free space.
    pub available_smallest_prefixes: u64,
    /// Free space as maximal aligned CIDRs, in address order.
    pub available_prefixes: Vec<String>,
    /// Number of acquired child prefixes.
    pub acquired_prefixes: u64,
}

impl Prefix {
    /// A fresh, empty prefix record for `net` in `namespace`.
    pub fn new(net: IpNet, namespace: &str, parent_cidr: Option<String>) -> Self {
        Self {
            cidr: net.to_string(),
            parent_cidr,
            namespace: namespace.to_string(),
            child_prefixes: BTreeSet::new(),
            ips: BTreeSet::new(),
            version: 0,
        }
    }

    /// Parsed network of this prefix.
    pub fn network(&self) -> IpamResult<IpNet> {
        normalize_cidr(&self.cidr).map(|(net, _)| net)
    }

    pub fn has_child_prefixes(&self) -> bool {
        !self.child_prefixes.is_empty()
    }

    pub fn has_ips(&self) -> bool {
        !self.ips.is_empty()
    }

    /// Parsed child networks.
    pub fn child_networks(&self) -> IpamResult<Vec<IpNet>> {
        self.child_prefixes
            .iter()
            .map(|c| normalize_cidr(c).map(|(net, _)| net))
            .collect()
    }

    /// Free space of this prefix: the prefix minus its acquired children.
    pub fn free_blocks(&self) -> IpamResult<Vec<IpNet>> {
        Ok(free_blocks(self.network()?, &self.child_networks()?))
    }

    /// Compute usage statistics.
    pub fn usage(&self) -> IpamResult<Usage> {
        let net = self.network()?;
        let free = self.free_blocks()?;

        let smallest_len = net.max_prefix_len().saturating_sub(2);
        let available_smallest_prefixes = free
            .iter()
            .filter(|b| b.prefix_len() <= smallest_len)
            .map(|b| pow2(smallest_len - b.prefix_len()))
            .fold(0u64, u64::saturating_add);

        let available_ips = if self.has_child_prefixes() {
            0
        } else {
            host_count(&net)
                .saturating_sub(reserved_addresses(&net).len() as u64)
                .saturating_sub(self.ips.len() as u64)
        };

        Ok(Usage {
            available_ips,
            acquired_ips: self.ips.len() as u64,
            available_smallest_prefixes,
            available_prefixes: free.iter().map(ToString::to_string).collect(),
            acquired_prefixes: self.child_prefixes.len() as u64,
        })
    }
}

/// Addresses that are never handed out: the network address, and for IPv4
/// the broadcast address, on prefixes with at least two host bits.
pub(crate) fn reserved_addresses(net: &IpNet) -> Vec<IpAddr> {
    if net.max_prefix_len() - net.prefix_len() < 2 {
        return Vec::new();
    }
    match net {
        IpNet::V4(_) => vec![net.network(), net.broadcast()],
        IpNet::V6(_) => vec![net.network()],
    }
}

pub(crate) fn overlaps(a: &IpNet, b: &IpNet) -> bool {
    a.contains(b) || b.contains(a)
}

/// `net` minus every block in `taken`, merged and sorted by address.
pub(crate) fn free_blocks(net: IpNet, taken: &[IpNet]) -> Vec<IpNet> {
    let mut free = vec![net];
    for t in taken {
        free = free.into_iter().flat_map(|f| subtract(f, t)).collect();
    }
    let mut merged = IpNet::aggregate(&free);
    merged.sort();
    merged
}

fn subtract(block: IpNet, taken: &IpNet) -> Vec<IpNet> {
    if !overlaps(&block, taken) {
        return vec![block];
    }
    if taken.contains(&block) {
        return Vec::new();
    }
    // block strictly contains taken: split and recurse into both halves
    match block.subnets(block.prefix_len() + 1) {
        Ok(halves) => halves.flat_map(|h| subtract(h, taken)).collect(),
        Err(_) => Vec::new(),
    }
}

fn host_count(net: &IpNet) -> u64 {
    pow2(net.max_prefix_len() - net.prefix_len())
}

fn pow2(exp: u8) -> u64 {
    if exp >= 64 { u64::MAX } else { 1u64 << exp }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net(s: &str) -> IpNet {
        s.parse().unwrap()
    }

    #[test]
    fn normalize_masks_host_bits() {
        let (n, s) = normalize_cidr("192.168.1.2/24").unwrap();
        assert_eq!(s, "192.168.1.0/24");
        assert_eq!(n.prefix_len(), 24);
    }

    #[test]
    fn normalize_rejects_garbage() {
        assert!(matches!(
            normalize_cidr("not-a-cidr"),
            Err(IpamError::InvalidCidr { .. })
        ));
        assert!(normalize_cidr("10.0.0.0/33").is_err());
    }

    #[test]
    fn free_blocks_without_children_is_whole_prefix() {
        let free = free_blocks(net("10.0.0.0/16"), &[]);
        assert_eq!(free, vec![net("10.0.0.0/16")]);
    }

    #[test]
    fn free_blocks_removes_child() {
        let free = free_blocks(net("10.0.0.0/24"), &[net("10.0.0.0/26")]);
        assert_eq!(free, vec![net("10.0.0.64/26"), net("10.0.0.128/25")]);
    }

    #[test]
    fn free_blocks_merges_after_holes() {
        let free = free_blocks(
            net("10.0.0.0/24"),
            &[net("10.0.0.0/26"), net("10.0.0.128/26")],
        );
        assert_eq!(free, vec![net("10.0.0.64/26"), net("10.0.0.192/26")]);
    }

    #[test]
    fn fully_consumed_prefix_has_no_free_space() {
        let free = free_blocks(
            net("10.0.0.0/24"),
            &[net("10.0.0.0/25"), net("10.0.0.128/25")],
        );
        assert!(free.is_empty());
    }

    #[test]
    fn usage_of_empty_ipv4_prefix() {
        let p = Prefix::new(net("192.168.0.0/24"), "root", None);
        let usage = p.usage().unwrap();
        assert_eq!(usage.acquired_prefixes, 0);
        assert_eq!(usage.acquired_ips, 0);
        // 256 addresses minus network and broadcast
        assert_eq!(usage.available_ips, 254);
        // 64 blocks of /30
        assert_eq!(usage.available_smallest_prefixes, 64);
        assert_eq!(usage.available_prefixes, vec!["192.168.0.0/24".to_string()]);
    }

    #[test]
    fn usage_with_children() {
        let mut p = Prefix::new(net("192.168.0.0/24"), "root", None);
        p.child_prefixes.insert("192.168.0.0/25".to_string());
        let usage = p.usage().unwrap();
        assert_eq!(usage.acquired_prefixes, 1);
        assert_eq!(usage.available_ips, 0);
        assert_eq!(usage.available_smallest_prefixes, 32);
        assert_eq!(usage.available_prefixes, vec!["192.168.0.128/25".to_string()]);
    }

    #[test]
    fn usage_saturates_on_large_ipv6() {
        let p = Prefix::new(net("2001:db8::/32"), "root", None);
        let usage = p.usage().unwrap();
        assert_eq!(usage.available_ips, u64::MAX - 1);
        assert_eq!(usage.available_smallest_prefixes, u64::MAX);
    }

    #[test]
    fn reserved_addresses_by_family() {
        assert_eq!(reserved_addresses(&net("10.0.0.0/30")).len(), 2);
        assert!(reserved_addresses(&net("10.0.0.0/31")).is_empty());
        assert_eq!(reserved_addresses(&net("fd00::/64")).len(), 1);
    }
}
