//! Namespace-scoped allocation operations.

use std::net::IpAddr;

use ipnet::IpNet;
use tracing::{debug, warn};

use crate::error::{IpamError, IpamResult};
use crate::prefix::{Prefix, normalize_cidr, overlaps, reserved_addresses};
use crate::storage::Storage;

/// Namespace used when none is set.
pub const DEFAULT_NAMESPACE: &str = "root";

/// Attempts per mutating operation before an optimistic lock failure is
/// returned to the caller.
const MAX_ATTEMPTS: usize = 3;

/// Allocator view over a [`Storage`] backend, scoped to one namespace.
///
/// Prefixes in different namespaces never collide, so identical CIDRs can be
/// managed independently for different scopes.
pub struct Ipamer<'a, S: Storage + ?Sized> {
    storage: &'a S,
    namespace: String,
}

impl<'a, S: Storage + ?Sized> Ipamer<'a, S> {
    pub fn new(storage: &'a S) -> Self {
        Self {
            storage,
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }

    /// Scope this allocator to `namespace`.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    // ── Root prefixes ──────────────────────────────────────────────

    /// Create a root prefix. Fails if it overlaps any prefix in the namespace.
    pub fn new_prefix(&self, cidr: &str) -> IpamResult<Prefix> {
        let (net, canonical) = normalize_cidr(cidr)?;

        for existing in self.storage.read_all_prefix_cidrs(&self.namespace)? {
            let (other, _) = normalize_cidr(&existing)?;
            if overlaps(&net, &other) {
                return Err(IpamError::Overlap {
                    cidr: canonical,
                    existing,
                });
            }
        }

        let prefix = self
            .storage
            .create_prefix(&Prefix::new(net, &self.namespace, None))?;
        debug!(namespace = %self.namespace, cidr = %prefix.cidr, "prefix created");
        Ok(prefix)
    }

    /// Look up a prefix by CIDR. The CIDR is masked before the lookup.
    pub fn prefix_from(&self, cidr: &str) -> IpamResult<Option<Prefix>> {
        let (_, canonical) = normalize_cidr(cidr)?;
        self.storage.read_prefix(&self.namespace, &canonical)
    }

    /// Delete a root prefix. Returns the deleted record.
    pub fn delete_prefix(&self, cidr: &str) -> IpamResult<Prefix> {
        let prefix = self.require(cidr)?;
        if prefix.has_child_prefixes() {
            return Err(IpamError::HasChildPrefixes { cidr: prefix.cidr });
        }
        if prefix.has_ips() {
            return Err(IpamError::HasIps { cidr: prefix.cidr });
        }
        if let Some(parent) = prefix.parent_cidr {
            return Err(IpamError::IsChildPrefix {
                cidr: prefix.cidr,
                parent,
            });
        }

        self.storage.delete_prefix(&self.namespace, &prefix.cidr)?;
        debug!(namespace = %self.namespace, cidr = %prefix.cidr, "prefix deleted");
        Ok(prefix)
    }

    // ── Child prefixes ─────────────────────────────────────────────

    /// Acquire the lowest free block of `length` bits from `parent_cidr`.
    pub fn acquire_child_prefix(&self, parent_cidr: &str, length: u8) -> IpamResult<Prefix> {
        self.retry(|| {
            let parent = self.require(parent_cidr)?;
            let net = parent.network()?;
            // A shorter length than the parent's never fits and is reported
            // as lack of space.
            if length == net.prefix_len() || length > net.max_prefix_len() {
                return Err(IpamError::InvalidLength {
                    length,
                    parent_length: net.prefix_len(),
                    max_length: net.max_prefix_len(),
                });
            }
            if parent.has_ips() {
                return Err(IpamError::HasIps { cidr: parent.cidr });
            }

            let child = parent
                .free_blocks()?
                .into_iter()
                .filter(|block| block.prefix_len() <= length)
                .find_map(|block| block.subnets(length).ok().and_then(|mut s| s.next()))
                .ok_or_else(|| IpamError::NoPrefixAvailable {
                    cidr: parent.cidr.clone(),
                    length,
                })?;

            self.attach_child(parent, child)
        })
    }

    /// Acquire a caller-chosen block from `parent_cidr`. The block must be free.
    pub fn acquire_specific_child_prefix(
        &self,
        parent_cidr: &str,
        child_cidr: &str,
    ) -> IpamResult<Prefix> {
        let (child, canonical) = normalize_cidr(child_cidr)?;
        self.retry(|| {
            let parent = self.require(parent_cidr)?;
            let net = parent.network()?;
            if !net.contains(&child) || child.prefix_len() == net.prefix_len() {
                return Err(IpamError::PrefixNotAvailable {
                    cidr: parent.cidr,
                    child: canonical.clone(),
                });
            }
            if parent.has_ips() {
                return Err(IpamError::HasIps { cidr: parent.cidr });
            }
            let free = parent.free_blocks()?;
            if !free.iter().any(|block| block.contains(&child)) {
                return Err(IpamError::PrefixNotAvailable {
                    cidr: parent.cidr,
                    child: canonical.clone(),
                });
            }

            self.attach_child(parent, child)
        })
    }

    /// Release a child prefix back into its parent.
    pub fn release_child_prefix(&self, child: &Prefix) -> IpamResult<()> {
        self.retry(|| {
            let child = self.require(&child.cidr)?;
            if child.has_ips() {
                return Err(IpamError::HasIps { cidr: child.cidr });
            }
            if child.has_child_prefixes() {
                return Err(IpamError::HasChildPrefixes { cidr: child.cidr });
            }
            let Some(parent_cidr) = child.parent_cidr.as_deref() else {
                return Err(IpamError::NotChildPrefix { cidr: child.cidr });
            };

            let mut parent = self.require(parent_cidr)?;
            parent.child_prefixes.remove(&child.cidr);
            self.storage.update_prefix(&parent)?;
            self.storage.delete_prefix(&self.namespace, &child.cidr)?;

            debug!(
                namespace = %self.namespace,
                parent = %parent.cidr,
                child = %child.cidr,
                "child prefix released"
            );
            Ok(())
        })
    }

    fn attach_child(&self, mut parent: Prefix, child: IpNet) -> IpamResult<Prefix> {
        let child_cidr = child.to_string();
        parent.child_prefixes.insert(child_cidr.clone());
        let mut parent = self.storage.update_prefix(&parent)?;

        let record = Prefix::new(child, &self.namespace, Some(parent.cidr.clone()));
        match self.storage.create_prefix(&record) {
            Ok(created) => {
                debug!(
                    namespace = %self.namespace,
                    parent = %parent.cidr,
                    child = %created.cidr,
                    "child prefix acquired"
                );
                Ok(created)
            }
            Err(e) => {
                parent.child_prefixes.remove(&child_cidr);
                if let Err(revert) = self.storage.update_prefix(&parent) {
                    warn!(
                        parent = %parent.cidr,
                        child = %child_cidr,
                        error = %revert,
                        "failed to revert parent after child create failure"
                    );
                }
                Err(e)
            }
        }
    }

    // ── Host addresses ─────────────────────────────────────────────

    /// Acquire the lowest free host address of a prefix.
    pub fn acquire_ip(&self, prefix_cidr: &str) -> IpamResult<IpAddr> {
        self.retry(|| {
            let mut prefix = self.assignable(prefix_cidr)?;
            let net = prefix.network()?;
            let reserved = reserved_addresses(&net);

            let ip = net
                .hosts()
                .find(|ip| !reserved.contains(ip) && !prefix.ips.contains(ip))
                .ok_or_else(|| IpamError::NoIpAvailable {
                    cidr: prefix.cidr.clone(),
                })?;

            prefix.ips.insert(ip);
            self.storage.update_prefix(&prefix)?;
            debug!(namespace = %self.namespace, cidr = %prefix.cidr, %ip, "ip acquired");
            Ok(ip)
        })
    }

    /// Acquire a caller-chosen host address.
    pub fn acquire_specific_ip(&self, prefix_cidr: &str, ip: IpAddr) -> IpamResult<IpAddr> {
        self.retry(|| {
            let mut prefix = self.assignable(prefix_cidr)?;
            let net = prefix.network()?;
            if !net.contains(&ip) {
                return Err(IpamError::IpOutOfRange {
                    cidr: prefix.cidr,
                    ip,
                });
            }
            if reserved_addresses(&net).contains(&ip) || !prefix.ips.insert(ip) {
                return Err(IpamError::IpAlreadyAllocated {
                    cidr: prefix.cidr,
                    ip,
                });
            }

            self.storage.update_prefix(&prefix)?;
            debug!(namespace = %self.namespace, cidr = %prefix.cidr, %ip, "ip acquired");
            Ok(ip)
        })
    }

    /// Return a host address to its prefix.
    pub fn release_ip_from_prefix(&self, prefix_cidr: &str, ip: IpAddr) -> IpamResult<()> {
        self.retry(|| {
            let mut prefix = self.require(prefix_cidr)?;
            if !prefix.ips.remove(&ip) {
                return Err(IpamError::IpNotAllocated {
                    cidr: prefix.cidr,
                    ip,
                });
            }
            self.storage.update_prefix(&prefix)?;
            debug!(namespace = %self.namespace, cidr = %prefix.cidr, %ip, "ip released");
            Ok(())
        })
    }

    // ── Helpers ────────────────────────────────────────────────────

    fn require(&self, cidr: &str) -> IpamResult<Prefix> {
        self.prefix_from(cidr)?.ok_or_else(|| IpamError::NotFound {
            cidr: cidr.to_string(),
            namespace: self.namespace.clone(),
        })
    }

    fn assignable(&self, cidr: &str) -> IpamResult<Prefix> {
        let prefix = self.require(cidr)?;
        if prefix.has_child_prefixes() {
            return Err(IpamError::HasChildPrefixes { cidr: prefix.cidr });
        }
        Ok(prefix)
    }

    /// Re-run `op` when a concurrent writer moved a prefix version underneath it.
    fn retry<T>(&self, op: impl Fn() -> IpamResult<T>) -> IpamResult<T> {
        let mut attempt = 1;
        loop {
            match op() {
                Err(IpamError::OptimisticLock { cidr, version }) if attempt < MAX_ATTEMPTS => {
                    debug!(%cidr, version, attempt, "optimistic lock conflict, retrying");
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn new_prefix_masks_host_bits() {
        let storage = MemoryStorage::new();
        let ipam = Ipamer::new(&storage);
        let p = ipam.new_prefix("10.1.2.3/16").unwrap();
        assert_eq!(p.cidr, "10.1.0.0/16");
        assert_eq!(p.namespace, DEFAULT_NAMESPACE);
        assert!(ipam.prefix_from("10.1.0.0/16").unwrap().is_some());
    }

    #[test]
    fn overlapping_prefix_is_rejected_within_namespace() {
        let storage = MemoryStorage::new();
        let ipam = Ipamer::new(&storage).with_namespace("ipv4/provider/site");
        ipam.new_prefix("10.0.0.0/16").unwrap();

        let err = ipam.new_prefix("10.0.1.0/24").unwrap_err();
        assert!(matches!(err, IpamError::Overlap { .. }));
        let err = ipam.new_prefix("10.0.0.0/8").unwrap_err();
        assert!(matches!(err, IpamError::Overlap { .. }));
    }

    #[test]
    fn identical_prefix_in_other_namespace_is_allowed() {
        let storage = MemoryStorage::new();
        Ipamer::new(&storage)
            .with_namespace("a")
            .new_prefix("10.0.0.0/16")
            .unwrap();
        Ipamer::new(&storage)
            .with_namespace("b")
            .new_prefix("10.0.0.0/16")
            .unwrap();
    }

    #[test]
    fn acquire_child_prefix_takes_lowest_free_block() {
        let storage = MemoryStorage::new();
        let ipam = Ipamer::new(&storage);
        ipam.new_prefix("10.0.0.0/24").unwrap();

        let a = ipam.acquire_child_prefix("10.0.0.0/24", 26).unwrap();
        let b = ipam.acquire_child_prefix("10.0.0.0/24", 25).unwrap();
        let c = ipam.acquire_child_prefix("10.0.0.0/24", 26).unwrap();
        assert_eq!(a.cidr, "10.0.0.0/26");
        assert_eq!(b.cidr, "10.0.0.128/25");
        assert_eq!(c.cidr, "10.0.0.64/26");
        assert_eq!(a.parent_cidr.as_deref(), Some("10.0.0.0/24"));

        let err = ipam.acquire_child_prefix("10.0.0.0/24", 30).unwrap_err();
        assert!(matches!(err, IpamError::NoPrefixAvailable { .. }));

        let parent = ipam.prefix_from("10.0.0.0/24").unwrap().unwrap();
        assert_eq!(parent.usage().unwrap().acquired_prefixes, 3);
    }

    #[test]
    fn larger_child_than_parent_has_no_space() {
        let storage = MemoryStorage::new();
        let ipam = Ipamer::new(&storage);
        ipam.new_prefix("192.169.1.0/28").unwrap();

        let err = ipam.acquire_child_prefix("192.169.1.0/28", 24).unwrap_err();
        assert!(matches!(err, IpamError::NoPrefixAvailable { .. }));
    }

    #[test]
    fn invalid_child_length_is_rejected() {
        let storage = MemoryStorage::new();
        let ipam = Ipamer::new(&storage);
        ipam.new_prefix("10.0.0.0/24").unwrap();

        for length in [24, 33] {
            let err = ipam.acquire_child_prefix("10.0.0.0/24", length).unwrap_err();
            assert!(matches!(err, IpamError::InvalidLength { .. }));
        }
    }

    #[test]
    fn specific_child_must_be_free() {
        let storage = MemoryStorage::new();
        let ipam = Ipamer::new(&storage);
        ipam.new_prefix("10.0.0.0/24").unwrap();

        let child = ipam
            .acquire_specific_child_prefix("10.0.0.0/24", "10.0.0.64/26")
            .unwrap();
        assert_eq!(child.cidr, "10.0.0.64/26");

        let err = ipam
            .acquire_specific_child_prefix("10.0.0.0/24", "10.0.0.64/27")
            .unwrap_err();
        assert!(matches!(err, IpamError::PrefixNotAvailable { .. }));
        let err = ipam
            .acquire_specific_child_prefix("10.0.0.0/24", "10.0.1.0/26")
            .unwrap_err();
        assert!(matches!(err, IpamError::PrefixNotAvailable { .. }));
    }

    #[test]
    fn release_child_frees_space() {
        let storage = MemoryStorage::new();
        let ipam = Ipamer::new(&storage);
        ipam.new_prefix("10.0.0.0/24").unwrap();
        let child = ipam.acquire_child_prefix("10.0.0.0/24", 25).unwrap();

        ipam.release_child_prefix(&child).unwrap();

        assert!(ipam.prefix_from("10.0.0.0/25").unwrap().is_none());
        let parent = ipam.prefix_from("10.0.0.0/24").unwrap().unwrap();
        assert!(!parent.has_child_prefixes());
        ipam.delete_prefix("10.0.0.0/24").unwrap();
    }

    #[test]
    fn release_child_with_ips_is_refused() {
        let storage = MemoryStorage::new();
        let ipam = Ipamer::new(&storage);
        ipam.new_prefix("10.0.0.0/24").unwrap();
        let child = ipam.acquire_child_prefix("10.0.0.0/24", 28).unwrap();
        ipam.acquire_ip(&child.cidr).unwrap();

        let err = ipam.release_child_prefix(&child).unwrap_err();
        assert!(matches!(err, IpamError::HasIps { .. }));
    }

    #[test]
    fn delete_prefix_guards() {
        let storage = MemoryStorage::new();
        let ipam = Ipamer::new(&storage);

        let err = ipam.delete_prefix("10.0.0.0/24").unwrap_err();
        assert!(err.is_not_found());

        ipam.new_prefix("10.0.0.0/24").unwrap();
        let child = ipam.acquire_child_prefix("10.0.0.0/24", 26).unwrap();
        assert!(matches!(
            ipam.delete_prefix("10.0.0.0/24").unwrap_err(),
            IpamError::HasChildPrefixes { .. }
        ));
        assert!(matches!(
            ipam.delete_prefix(&child.cidr).unwrap_err(),
            IpamError::IsChildPrefix { .. }
        ));
    }

    #[test]
    fn acquire_ip_skips_reserved_addresses() {
        let storage = MemoryStorage::new();
        let ipam = Ipamer::new(&storage);
        ipam.new_prefix("10.0.0.0/30").unwrap();

        assert_eq!(ipam.acquire_ip("10.0.0.0/30").unwrap(), ip("10.0.0.1"));
        assert_eq!(ipam.acquire_ip("10.0.0.0/30").unwrap(), ip("10.0.0.2"));
        let err = ipam.acquire_ip("10.0.0.0/30").unwrap_err();
        assert!(matches!(err, IpamError::NoIpAvailable { .. }));

        ipam.release_ip_from_prefix("10.0.0.0/30", ip("10.0.0.1"))
            .unwrap();
        assert_eq!(ipam.acquire_ip("10.0.0.0/30").unwrap(), ip("10.0.0.1"));
    }

    #[test]
    fn specific_ip_rules() {
        let storage = MemoryStorage::new();
        let ipam = Ipamer::new(&storage);
        ipam.new_prefix("10.0.0.0/24").unwrap();

        ipam.acquire_specific_ip("10.0.0.0/24", ip("10.0.0.10"))
            .unwrap();
        assert!(matches!(
            ipam.acquire_specific_ip("10.0.0.0/24", ip("10.0.0.10"))
                .unwrap_err(),
            IpamError::IpAlreadyAllocated { .. }
        ));
        assert!(matches!(
            ipam.acquire_specific_ip("10.0.0.0/24", ip("10.0.0.255"))
                .unwrap_err(),
            IpamError::IpAlreadyAllocated { .. }
        ));
        assert!(matches!(
            ipam.acquire_specific_ip("10.0.0.0/24", ip("10.0.1.1"))
                .unwrap_err(),
            IpamError::IpOutOfRange { .. }
        ));
        assert!(matches!(
            ipam.release_ip_from_prefix("10.0.0.0/24", ip("10.0.0.11"))
                .unwrap_err(),
            IpamError::IpNotAllocated { .. }
        ));

        let usage = ipam.prefix_from("10.0.0.0/24").unwrap().unwrap().usage().unwrap();
        assert_eq!(usage.acquired_ips, 1);
        assert_eq!(usage.available_ips, 253);
    }

    #[test]
    fn ips_and_children_are_exclusive() {
        let storage = MemoryStorage::new();
        let ipam = Ipamer::new(&storage);
        ipam.new_prefix("10.0.0.0/24").unwrap();
        ipam.new_prefix("10.0.1.0/24").unwrap();

        ipam.acquire_child_prefix("10.0.0.0/24", 26).unwrap();
        assert!(matches!(
            ipam.acquire_ip("10.0.0.0/24").unwrap_err(),
            IpamError::HasChildPrefixes { .. }
        ));

        ipam.acquire_ip("10.0.1.0/24").unwrap();
        assert!(matches!(
            ipam.acquire_child_prefix("10.0.1.0/24", 26).unwrap_err(),
            IpamError::HasIps { .. }
        ));
    }

    #[test]
    fn ipv6_host_allocation() {
        let storage = MemoryStorage::new();
        let ipam = Ipamer::new(&storage);
        ipam.new_prefix("fd00::/64").unwrap();
        assert_eq!(ipam.acquire_ip("fd00::/64").unwrap(), ip("fd00::1"));
    }
}
