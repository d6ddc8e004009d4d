//! Storage backends for the allocator.
//!
//! The allocator keeps no state of its own; every prefix lives in a
//! [`Storage`] implementation keyed by `(namespace, cidr)`.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::{IpamError, IpamResult};
use crate::prefix::Prefix;

/// Persistence interface for prefix records.
pub trait Storage: Send + Sync {
    /// Short backend name, for logs.
    fn name(&self) -> &'static str;

    /// Insert a prefix. If one already exists under the same key, the
    /// stored record is returned unchanged.
    fn create_prefix(&self, prefix: &Prefix) -> IpamResult<Prefix>;

    /// Read a prefix by namespace and canonical CIDR.
    fn read_prefix(&self, namespace: &str, cidr: &str) -> IpamResult<Option<Prefix>>;

    /// All CIDRs stored in a namespace.
    fn read_all_prefix_cidrs(&self, namespace: &str) -> IpamResult<Vec<String>>;

    /// Write a prefix if the stored version still equals `prefix.version`.
    /// Returns the record as written, with its version incremented.
    fn update_prefix(&self, prefix: &Prefix) -> IpamResult<Prefix>;

    /// Delete a prefix. Returns true if it existed.
    fn delete_prefix(&self, namespace: &str, cidr: &str) -> IpamResult<bool>;

    /// Delete every prefix in a namespace. Returns the number removed.
    fn delete_all_prefixes(&self, namespace: &str) -> IpamResult<usize>;
}

/// Process-local storage, shared between clones.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    prefixes: Arc<RwLock<HashMap<(String, String), Prefix>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<E>(_: E) -> IpamError {
    IpamError::Storage("memory storage lock poisoned".to_string())
}

impl Storage for MemoryStorage {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn create_prefix(&self, prefix: &Prefix) -> IpamResult<Prefix> {
        let mut map = self.prefixes.write().map_err(poisoned)?;
        let key = (prefix.namespace.clone(), prefix.cidr.clone());
        let stored = map.entry(key).or_insert_with(|| prefix.clone());
        Ok(stored.clone())
    }

    fn read_prefix(&self, namespace: &str, cidr: &str) -> IpamResult<Option<Prefix>> {
        let map = self.prefixes.read().map_err(poisoned)?;
        Ok(map
            .get(&(namespace.to_string(), cidr.to_string()))
            .cloned())
    }

    fn read_all_prefix_cidrs(&self, namespace: &str) -> IpamResult<Vec<String>> {
        let map = self.prefixes.read().map_err(poisoned)?;
        let mut cidrs: Vec<String> = map
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, cidr)| cidr.clone())
            .collect();
        cidrs.sort();
        Ok(cidrs)
    }

    fn update_prefix(&self, prefix: &Prefix) -> IpamResult<Prefix> {
        let mut map = self.prefixes.write().map_err(poisoned)?;
        let key = (prefix.namespace.clone(), prefix.cidr.clone());
        let stored = map.get_mut(&key).ok_or_else(|| IpamError::NotFound {
            cidr: prefix.cidr.clone(),
            namespace: prefix.namespace.clone(),
        })?;
        if stored.version != prefix.version {
            return Err(IpamError::OptimisticLock {
                cidr: prefix.cidr.clone(),
                version: prefix.version,
            });
        }
        let mut updated = prefix.clone();
        updated.version += 1;
        *stored = updated.clone();
        Ok(updated)
    }

    fn delete_prefix(&self, namespace: &str, cidr: &str) -> IpamResult<bool> {
        let mut map = self.prefixes.write().map_err(poisoned)?;
        Ok(map
            .remove(&(namespace.to_string(), cidr.to_string()))
            .is_some())
    }

    fn delete_all_prefixes(&self, namespace: &str) -> IpamResult<usize> {
        let mut map = self.prefixes.write().map_err(poisoned)?;
        let before = map.len();
        map.retain(|(ns, _), _| ns != namespace);
        Ok(before - map.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefix(ns: &str, cidr: &str) -> Prefix {
        Prefix::new(cidr.parse().unwrap(), ns, None)
    }

    #[test]
    fn create_is_idempotent() {
        let storage = MemoryStorage::new();
        let mut p = prefix("ns", "10.0.0.0/8");
        storage.create_prefix(&p).unwrap();

        p.child_prefixes.insert("10.0.0.0/16".to_string());
        let stored = storage.create_prefix(&p).unwrap();
        assert!(stored.child_prefixes.is_empty());
    }

    #[test]
    fn update_bumps_version() {
        let storage = MemoryStorage::new();
        let p = storage.create_prefix(&prefix("ns", "10.0.0.0/8")).unwrap();
        let updated = storage.update_prefix(&p).unwrap();
        assert_eq!(updated.version, 1);
        let read = storage.read_prefix("ns", "10.0.0.0/8").unwrap().unwrap();
        assert_eq!(read.version, 1);
    }

    #[test]
    fn stale_update_is_rejected() {
        let storage = MemoryStorage::new();
        let p = storage.create_prefix(&prefix("ns", "10.0.0.0/8")).unwrap();
        storage.update_prefix(&p).unwrap();

        let err = storage.update_prefix(&p).unwrap_err();
        assert!(matches!(err, IpamError::OptimisticLock { .. }));
    }

    #[test]
    fn namespaces_are_isolated() {
        let storage = MemoryStorage::new();
        storage.create_prefix(&prefix("a", "10.0.0.0/8")).unwrap();
        storage.create_prefix(&prefix("b", "10.0.0.0/8")).unwrap();
        storage.create_prefix(&prefix("b", "172.16.0.0/12")).unwrap();

        assert_eq!(storage.read_all_prefix_cidrs("a").unwrap().len(), 1);
        assert_eq!(storage.delete_all_prefixes("b").unwrap(), 2);
        assert!(storage.read_prefix("a", "10.0.0.0/8").unwrap().is_some());
    }
}
