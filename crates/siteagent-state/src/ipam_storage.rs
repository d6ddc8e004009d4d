//! Persistent allocator storage over the `ipam_prefixes` table.

use redb::{ReadableDatabase, ReadableTable};
use siteagent_ipam::{IpamError, IpamResult, Prefix, Storage};
use tracing::debug;

use crate::store::{StateStore, map_err};
use crate::tables::{IPAM_PREFIXES, prefix_key};

fn decode(bytes: &[u8]) -> IpamResult<Prefix> {
    serde_json::from_slice(bytes).map_err(|e| IpamError::Storage(format!("deserialization error: {e}")))
}

fn encode(prefix: &Prefix) -> IpamResult<Vec<u8>> {
    serde_json::to_vec(prefix).map_err(|e| IpamError::Storage(format!("serialization error: {e}")))
}

impl Storage for StateStore {
    fn name(&self) -> &'static str {
        "redb"
    }

    fn create_prefix(&self, prefix: &Prefix) -> IpamResult<Prefix> {
        let key = prefix_key(&prefix.namespace, &prefix.cidr);
        let value = encode(prefix)?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(IPAM_PREFIXES).map_err(map_err!(Table))?;
            let existing = match table.get(key.as_str()).map_err(map_err!(Read))? {
                Some(guard) => Some(decode(guard.value())?),
                None => None,
            };
            if let Some(existing) = existing {
                return Ok(existing);
            }
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, "ipam prefix stored");
        Ok(prefix.clone())
    }

    fn read_prefix(&self, namespace: &str, cidr: &str) -> IpamResult<Option<Prefix>> {
        let key = prefix_key(namespace, cidr);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(IPAM_PREFIXES).map_err(map_err!(Table))?;
        match table.get(key.as_str()).map_err(map_err!(Read))? {
            Some(guard) => Ok(Some(decode(guard.value())?)),
            None => Ok(None),
        }
    }

    fn read_all_prefix_cidrs(&self, namespace: &str) -> IpamResult<Vec<String>> {
        let scan = prefix_key(namespace, "");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(IPAM_PREFIXES).map_err(map_err!(Table))?;
        let mut cidrs = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, _) = entry.map_err(map_err!(Read))?;
            if let Some(cidr) = key.value().strip_prefix(scan.as_str()) {
                cidrs.push(cidr.to_string());
            }
        }
        Ok(cidrs)
    }

    fn update_prefix(&self, prefix: &Prefix) -> IpamResult<Prefix> {
        let key = prefix_key(&prefix.namespace, &prefix.cidr);
        let mut updated = prefix.clone();
        updated.version += 1;
        let value = encode(&updated)?;

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(IPAM_PREFIXES).map_err(map_err!(Table))?;
            let stored_version = match table.get(key.as_str()).map_err(map_err!(Read))? {
                Some(guard) => decode(guard.value())?.version,
                None => {
                    return Err(IpamError::NotFound {
                        cidr: prefix.cidr.clone(),
                        namespace: prefix.namespace.clone(),
                    });
                }
            };
            if stored_version != prefix.version {
                return Err(IpamError::OptimisticLock {
                    cidr: prefix.cidr.clone(),
                    version: prefix.version,
                });
            }
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, version = updated.version, "ipam prefix updated");
        Ok(updated)
    }

    fn delete_prefix(&self, namespace: &str, cidr: &str) -> IpamResult<bool> {
        let key = prefix_key(namespace, cidr);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(IPAM_PREFIXES).map_err(map_err!(Table))?;
            existed = table.remove(key.as_str()).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, existed, "ipam prefix deleted");
        Ok(existed)
    }

    fn delete_all_prefixes(&self, namespace: &str) -> IpamResult<usize> {
        let scan = prefix_key(namespace, "");
        let keys: Vec<String> = {
            let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
            let table = txn.open_table(IPAM_PREFIXES).map_err(map_err!(Table))?;
            let mut keys = Vec::new();
            for entry in table.iter().map_err(map_err!(Read))? {
                let (key, _) = entry.map_err(map_err!(Read))?;
                if key.value().starts_with(scan.as_str()) {
                    keys.push(key.value().to_string());
                }
            }
            keys
        };

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(IPAM_PREFIXES).map_err(map_err!(Table))?;
            for key in &keys {
                table.remove(key.as_str()).map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%namespace, count = keys.len(), "ipam namespace cleared");
        Ok(keys.len())
    }
}

#[cfg(test)]
mod tests {
    use siteagent_ipam::Ipamer;

    use super::*;

    #[test]
    fn allocator_runs_on_redb() {
        let store = StateStore::open_in_memory().unwrap();
        let ipam = Ipamer::new(&store).with_namespace("Public/p/s");

        ipam.new_prefix("10.0.0.0/16").unwrap();
        let child = ipam.acquire_child_prefix("10.0.0.0/16", 24).unwrap();
        assert_eq!(child.cidr, "10.0.0.0/24");

        let parent = ipam.prefix_from("10.0.0.0/16").unwrap().unwrap();
        assert_eq!(parent.version, 1);
        assert_eq!(parent.usage().unwrap().acquired_prefixes, 1);
        assert_eq!(
            store.read_all_prefix_cidrs("Public/p/s").unwrap(),
            vec!["10.0.0.0/16".to_string(), "10.0.0.0/24".to_string()]
        );
    }

    #[test]
    fn stale_version_is_rejected() {
        let store = StateStore::open_in_memory().unwrap();
        let ipam = Ipamer::new(&store);
        let prefix = ipam.new_prefix("10.0.0.0/24").unwrap();

        store.update_prefix(&prefix).unwrap();
        let err = store.update_prefix(&prefix).unwrap_err();
        assert!(matches!(err, IpamError::OptimisticLock { .. }));
    }

    #[test]
    fn namespace_scan_does_not_leak_into_longer_namespaces() {
        let store = StateStore::open_in_memory().unwrap();
        Ipamer::new(&store).with_namespace("a").new_prefix("10.0.0.0/8").unwrap();
        Ipamer::new(&store).with_namespace("ab").new_prefix("10.0.0.0/8").unwrap();

        assert_eq!(store.read_all_prefix_cidrs("a").unwrap().len(), 1);
        assert_eq!(store.delete_all_prefixes("a").unwrap(), 1);
        assert_eq!(store.read_all_prefix_cidrs("ab").unwrap().len(), 1);
    }

    #[test]
    fn prefixes_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("ipam.redb");
        {
            let store = StateStore::open(&db_path).unwrap();
            Ipamer::new(&store).new_prefix("192.168.0.0/16").unwrap();
        }
        let store = StateStore::open(&db_path).unwrap();
        assert!(Ipamer::new(&store).prefix_from("192.168.0.0/16").unwrap().is_some());
    }
}
