//! StateStore: redb-backed state persistence for the site agent.
//!
//! Provides typed CRUD operations over IP blocks and the workflow outbox.
//! All values are JSON-serialized into redb's `&[u8]` value columns. The
//! store supports both on-disk and in-memory backends (the latter for
//! testing). The IPAM prefix table is exposed through
//! [`siteagent_ipam::Storage`].

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;
use uuid::Uuid;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| $crate::error::StateError::$variant(e.to_string())
    };
}

pub(crate) use map_err;

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    pub(crate) db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(IP_BLOCKS).map_err(map_err!(Table))?;
        txn.open_table(IPAM_PREFIXES).map_err(map_err!(Table))?;
        txn.open_table(WORKFLOW_OUTBOX).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── IP blocks ──────────────────────────────────────────────────

    /// Insert or replace an IP block.
    pub fn put_ip_block(&self, block: &IpBlock) -> StateResult<()> {
        let key = block.table_key();
        let value = serde_json::to_vec(block).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(IP_BLOCKS).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, name = %block.name, "ip block stored");
        Ok(())
    }

    /// Get an IP block by ID.
    pub fn get_ip_block(&self, id: &Uuid) -> StateResult<Option<IpBlock>> {
        let key = id.to_string();
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(IP_BLOCKS).map_err(map_err!(Table))?;
        match table.get(key.as_str()).map_err(map_err!(Read))? {
            Some(guard) => {
                let block: IpBlock =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(block))
            }
            None => Ok(None),
        }
    }

    /// List all IP blocks.
    pub fn list_ip_blocks(&self) -> StateResult<Vec<IpBlock>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(IP_BLOCKS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let block: IpBlock =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(block);
        }
        Ok(results)
    }

    /// Delete an IP block by ID. Returns true if it existed.
    pub fn delete_ip_block(&self, id: &Uuid) -> StateResult<bool> {
        let key = id.to_string();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(IP_BLOCKS).map_err(map_err!(Table))?;
            existed = table.remove(key.as_str()).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, existed, "ip block deleted");
        Ok(existed)
    }

    /// Apply a partial update to an IP block and return the stored result.
    pub fn update_ip_block(&self, input: &IpBlockUpdateInput) -> StateResult<IpBlock> {
        let key = input.id.to_string();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let block = {
            let mut table = txn.open_table(IP_BLOCKS).map_err(map_err!(Table))?;
            let current: Option<IpBlock> = match table.get(key.as_str()).map_err(map_err!(Read))? {
                Some(guard) => {
                    Some(serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?)
                }
                None => None,
            };
            let mut block =
                current.ok_or_else(|| StateError::NotFound(format!("ip block {key}")))?;

            if let Some(name) = &input.name {
                block.name = name.clone();
            }
            if let Some(full_grant) = input.full_grant {
                block.full_grant = full_grant;
            }
            block.updated_at = epoch_secs();

            let value = serde_json::to_vec(&block).map_err(map_err!(Serialize))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
            block
        };
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, full_grant = block.full_grant, "ip block updated");
        Ok(block)
    }

    // ── Workflow outbox ────────────────────────────────────────────

    /// Record a workflow execution. Fails if the workflow ID is already present.
    pub fn insert_outbox_entry(&self, entry: &OutboxEntry) -> StateResult<()> {
        let key = entry.workflow_id.as_str();
        let value = serde_json::to_vec(entry).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(WORKFLOW_OUTBOX).map_err(map_err!(Table))?;
            if table.get(key).map_err(map_err!(Read))?.is_some() {
                return Err(StateError::AlreadyExists(format!("workflow {key}")));
            }
            table
                .insert(key, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(workflow_id = %key, queue = %entry.task_queue, "outbox entry recorded");
        Ok(())
    }

    /// Record a workflow execution, superseding any pending entry with the
    /// same workflow ID. Returns the superseded entry.
    pub fn replace_outbox_entry(&self, entry: &OutboxEntry) -> StateResult<Option<OutboxEntry>> {
        let key = entry.workflow_id.as_str();
        let value = serde_json::to_vec(entry).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let previous = {
            let mut table = txn.open_table(WORKFLOW_OUTBOX).map_err(map_err!(Table))?;
            let previous = table
                .insert(key, value.as_slice())
                .map_err(map_err!(Write))?;
            match previous {
                Some(guard) => Some(
                    serde_json::from_slice::<OutboxEntry>(guard.value())
                        .map_err(map_err!(Deserialize))?,
                ),
                None => None,
            }
        };
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(
            workflow_id = %key,
            queue = %entry.task_queue,
            superseded = previous.is_some(),
            "outbox entry recorded"
        );
        Ok(previous)
    }

    /// Get an outbox entry by workflow ID.
    pub fn get_outbox_entry(&self, workflow_id: &str) -> StateResult<Option<OutboxEntry>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(WORKFLOW_OUTBOX).map_err(map_err!(Table))?;
        match table.get(workflow_id).map_err(map_err!(Read))? {
            Some(guard) => {
                let entry: OutboxEntry =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    /// List outbox entries whose workflow ID starts with `prefix`, in key order.
    pub fn list_outbox_entries(&self, prefix: &str) -> StateResult<Vec<OutboxEntry>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(WORKFLOW_OUTBOX).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(prefix) {
                let entry: OutboxEntry =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(entry);
            }
        }
        Ok(results)
    }

    /// Delete an outbox entry. Returns true if it existed.
    pub fn delete_outbox_entry(&self, workflow_id: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(WORKFLOW_OUTBOX).map_err(map_err!(Table))?;
            existed = table.remove(workflow_id).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%workflow_id, existed, "outbox entry deleted");
        Ok(existed)
    }

    /// Delete every outbox entry whose workflow ID starts with `prefix`.
    /// Returns the number of entries removed.
    pub fn delete_outbox_entries(&self, prefix: &str) -> StateResult<usize> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let removed;
        {
            let mut table = txn.open_table(WORKFLOW_OUTBOX).map_err(map_err!(Table))?;
            let mut keys = Vec::new();
            for entry in table.iter().map_err(map_err!(Read))? {
                let (key, _) = entry.map_err(map_err!(Read))?;
                if key.value().starts_with(prefix) {
                    keys.push(key.value().to_string());
                }
            }
            for key in &keys {
                table.remove(key.as_str()).map_err(map_err!(Write))?;
            }
            removed = keys.len();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%prefix, removed, "outbox entries deleted");
        Ok(removed)
    }
}
