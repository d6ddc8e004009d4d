//! redb table definitions for the site agent state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain types).

use redb::TableDefinition;

/// IP blocks keyed by `{block_id}`.
pub const IP_BLOCKS: TableDefinition<&str, &[u8]> = TableDefinition::new("ip_blocks");

/// Allocator prefixes keyed by `{namespace}|{cidr}`.
pub const IPAM_PREFIXES: TableDefinition<&str, &[u8]> = TableDefinition::new("ipam_prefixes");

/// Published workflow executions keyed by `{workflow_id}`.
pub const WORKFLOW_OUTBOX: TableDefinition<&str, &[u8]> = TableDefinition::new("workflow_outbox");

/// Key for a prefix record. Both namespaces and CIDRs contain `/`, so the
/// separator is `|`.
pub fn prefix_key(namespace: &str, cidr: &str) -> String {
    format!("{namespace}|{cidr}")
}
