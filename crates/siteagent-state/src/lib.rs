//! siteagent-state: embedded state store for the site agent.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! storage for IP blocks, IPAM prefixes, and the workflow outbox.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//!
//! ```text
//! StateStore (Arc<Database>)
//!   ├── ip_blocks         {block_id}            IpBlock
//!   ├── ipam_prefixes     {namespace}|{cidr}    siteagent_ipam::Prefix
//!   └── workflow_outbox   {workflow_id}         OutboxEntry
//!
//! ipam::IpBlockIpam (full-grant rules)
//!   ├── IpBlockDao        ── StateStore::update_ip_block
//!   └── Storage           ── StateStore as siteagent_ipam::Storage
//! ```
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod ipam;
mod ipam_storage;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use ipam::{IpBlockDao, IpBlockIpam, IpBlockIpamError, IpBlockIpamResult};
pub use store::StateStore;
pub use types::*;
