//! siteagent-ipam: hierarchical CIDR allocation for the site agent.
//!
//! A flat prefix table partitioned by namespace. Root prefixes are created
//! with [`Ipamer::new_prefix`]; child prefixes are carved out of a parent
//! with [`Ipamer::acquire_child_prefix`] and host addresses are handed out
//! with [`Ipamer::acquire_ip`].
//!
//! # Architecture
//!
//! ```text
//! Ipamer (namespace-scoped view)
//!   ├── new_prefix / delete_prefix        root prefixes, overlap-checked
//!   ├── acquire_child_prefix / release    lowest free aligned block
//!   ├── acquire_ip / release_ip           host addresses
//!   └── Storage (trait)
//!       ├── MemoryStorage                 tests, ephemeral use
//!       └── siteagent-state::StateStore   redb, persistent
//! ```
//!
//! Prefixes carry a `version` and every write goes through
//! [`Storage::update_prefix`], which rejects stale versions.

pub mod error;
pub mod ipamer;
pub mod prefix;
pub mod storage;

pub use error::{IpamError, IpamResult};
pub use ipamer::{DEFAULT_NAMESPACE, Ipamer};
pub use prefix::{Prefix, Usage, normalize_cidr};
pub use storage::{MemoryStorage, Storage};
