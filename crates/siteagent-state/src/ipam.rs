//! IP block allocation rules over the allocator, including full grants.
//!
//! A full grant delegates an entire IP block to a single consumer without
//! creating a child prefix in the allocator. The grant is recorded only in
//! the block's `full_grant` flag; the allocator sees the parent prefix with
//! no children. The two states are kept mutually exclusive:
//!
//! - a full grant is only set on a parent with no acquired child prefixes;
//! - the full-grant path never acquires a child from the allocator;
//! - a full-grant parent accepts no further child requests until revoked.
//!
//! The flag update and the allocator mutation are separate writes. Callers
//! serialize operations per parent block.

use std::net::IpAddr;

use siteagent_ipam::{IpamError, Ipamer, Prefix, Storage, Usage, normalize_cidr};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{StateError, StateResult};
use crate::store::StateStore;
use crate::types::{IpBlock, IpBlockUpdateInput, RoutingType};

/// Result type alias for IP block allocation.
pub type IpBlockIpamResult<T> = Result<T, IpBlockIpamError>;

#[derive(Debug, Error)]
pub enum IpBlockIpamError {
    #[error("ip block parameter is missing")]
    NilIpBlock,

    #[error("parent ip block {0} already has a full grant")]
    AlreadyFullGrant(Uuid),

    #[error("did not find prefix for ip block {0}")]
    PrefixNotFound(Uuid),

    #[error("parent ip block {0} has allocated prefixes, cannot do a full grant")]
    ParentHasAllocations(Uuid),

    #[error("unable to update full grant of ip block {id}: {source}")]
    FullGrantUpdate {
        id: Uuid,
        #[source]
        source: StateError,
    },

    #[error("parent ip block has a full grant, but child cidr {child} does not match parent cidr {parent}")]
    FullGrantCidrMismatch { child: String, parent: String },

    #[error("prefix {0} does not exist for ip block in ipam storage")]
    ChildPrefixNotFound(String),

    #[error(transparent)]
    Ipam(#[from] IpamError),
}

/// Persists IP block updates.
pub trait IpBlockDao {
    fn update(&self, input: &IpBlockUpdateInput) -> StateResult<IpBlock>;
}

impl IpBlockDao for StateStore {
    fn update(&self, input: &IpBlockUpdateInput) -> StateResult<IpBlock> {
        self.update_ip_block(input)
    }
}

// ── Helpers ────────────────────────────────────────────────────────

/// Allocator namespace for a block: `routingType/providerID/siteID`.
pub fn namespace_for_ip_block(
    routing_type: RoutingType,
    infrastructure_provider_id: &Uuid,
    site_id: &Uuid,
) -> String {
    format!("{routing_type}/{infrastructure_provider_id}/{site_id}")
}

pub fn cidr_for_ip_block(prefix: &str, prefix_length: u8) -> String {
    format!("{prefix}/{prefix_length}")
}

/// Split a CIDR into its masked address and prefix length.
pub fn parse_cidr(cidr: &str) -> Result<(String, u8), IpamError> {
    let (net, _) = normalize_cidr(cidr)?;
    Ok((net.network().to_string(), net.prefix_len()))
}

/// The address following the CIDR's address, used as the gateway.
pub fn first_ip_from_cidr(cidr: &str) -> Result<IpAddr, IpamError> {
    let net = cidr
        .trim()
        .parse::<ipnet::IpNet>()
        .map_err(|e| IpamError::InvalidCidr {
            cidr: cidr.to_string(),
            reason: e.to_string(),
        })?;
    let next = match net.addr() {
        IpAddr::V4(addr) => IpAddr::V4(u32::from(addr).saturating_add(1).into()),
        IpAddr::V6(addr) => IpAddr::V6(u128::from(addr).saturating_add(1).into()),
    };
    Ok(next)
}

impl IpBlock {
    pub fn ipam_namespace(&self) -> String {
        namespace_for_ip_block(self.routing_type, &self.infrastructure_provider_id, &self.site_id)
    }

    pub fn cidr(&self) -> String {
        cidr_for_ip_block(&self.prefix, self.prefix_length)
    }
}

// ── Allocation ─────────────────────────────────────────────────────

/// Allocation operations for IP blocks.
pub struct IpBlockIpam<'a, D: IpBlockDao + ?Sized, S: Storage + ?Sized> {
    dao: &'a D,
    storage: &'a S,
}

impl<'a, D: IpBlockDao + ?Sized, S: Storage + ?Sized> IpBlockIpam<'a, D, S> {
    pub fn new(dao: &'a D, storage: &'a S) -> Self {
        Self { dao, storage }
    }

    fn ipamer(&self, block: &IpBlock) -> Ipamer<'a, S> {
        Ipamer::new(self.storage).with_namespace(block.ipam_namespace())
    }

    /// Register a block's CIDR in its namespace. Fails on overlap.
    pub fn create_namespaced_entry(&self, block: &IpBlock) -> IpBlockIpamResult<Prefix> {
        let prefix = self.ipamer(block).new_prefix(&block.cidr())?;
        debug!(block_id = %block.id, cidr = %prefix.cidr, "ipam entry created");
        Ok(prefix)
    }

    /// Remove a block's CIDR from its namespace. A missing entry is not an error.
    pub fn delete_namespaced_entry(&self, block: &IpBlock) -> IpBlockIpamResult<()> {
        match self.ipamer(block).delete_prefix(&block.cidr()) {
            Ok(_) => {
                debug!(block_id = %block.id, cidr = %block.cidr(), "ipam entry deleted");
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Usage of a block. A full grant always reports a single acquired
    /// prefix and nothing available.
    pub fn usage(&self, block: Option<&IpBlock>) -> IpBlockIpamResult<Usage> {
        let block = block.ok_or(IpBlockIpamError::NilIpBlock)?;
        let prefix = self
            .ipamer(block)
            .prefix_from(&block.cidr())?
            .ok_or(IpBlockIpamError::PrefixNotFound(block.id))?;

        if block.full_grant {
            return Ok(Usage {
                acquired_prefixes: 1,
                ..Usage::default()
            });
        }
        Ok(prefix.usage()?)
    }

    /// Acquire a child of `child_prefix_length` bits from `parent`.
    ///
    /// Requesting the parent's own length is a full grant: the parent must
    /// have no acquired children, its flag is set, and the parent's own
    /// prefix is returned. `parent.full_grant` is updated in place.
    pub fn create_child_entry(
        &self,
        parent: Option<&mut IpBlock>,
        child_prefix_length: u8,
    ) -> IpBlockIpamResult<Prefix> {
        let parent = parent.ok_or(IpBlockIpamError::NilIpBlock)?;
        if parent.full_grant {
            return Err(IpBlockIpamError::AlreadyFullGrant(parent.id));
        }
        let ipamer = self.ipamer(parent);
        let parent_cidr = parent.cidr();

        if child_prefix_length != parent.prefix_length {
            let child = ipamer.acquire_child_prefix(&parent_cidr, child_prefix_length)?;
            debug!(block_id = %parent.id, child = %child.cidr, "child prefix acquired");
            return Ok(child);
        }

        let prefix = ipamer
            .prefix_from(&parent_cidr)?
            .ok_or(IpBlockIpamError::PrefixNotFound(parent.id))?;
        if prefix.usage()?.acquired_prefixes > 0 {
            return Err(IpBlockIpamError::ParentHasAllocations(parent.id));
        }

        self.dao
            .update(&IpBlockUpdateInput::full_grant(parent.id, true))
            .map_err(|source| IpBlockIpamError::FullGrantUpdate {
                id: parent.id,
                source,
            })?;
        parent.full_grant = true;
        info!(block_id = %parent.id, cidr = %prefix.cidr, "full grant set");
        Ok(prefix)
    }

    /// Release `child_cidr` from `parent`.
    ///
    /// On a full-grant parent the only valid child is the parent's own CIDR;
    /// releasing it clears the flag. A mismatch fails without any change.
    pub fn delete_child_entry(
        &self,
        parent: Option<&mut IpBlock>,
        child_cidr: &str,
    ) -> IpBlockIpamResult<()> {
        let parent = parent.ok_or(IpBlockIpamError::NilIpBlock)?;

        if parent.full_grant {
            let parent_cidr = parent.cidr();
            if parent_cidr != child_cidr {
                return Err(IpBlockIpamError::FullGrantCidrMismatch {
                    child: child_cidr.to_string(),
                    parent: parent_cidr,
                });
            }
            self.dao
                .update(&IpBlockUpdateInput::full_grant(parent.id, false))
                .map_err(|source| IpBlockIpamError::FullGrantUpdate {
                    id: parent.id,
                    source,
                })?;
            parent.full_grant = false;
            info!(block_id = %parent.id, cidr = %parent_cidr, "full grant cleared");
            return Ok(());
        }

        let ipamer = self.ipamer(parent);
        let prefix = ipamer
            .prefix_from(child_cidr)?
            .ok_or_else(|| IpBlockIpamError::ChildPrefixNotFound(child_cidr.to_string()))?;
        ipamer.release_child_prefix(&prefix)?;
        debug!(block_id = %parent.id, child = %prefix.cidr, "child prefix released");
        Ok(())
    }
}
