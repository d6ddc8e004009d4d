//! Error types for the IPAM allocator.

use std::net::IpAddr;

use thiserror::Error;

/// Result type alias for IPAM operations.
pub type IpamResult<T> = Result<T, IpamError>;

/// Errors that can occur while allocating or releasing address space.
#[derive(Debug, Error)]
pub enum IpamError {
    #[error("invalid cidr {cidr}: {reason}")]
    InvalidCidr { cidr: String, reason: String },

    #[error("{cidr} overlaps {existing}")]
    Overlap { cidr: String, existing: String },

    #[error("prefix {cidr} not found in namespace {namespace}")]
    NotFound { cidr: String, namespace: String },

    #[error("given length {length} must be greater than prefix length {parent_length} and at most {max_length}")]
    InvalidLength {
        length: u8,
        parent_length: u8,
        max_length: u8,
    },

    #[error("no prefix found in {cidr} with length {length}")]
    NoPrefixAvailable { cidr: String, length: u8 },

    #[error("{child} is not available in {cidr}")]
    PrefixNotAvailable { cidr: String, child: String },

    #[error("no ip available in {cidr}")]
    NoIpAvailable { cidr: String },

    #[error("{ip} is not part of {cidr}")]
    IpOutOfRange { cidr: String, ip: IpAddr },

    #[error("{ip} is already allocated in {cidr}")]
    IpAlreadyAllocated { cidr: String, ip: IpAddr },

    #[error("{ip} is not allocated in {cidr}")]
    IpNotAllocated { cidr: String, ip: IpAddr },

    #[error("prefix {cidr} has child prefixes")]
    HasChildPrefixes { cidr: String },

    #[error("prefix {cidr} has acquired ips")]
    HasIps { cidr: String },

    #[error("prefix {cidr} is a child of {parent}, release it through the parent")]
    IsChildPrefix { cidr: String, parent: String },

    #[error("prefix {cidr} was not acquired from a parent")]
    NotChildPrefix { cidr: String },

    #[error("optimistic lock failure updating {cidr}: stored version moved past {version}")]
    OptimisticLock { cidr: String, version: u64 },

    #[error("storage error: {0}")]
    Storage(String),
}

impl IpamError {
    /// True when the error reports a missing prefix.
    pub fn is_not_found(&self) -> bool {
        matches!(self, IpamError::NotFound { .. })
    }
}
