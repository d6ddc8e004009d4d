//! Domain types for the site agent state store.
//!
//! These types represent IP blocks and published workflow executions. All
//! types are serializable to/from JSON for storage in redb tables.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── IP blocks ──────────────────────────────────────────────────────

/// How an IP block is reachable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RoutingType {
    Public,
    DatacenterOnly,
}

impl RoutingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingType::Public => "Public",
            RoutingType::DatacenterOnly => "DatacenterOnly",
        }
    }
}

impl fmt::Display for RoutingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoutingType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Public" | "public" => Ok(RoutingType::Public),
            "DatacenterOnly" | "datacenter-only" | "datacenter_only" => {
                Ok(RoutingType::DatacenterOnly)
            }
            other => Err(format!(
                "routing type must be \"Public\" or \"DatacenterOnly\", got {other:?}"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ProtocolVersion {
    #[serde(rename = "IPv4")]
    V4,
    #[serde(rename = "IPv6")]
    V6,
}

/// An address pool owned by an infrastructure provider and assigned to a site.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IpBlock {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub site_id: Uuid,
    pub infrastructure_provider_id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub routing_type: RoutingType,
    /// Masked network address, without the length.
    pub prefix: String,
    pub prefix_length: u8,
    pub protocol_version: ProtocolVersion,
    /// The whole block is delegated to a single consumer.
    pub full_grant: bool,
    /// Unix timestamp (seconds) when this block was created.
    pub created_at: u64,
    /// Unix timestamp (seconds) when this block was last updated.
    pub updated_at: u64,
}

impl IpBlock {
    /// A new block with a random ID and no grant.
    pub fn new(
        name: impl Into<String>,
        site_id: Uuid,
        infrastructure_provider_id: Uuid,
        routing_type: RoutingType,
        prefix: impl Into<String>,
        prefix_length: u8,
    ) -> Self {
        let prefix = prefix.into();
        let protocol_version = if prefix.contains(':') {
            ProtocolVersion::V6
        } else {
            ProtocolVersion::V4
        };
        let now = epoch_secs();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            site_id,
            infrastructure_provider_id,
            tenant_id: None,
            routing_type,
            prefix,
            prefix_length,
            protocol_version,
            full_grant: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Table key for this block.
    pub fn table_key(&self) -> String {
        self.id.to_string()
    }
}

/// Partial update of an IP block. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IpBlockUpdateInput {
    pub id: Uuid,
    pub name: Option<String>,
    pub full_grant: Option<bool>,
}

impl IpBlockUpdateInput {
    pub fn full_grant(id: Uuid, full_grant: bool) -> Self {
        Self {
            id,
            full_grant: Some(full_grant),
            ..Self::default()
        }
    }
}

// ── Workflow outbox ────────────────────────────────────────────────

/// A workflow execution recorded for delivery to the cloud.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutboxEntry {
    /// Key of the entry. At most one pending entry exists per workflow ID.
    pub workflow_id: String,
    /// Distinguishes successive executions that reuse a workflow ID.
    pub run_id: String,
    pub task_queue: String,
    pub workflow_name: String,
    pub site_id: String,
    /// Workflow argument, typically an inventory page.
    pub payload: serde_json::Value,
    /// Unix timestamp (seconds) when this entry was recorded.
    pub created_at: u64,
}

impl OutboxEntry {
    pub fn new(
        workflow_id: impl Into<String>,
        task_queue: impl Into<String>,
        workflow_name: impl Into<String>,
        site_id: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            run_id: Uuid::new_v4().to_string(),
            task_queue: task_queue.into(),
            workflow_name: workflow_name.into(),
            site_id: site_id.into(),
            payload,
            created_at: epoch_secs(),
        }
    }
}

pub(crate) fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routing_type_round_trips_through_json() {
        let json = serde_json::to_string(&RoutingType::DatacenterOnly).unwrap();
        assert_eq!(json, "\"DatacenterOnly\"");
        assert_eq!(
            "datacenter-only".parse::<RoutingType>().unwrap(),
            RoutingType::DatacenterOnly
        );
        assert!("private".parse::<RoutingType>().is_err());
    }

    #[test]
    fn protocol_version_follows_prefix_family() {
        let v4 = IpBlock::new("a", Uuid::new_v4(), Uuid::new_v4(), RoutingType::Public, "10.0.0.0", 8);
        let v6 = IpBlock::new("b", Uuid::new_v4(), Uuid::new_v4(), RoutingType::Public, "fd00::", 48);
        assert_eq!(v4.protocol_version, ProtocolVersion::V4);
        assert_eq!(v6.protocol_version, ProtocolVersion::V6);
        assert!(!v4.full_grant);
    }
}
