//! Wire messages for the subset of the `forge.Forge` service used by the agent.
//!
//! Field tags follow the site controller's schema. Messages also derive
//! serde so they can be embedded in published inventory pages.

use serde::{Deserialize, Serialize};

// ── VPCs ───────────────────────────────────────────────────────────

#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message, Serialize, Deserialize)]
pub struct VpcId {
    #[prost(string, tag = "1")]
    pub value: String,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
pub struct Vpc {
    #[prost(message, optional, tag = "1")]
    pub id: Option<VpcId>,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(string, tag = "3")]
    pub tenant_organization_id: String,
    #[prost(uint32, optional, tag = "4")]
    pub vni: Option<u32>,
    #[prost(string, optional, tag = "5")]
    pub network_security_group_id: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
pub struct VpcSearchFilter {
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub tenant_org_id: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
pub struct VpcIdList {
    #[prost(message, repeated, tag = "1")]
    pub vpc_ids: Vec<VpcId>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
pub struct VpcsByIdsRequest {
    #[prost(message, repeated, tag = "1")]
    pub vpc_ids: Vec<VpcId>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
pub struct VpcList {
    #[prost(message, repeated, tag = "1")]
    pub vpcs: Vec<Vpc>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
pub struct VpcCreationRequest {
    #[prost(message, optional, tag = "1")]
    pub id: Option<VpcId>,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(string, tag = "3")]
    pub tenant_organization_id: String,
    #[prost(string, optional, tag = "4")]
    pub network_security_group_id: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
pub struct VpcDeletionRequest {
    #[prost(message, optional, tag = "1")]
    pub id: Option<VpcId>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
pub struct VpcDeletionResult {}

// ── Network segments ───────────────────────────────────────────────

#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message, Serialize, Deserialize)]
pub struct NetworkSegmentId {
    #[prost(string, tag = "1")]
    pub value: String,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
pub struct NetworkPrefix {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub prefix: String,
    #[prost(string, optional, tag = "3")]
    pub gateway: Option<String>,
    #[prost(int32, tag = "4")]
    pub reserve_first: i32,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
pub struct NetworkSegment {
    #[prost(message, optional, tag = "1")]
    pub id: Option<NetworkSegmentId>,
    #[prost(message, optional, tag = "2")]
    pub vpc_id: Option<VpcId>,
    #[prost(string, tag = "3")]
    pub name: String,
    #[prost(message, repeated, tag = "4")]
    pub prefixes: Vec<NetworkPrefix>,
    #[prost(int32, optional, tag = "5")]
    pub mtu: Option<i32>,
    #[prost(string, tag = "6")]
    pub state: String,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
pub struct NetworkSegmentSearchFilter {
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub tenant_org_id: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
pub struct NetworkSegmentIdList {
    #[prost(message, repeated, tag = "1")]
    pub network_segments_ids: Vec<NetworkSegmentId>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
pub struct NetworkSegmentsByIdsRequest {
    #[prost(message, repeated, tag = "1")]
    pub network_segments_ids: Vec<NetworkSegmentId>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
pub struct NetworkSegmentList {
    #[prost(message, repeated, tag = "1")]
    pub network_segments: Vec<NetworkSegment>,
}

/// Legacy single-call segment listing; an empty query returns every segment.
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
pub struct NetworkSegmentQuery {
    #[prost(message, optional, tag = "1")]
    pub id: Option<NetworkSegmentId>,
}

// ── Instances ──────────────────────────────────────────────────────

#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message, Serialize, Deserialize)]
pub struct InstanceId {
    #[prost(string, tag = "1")]
    pub value: String,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
pub struct Instance {
    #[prost(message, optional, tag = "1")]
    pub id: Option<InstanceId>,
    #[prost(string, tag = "2")]
    pub machine_id: String,
    #[prost(string, tag = "3")]
    pub tenant_organization_id: String,
    #[prost(string, optional, tag = "4")]
    pub network_security_group_id: Option<String>,
    #[prost(string, tag = "5")]
    pub state: String,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
pub struct InstanceSearchFilter {
    #[prost(string, optional, tag = "1")]
    pub tenant_org_id: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
pub struct InstanceIdList {
    #[prost(message, repeated, tag = "1")]
    pub instance_ids: Vec<InstanceId>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
pub struct InstancesByIdsRequest {
    #[prost(message, repeated, tag = "1")]
    pub instance_ids: Vec<InstanceId>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
pub struct InstanceList {
    #[prost(message, repeated, tag = "1")]
    pub instances: Vec<Instance>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
pub struct InstanceReleaseRequest {
    #[prost(message, optional, tag = "1")]
    pub id: Option<InstanceId>,
    #[prost(string, optional, tag = "2")]
    pub issue: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
pub struct InstanceReleaseResult {}

// ── Network security groups ────────────────────────────────────────

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
pub struct GetNetworkSecurityGroupPropagationStatusRequest {
    #[prost(string, repeated, tag = "1")]
    pub vpc_ids: Vec<String>,
    #[prost(string, repeated, tag = "2")]
    pub instance_ids: Vec<String>,
}

/// Propagation state of security group rules for one VPC or instance.
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
pub struct NetworkSecurityGroupPropagationObjectStatus {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub status: String,
    #[prost(string, optional, tag = "3")]
    pub details: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
pub struct GetNetworkSecurityGroupPropagationStatusResponse {
    #[prost(message, repeated, tag = "1")]
    pub vpcs: Vec<NetworkSecurityGroupPropagationObjectStatus>,
    #[prost(message, repeated, tag = "2")]
    pub instances: Vec<NetworkSecurityGroupPropagationObjectStatus>,
}

// ── Tenant keysets (SSH key groups) ────────────────────────────────

#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message, Serialize, Deserialize)]
pub struct TenantKeysetIdentifier {
    #[prost(string, tag = "1")]
    pub organization_id: String,
    #[prost(string, tag = "2")]
    pub keyset_id: String,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
pub struct TenantPublicKey {
    #[prost(string, tag = "1")]
    pub public_key: String,
    #[prost(string, optional, tag = "2")]
    pub comment: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
pub struct TenantKeysetContent {
    #[prost(message, repeated, tag = "1")]
    pub public_keys: Vec<TenantPublicKey>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
pub struct TenantKeyset {
    #[prost(message, optional, tag = "1")]
    pub keyset_identifier: Option<TenantKeysetIdentifier>,
    #[prost(message, optional, tag = "2")]
    pub keyset_content: Option<TenantKeysetContent>,
    #[prost(string, tag = "3")]
    pub version: String,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
pub struct TenantKeysetSearchFilter {
    #[prost(string, optional, tag = "1")]
    pub tenant_org_id: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
pub struct TenantKeysetIdList {
    #[prost(message, repeated, tag = "1")]
    pub keyset_ids: Vec<TenantKeysetIdentifier>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
pub struct TenantKeysetsByIdsRequest {
    #[prost(message, repeated, tag = "1")]
    pub keyset_ids: Vec<TenantKeysetIdentifier>,
    #[prost(bool, tag = "2")]
    pub include_key_data: bool,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
pub struct TenantKeySetList {
    #[prost(message, repeated, tag = "1")]
    pub keyset: Vec<TenantKeyset>,
}

/// Legacy single-call keyset listing; empty fields match every keyset.
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
pub struct FindTenantKeysetRequest {
    #[prost(string, optional, tag = "1")]
    pub organization_id: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub keyset_id: Option<String>,
    #[prost(bool, tag = "3")]
    pub include_key_data: bool,
}

#[cfg(test)]
mod tests {
    use prost::Message;

    use super::*;

    #[test]
    fn vpc_round_trips_on_the_wire() {
        let vpc = Vpc {
            id: Some(VpcId {
                value: "vpc-1".to_string(),
            }),
            name: "prod".to_string(),
            tenant_organization_id: "org".to_string(),
            vni: Some(4096),
            network_security_group_id: None,
        };
        let bytes = vpc.encode_to_vec();
        assert_eq!(Vpc::decode(bytes.as_slice()).unwrap(), vpc);
    }

    #[test]
    fn empty_message_encodes_to_nothing() {
        assert!(VpcSearchFilter::default().encode_to_vec().is_empty());
    }
}
