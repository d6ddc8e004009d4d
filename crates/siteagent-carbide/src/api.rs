//! The site controller RPCs used by the agent.

use async_trait::async_trait;
use tonic::Status;

use crate::proto::*;

/// One method per `forge.Forge` RPC the agent calls.
///
/// Implemented by [`CarbideClient`](crate::CarbideClient) over gRPC and by
/// in-process fakes in tests.
#[async_trait]
pub trait ForgeApi: Send + Sync {
    // ── VPCs ───────────────────────────────────────────────────────
    async fn find_vpc_ids(&self, filter: VpcSearchFilter) -> Result<VpcIdList, Status>;
    async fn find_vpcs_by_ids(&self, request: VpcsByIdsRequest) -> Result<VpcList, Status>;
    async fn create_vpc(&self, request: VpcCreationRequest) -> Result<Vpc, Status>;
    async fn delete_vpc(&self, request: VpcDeletionRequest) -> Result<VpcDeletionResult, Status>;

    // ── Network segments ───────────────────────────────────────────
    async fn find_network_segment_ids(
        &self,
        filter: NetworkSegmentSearchFilter,
    ) -> Result<NetworkSegmentIdList, Status>;
    async fn find_network_segments_by_ids(
        &self,
        request: NetworkSegmentsByIdsRequest,
    ) -> Result<NetworkSegmentList, Status>;
    /// Legacy listing for controllers without ID enumeration.
    async fn find_network_segments(
        &self,
        query: NetworkSegmentQuery,
    ) -> Result<NetworkSegmentList, Status>;

    // ── Instances ──────────────────────────────────────────────────
    async fn find_instance_ids(&self, filter: InstanceSearchFilter)
    -> Result<InstanceIdList, Status>;
    async fn find_instances_by_ids(
        &self,
        request: InstancesByIdsRequest,
    ) -> Result<InstanceList, Status>;
    async fn release_instance(
        &self,
        request: InstanceReleaseRequest,
    ) -> Result<InstanceReleaseResult, Status>;

    // ── Network security groups ────────────────────────────────────
    async fn get_network_security_group_propagation_status(
        &self,
        request: GetNetworkSecurityGroupPropagationStatusRequest,
    ) -> Result<GetNetworkSecurityGroupPropagationStatusResponse, Status>;

    // ── Tenant keysets ─────────────────────────────────────────────
    async fn find_tenant_keyset_ids(
        &self,
        filter: TenantKeysetSearchFilter,
    ) -> Result<TenantKeysetIdList, Status>;
    async fn find_tenant_keysets_by_ids(
        &self,
        request: TenantKeysetsByIdsRequest,
    ) -> Result<TenantKeySetList, Status>;
    /// Legacy listing for controllers without ID enumeration.
    async fn find_tenant_keyset(
        &self,
        request: FindTenantKeysetRequest,
    ) -> Result<TenantKeySetList, Status>;
}
