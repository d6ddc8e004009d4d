//! gRPC client for the site controller.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tonic::client::Grpc;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, Endpoint};
use tonic::{Request, Status};
use tracing::{debug, info};

use crate::api::ForgeApi;
use crate::proto::*;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid site controller address {address}: {source}")]
    InvalidAddress {
        address: String,
        #[source]
        source: tonic::transport::Error,
    },

    #[error("failed to connect to site controller: {0}")]
    Connect(#[from] tonic::transport::Error),
}

/// Site controller client over a shared tonic channel.
///
/// Cheap to clone; clones share the underlying connection.
#[derive(Clone)]
pub struct CarbideClient {
    grpc: Grpc<Channel>,
    address: String,
}

impl CarbideClient {
    /// Connect eagerly. Fails if the controller is unreachable.
    pub async fn connect(
        address: &str,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, ClientError> {
        let channel = endpoint(address, connect_timeout, request_timeout)?
            .connect()
            .await?;
        info!(%address, "connected to site controller");
        Ok(Self::from_channel(channel, address))
    }

    /// Build a client that connects on first use.
    pub fn connect_lazy(
        address: &str,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, ClientError> {
        let channel = endpoint(address, connect_timeout, request_timeout)?.connect_lazy();
        debug!(%address, "site controller client created");
        Ok(Self::from_channel(channel, address))
    }

    fn from_channel(channel: Channel, address: &str) -> Self {
        Self {
            grpc: Grpc::new(channel),
            address: address.to_string(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    async fn unary<Req, Resp>(&self, path: &'static str, request: Req) -> Result<Resp, Status>
    where
        Req: prost::Message + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        let mut grpc = self.grpc.clone();
        grpc.ready()
            .await
            .map_err(|e| Status::unavailable(format!("site controller not ready: {e}")))?;

        let codec: ProstCodec<Req, Resp> = ProstCodec::default();
        match grpc
            .unary(Request::new(request), PathAndQuery::from_static(path), codec)
            .await
        {
            Ok(response) => Ok(response.into_inner()),
            Err(status) => {
                debug!(
                    method = path,
                    code = ?status.code(),
                    message = status.message(),
                    "site controller call failed"
                );
                Err(status)
            }
        }
    }
}

fn endpoint(
    address: &str,
    connect_timeout: Duration,
    request_timeout: Duration,
) -> Result<Endpoint, ClientError> {
    let endpoint =
        Endpoint::from_shared(address.to_string()).map_err(|source| ClientError::InvalidAddress {
            address: address.to_string(),
            source,
        })?;
    Ok(endpoint
        .connect_timeout(connect_timeout)
        .timeout(request_timeout))
}

#[async_trait]
impl ForgeApi for CarbideClient {
    async fn find_vpc_ids(&self, filter: VpcSearchFilter) -> Result<VpcIdList, Status> {
        self.unary("/forge.Forge/FindVpcIds", filter).await
    }

    async fn find_vpcs_by_ids(&self, request: VpcsByIdsRequest) -> Result<VpcList, Status> {
        self.unary("/forge.Forge/FindVpcsByIds", request).await
    }

    async fn create_vpc(&self, request: VpcCreationRequest) -> Result<Vpc, Status> {
        self.unary("/forge.Forge/CreateVpc", request).await
    }

    async fn delete_vpc(&self, request: VpcDeletionRequest) -> Result<VpcDeletionResult, Status> {
        self.unary("/forge.Forge/DeleteVpc", request).await
    }

    async fn find_network_segment_ids(
        &self,
        filter: NetworkSegmentSearchFilter,
    ) -> Result<NetworkSegmentIdList, Status> {
        self.unary("/forge.Forge/FindNetworkSegmentIds", filter).await
    }

    async fn find_network_segments_by_ids(
        &self,
        request: NetworkSegmentsByIdsRequest,
    ) -> Result<NetworkSegmentList, Status> {
        self.unary("/forge.Forge/FindNetworkSegmentsByIds", request)
            .await
    }

    async fn find_network_segments(
        &self,
        query: NetworkSegmentQuery,
    ) -> Result<NetworkSegmentList, Status> {
        self.unary("/forge.Forge/FindNetworkSegments", query).await
    }

    async fn find_instance_ids(
        &self,
        filter: InstanceSearchFilter,
    ) -> Result<InstanceIdList, Status> {
        self.unary("/forge.Forge/FindInstanceIds", filter).await
    }

    async fn find_instances_by_ids(
        &self,
        request: InstancesByIdsRequest,
    ) -> Result<InstanceList, Status> {
        self.unary("/forge.Forge/FindInstancesByIds", request).await
    }

    async fn release_instance(
        &self,
        request: InstanceReleaseRequest,
    ) -> Result<InstanceReleaseResult, Status> {
        self.unary("/forge.Forge/ReleaseInstance", request).await
    }

    async fn get_network_security_group_propagation_status(
        &self,
        request: GetNetworkSecurityGroupPropagationStatusRequest,
    ) -> Result<GetNetworkSecurityGroupPropagationStatusResponse, Status> {
        self.unary(
            "/forge.Forge/GetNetworkSecurityGroupPropagationStatus",
            request,
        )
        .await
    }

    async fn find_tenant_keyset_ids(
        &self,
        filter: TenantKeysetSearchFilter,
    ) -> Result<TenantKeysetIdList, Status> {
        self.unary("/forge.Forge/FindTenantKeysetIds", filter).await
    }

    async fn find_tenant_keysets_by_ids(
        &self,
        request: TenantKeysetsByIdsRequest,
    ) -> Result<TenantKeySetList, Status> {
        self.unary("/forge.Forge/FindTenantKeysetsByIds", request)
            .await
    }

    async fn find_tenant_keyset(
        &self,
        request: FindTenantKeysetRequest,
    ) -> Result<TenantKeySetList, Status> {
        self.unary("/forge.Forge/FindTenantKeyset", request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_address_is_rejected() {
        let err = endpoint("not a uri", Duration::from_secs(1), Duration::from_secs(1))
            .err()
            .unwrap();
        assert!(matches!(err, ClientError::InvalidAddress { .. }));
    }

    #[tokio::test]
    async fn lazy_client_reports_unreachable_controller() {
        let client = CarbideClient::connect_lazy(
            "http://127.0.0.1:1",
            Duration::from_millis(500),
            Duration::from_millis(500),
        )
        .unwrap();
        assert_eq!(client.address(), "http://127.0.0.1:1");

        let result = client.find_vpc_ids(VpcSearchFilter::default()).await;
        assert!(result.is_err());
    }
}
