//! In-process fakes for the site controller and the workflow engine.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;
use siteagent_carbide::ForgeApi;
use siteagent_carbide::Status;
use siteagent_carbide::proto::*;

use crate::publish::{PublishError, StartWorkflowOptions, WorkflowClient, WorkflowRun};

/// One recorded `execute_workflow` call.
#[derive(Debug, Clone)]
pub struct PublishedWorkflow {
    pub options: StartWorkflowOptions,
    pub workflow_name: String,
    pub site_id: String,
    pub payload: Value,
}

/// [`WorkflowClient`] that records every call and can fail the n-th one.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    calls: Mutex<Vec<PublishedWorkflow>>,
    fail_on: Option<usize>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `call`-th execution (1-based). The failed call is still recorded.
    pub fn failing_on(call: usize) -> Self {
        Self {
            calls: Mutex::default(),
            fail_on: Some(call),
        }
    }

    pub fn calls(&self) -> Vec<PublishedWorkflow> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn workflow_ids(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.options.id).collect()
    }
}

#[async_trait]
impl WorkflowClient for RecordingPublisher {
    async fn execute_workflow(
        &self,
        options: StartWorkflowOptions,
        workflow_name: &str,
        site_id: &str,
        payload: Value,
    ) -> Result<WorkflowRun, PublishError> {
        let workflow_id = options.id.clone();
        let call = {
            let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
            calls.push(PublishedWorkflow {
                options,
                workflow_name: workflow_name.to_string(),
                site_id: site_id.to_string(),
                payload,
            });
            calls.len()
        };
        if self.fail_on == Some(call) {
            return Err(PublishError::Rejected {
                workflow_id,
                reason: "injected failure".to_string(),
            });
        }
        Ok(WorkflowRun {
            workflow_id,
            run_id: format!("run-{call}"),
        })
    }
}

/// Status reported by [`FakeForge`] for every propagation query.
pub const FAKE_PROPAGATION_STATUS: &str = "NSG_PROPAGATION_STATUS_FULL";

/// In-memory site controller.
///
/// Failures are injected per RPC name (`FindVpcIds`, `CreateVpc`, ...).
#[derive(Debug, Default)]
pub struct FakeForge {
    pub vpcs: Vec<Vpc>,
    pub segments: Vec<NetworkSegment>,
    pub instances: Vec<Instance>,
    pub keysets: Vec<TenantKeyset>,
    /// IDs that enumerate but no longer hydrate.
    pub vanished: HashSet<String>,
    failures: HashMap<&'static str, Status>,
    calls: Mutex<Vec<&'static str>>,
}

impl FakeForge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vpcs(mut self, n: usize) -> Self {
        self.vpcs = (0..n).map(|i| vpc(&format!("vpc-{i:03}"))).collect();
        self
    }

    pub fn with_segments(mut self, n: usize) -> Self {
        self.segments = (0..n).map(|i| segment(&format!("seg-{i:03}"))).collect();
        self
    }

    pub fn with_instances(mut self, n: usize) -> Self {
        self.instances = (0..n).map(|i| instance(&format!("inst-{i:03}"))).collect();
        self
    }

    pub fn with_keysets(mut self, n: usize) -> Self {
        self.keysets = (0..n).map(|i| keyset("org-1", &format!("ks-{i:03}"))).collect();
        self
    }

    /// Make `rpc` fail with `status`.
    pub fn fail(mut self, rpc: &'static str, status: Status) -> Self {
        self.failures.insert(rpc, status);
        self
    }

    /// RPC names in call order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self, rpc: &str) -> usize {
        self.calls().iter().filter(|c| **c == rpc).count()
    }

    fn check(&self, rpc: &'static str) -> Result<(), Status> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(rpc);
        match self.failures.get(rpc) {
            Some(status) => Err(status.clone()),
            None => Ok(()),
        }
    }

    fn present(&self, id: &str) -> bool {
        !self.vanished.contains(id)
    }
}

pub fn vpc(id: &str) -> Vpc {
    Vpc {
        id: Some(VpcId {
            value: id.to_string(),
        }),
        name: format!("{id}-name"),
        tenant_organization_id: "org-1".to_string(),
        vni: None,
        network_security_group_id: None,
    }
}

pub fn segment(id: &str) -> NetworkSegment {
    NetworkSegment {
        id: Some(NetworkSegmentId {
            value: id.to_string(),
        }),
        name: format!("{id}-name"),
        state: "Ready".to_string(),
        ..Default::default()
    }
}

pub fn instance(id: &str) -> Instance {
    Instance {
        id: Some(InstanceId {
            value: id.to_string(),
        }),
        machine_id: format!("{id}-machine"),
        tenant_organization_id: "org-1".to_string(),
        network_security_group_id: None,
        state: "Ready".to_string(),
    }
}

pub fn keyset(organization_id: &str, keyset_id: &str) -> TenantKeyset {
    TenantKeyset {
        keyset_identifier: Some(TenantKeysetIdentifier {
            organization_id: organization_id.to_string(),
            keyset_id: keyset_id.to_string(),
        }),
        keyset_content: Some(TenantKeysetContent {
            public_keys: vec![TenantPublicKey {
                public_key: "ssh-ed25519 AAAA".to_string(),
                comment: None,
            }],
        }),
        version: "V1-T1".to_string(),
    }
}

fn propagation(id: &str) -> NetworkSecurityGroupPropagationObjectStatus {
    NetworkSecurityGroupPropagationObjectStatus {
        id: id.to_string(),
        status: FAKE_PROPAGATION_STATUS.to_string(),
        details: None,
    }
}

#[async_trait]
impl ForgeApi for FakeForge {
    async fn find_vpc_ids(&self, _filter: VpcSearchFilter) -> Result<VpcIdList, Status> {
        self.check("FindVpcIds")?;
        Ok(VpcIdList {
            vpc_ids: self.vpcs.iter().filter_map(|v| v.id.clone()).collect(),
        })
    }

    async fn find_vpcs_by_ids(&self, request: VpcsByIdsRequest) -> Result<VpcList, Status> {
        self.check("FindVpcsByIds")?;
        let wanted: HashSet<_> = request.vpc_ids.into_iter().map(|id| id.value).collect();
        Ok(VpcList {
            vpcs: self
                .vpcs
                .iter()
                .filter(|v| {
                    v.id.as_ref()
                        .is_some_and(|id| wanted.contains(&id.value) && self.present(&id.value))
                })
                .cloned()
                .collect(),
        })
    }

    async fn create_vpc(&self, request: VpcCreationRequest) -> Result<Vpc, Status> {
        self.check("CreateVpc")?;
        Ok(Vpc {
            id: request.id,
            name: request.name,
            tenant_organization_id: request.tenant_organization_id,
            vni: Some(4096),
            network_security_group_id: request.network_security_group_id,
        })
    }

    async fn delete_vpc(&self, request: VpcDeletionRequest) -> Result<VpcDeletionResult, Status> {
        self.check("DeleteVpc")?;
        let id = request.id.map(|id| id.value).unwrap_or_default();
        if !self.vpcs.iter().any(|v| v.id.as_ref().is_some_and(|v| v.value == id)) {
            return Err(Status::not_found(format!("vpc {id} not found")));
        }
        Ok(VpcDeletionResult {})
    }

    async fn find_network_segment_ids(
        &self,
        _filter: NetworkSegmentSearchFilter,
    ) -> Result<NetworkSegmentIdList, Status> {
        self.check("FindNetworkSegmentIds")?;
        Ok(NetworkSegmentIdList {
            network_segments_ids: self.segments.iter().filter_map(|s| s.id.clone()).collect(),
        })
    }

    async fn find_network_segments_by_ids(
        &self,
        request: NetworkSegmentsByIdsRequest,
    ) -> Result<NetworkSegmentList, Status> {
        self.check("FindNetworkSegmentsByIds")?;
        let wanted: HashSet<_> = request
            .network_segments_ids
            .into_iter()
            .map(|id| id.value)
            .collect();
        Ok(NetworkSegmentList {
            network_segments: self
                .segments
                .iter()
                .filter(|s| {
                    s.id.as_ref()
                        .is_some_and(|id| wanted.contains(&id.value) && self.present(&id.value))
                })
                .cloned()
                .collect(),
        })
    }

    async fn find_network_segments(
        &self,
        _query: NetworkSegmentQuery,
    ) -> Result<NetworkSegmentList, Status> {
        self.check("FindNetworkSegments")?;
        Ok(NetworkSegmentList {
            network_segments: self.segments.clone(),
        })
    }

    async fn find_instance_ids(
        &self,
        _filter: InstanceSearchFilter,
    ) -> Result<InstanceIdList, Status> {
        self.check("FindInstanceIds")?;
        Ok(InstanceIdList {
            instance_ids: self.instances.iter().filter_map(|i| i.id.clone()).collect(),
        })
    }

    async fn find_instances_by_ids(
        &self,
        request: InstancesByIdsRequest,
    ) -> Result<InstanceList, Status> {
        self.check("FindInstancesByIds")?;
        let wanted: HashSet<_> = request.instance_ids.into_iter().map(|id| id.value).collect();
        Ok(InstanceList {
            instances: self
                .instances
                .iter()
                .filter(|i| {
                    i.id.as_ref()
                        .is_some_and(|id| wanted.contains(&id.value) && self.present(&id.value))
                })
                .cloned()
                .collect(),
        })
    }

    async fn release_instance(
        &self,
        request: InstanceReleaseRequest,
    ) -> Result<InstanceReleaseResult, Status> {
        self.check("ReleaseInstance")?;
        let id = request.id.map(|id| id.value).unwrap_or_default();
        if !self
            .instances
            .iter()
            .any(|i| i.id.as_ref().is_some_and(|i| i.value == id))
        {
            return Err(Status::not_found(format!("instance {id} not found")));
        }
        Ok(InstanceReleaseResult {})
    }

    async fn get_network_security_group_propagation_status(
        &self,
        request: GetNetworkSecurityGroupPropagationStatusRequest,
    ) -> Result<GetNetworkSecurityGroupPropagationStatusResponse, Status> {
        self.check("GetNetworkSecurityGroupPropagationStatus")?;
        Ok(GetNetworkSecurityGroupPropagationStatusResponse {
            vpcs: request.vpc_ids.iter().map(|id| propagation(id)).collect(),
            instances: request.instance_ids.iter().map(|id| propagation(id)).collect(),
        })
    }

    async fn find_tenant_keyset_ids(
        &self,
        _filter: TenantKeysetSearchFilter,
    ) -> Result<TenantKeysetIdList, Status> {
        self.check("FindTenantKeysetIds")?;
        Ok(TenantKeysetIdList {
            keyset_ids: self
                .keysets
                .iter()
                .filter_map(|k| k.keyset_identifier.clone())
                .collect(),
        })
    }

    async fn find_tenant_keysets_by_ids(
        &self,
        request: TenantKeysetsByIdsRequest,
    ) -> Result<TenantKeySetList, Status> {
        self.check("FindTenantKeysetsByIds")?;
        let wanted: HashSet<_> = request.keyset_ids.into_iter().collect();
        Ok(TenantKeySetList {
            keyset: self
                .keysets
                .iter()
                .filter(|k| {
                    k.keyset_identifier
                        .as_ref()
                        .is_some_and(|id| wanted.contains(id) && self.present(&id.keyset_id))
                })
                .cloned()
                .collect(),
        })
    }

    async fn find_tenant_keyset(
        &self,
        _request: FindTenantKeysetRequest,
    ) -> Result<TenantKeySetList, Status> {
        self.check("FindTenantKeyset")?;
        Ok(TenantKeySetList {
            keyset: self.keysets.clone(),
        })
    }
}
