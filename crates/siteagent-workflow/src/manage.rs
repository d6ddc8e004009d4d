//! Activities that change resources on the site controller.
//!
//! Requests are validated before any call is made. Invalid requests fail
//! as non-retryable `InvalidRequest`; controller failures go through
//! [`wrap_status`].

use std::sync::Arc;

use siteagent_carbide::proto::{
    InstanceReleaseRequest, Vpc, VpcCreationRequest, VpcDeletionRequest,
};
use siteagent_carbide::{ActivityError, ForgeApi, wrap_status};
use tracing::{info, instrument, warn};

/// VPC lifecycle on the site controller.
#[derive(Clone)]
pub struct ManageVpc {
    forge: Arc<dyn ForgeApi>,
}

impl ManageVpc {
    pub fn new(forge: Arc<dyn ForgeApi>) -> Self {
        Self { forge }
    }

    #[instrument(name = "CreateVpcOnSite", skip_all)]
    pub async fn create_vpc(&self, request: VpcCreationRequest) -> Result<Vpc, ActivityError> {
        info!("starting activity");

        if request.name.is_empty() {
            return Err(invalid("received create VPC request missing name"));
        }
        if request.tenant_organization_id.is_empty() {
            return Err(invalid(
                "received create VPC request missing TenantOrganizationId",
            ));
        }
        let vpc_id = match &request.id {
            Some(id) if !id.value.is_empty() => id.value.clone(),
            _ => return Err(invalid("received create VPC request missing VPC ID")),
        };

        let vpc = self.forge.create_vpc(request).await.map_err(|status| {
            warn!(%vpc_id, error = %status.message(), "failed to create VPC using site controller API");
            wrap_status(status)
        })?;
        info!(%vpc_id, "completed activity");
        Ok(vpc)
    }

    #[instrument(name = "DeleteVpcOnSite", skip_all)]
    pub async fn delete_vpc(&self, request: VpcDeletionRequest) -> Result<(), ActivityError> {
        info!("starting activity");

        let vpc_id = match &request.id {
            Some(id) if !id.value.is_empty() => id.value.clone(),
            _ => return Err(invalid("received delete VPC request without VPC ID")),
        };

        self.forge.delete_vpc(request).await.map_err(|status| {
            warn!(%vpc_id, error = %status.message(), "failed to delete VPC using site controller API");
            wrap_status(status)
        })?;
        info!(%vpc_id, "completed activity");
        Ok(())
    }
}

/// Instance lifecycle on the site controller.
#[derive(Clone)]
pub struct ManageInstance {
    forge: Arc<dyn ForgeApi>,
}

impl ManageInstance {
    pub fn new(forge: Arc<dyn ForgeApi>) -> Self {
        Self { forge }
    }

    #[instrument(name = "DeleteInstanceOnSite", skip_all)]
    pub async fn release_instance(
        &self,
        request: InstanceReleaseRequest,
    ) -> Result<(), ActivityError> {
        info!("starting activity");

        let instance_id = match &request.id {
            Some(id) if !id.value.is_empty() => id.value.clone(),
            _ => {
                return Err(invalid(
                    "received release instance request without instance ID",
                ));
            }
        };

        self.forge.release_instance(request).await.map_err(|status| {
            warn!(%instance_id, error = %status.message(), "failed to release instance using site controller API");
            wrap_status(status)
        })?;
        info!(%instance_id, "completed activity");
        Ok(())
    }
}

fn invalid(message: &str) -> ActivityError {
    warn!(error = message, "invalid request");
    ActivityError::invalid_request(message)
}

#[cfg(test)]
mod tests {
    use siteagent_carbide::proto::{InstanceId, VpcId};
    use siteagent_carbide::{ErrorKind, Status};

    use super::*;
    use crate::testing::FakeForge;

    fn creation(id: &str, name: &str, org: &str) -> VpcCreationRequest {
        VpcCreationRequest {
            id: (!id.is_empty()).then(|| VpcId {
                value: id.to_string(),
            }),
            name: name.to_string(),
            tenant_organization_id: org.to_string(),
            network_security_group_id: None,
        }
    }

    #[tokio::test]
    async fn create_vpc_validates_before_calling() {
        let forge = Arc::new(FakeForge::new());
        let manage = ManageVpc::new(forge.clone());

        for request in [
            creation("vpc-1", "", "org"),
            creation("vpc-1", "prod", ""),
            creation("", "prod", "org"),
        ] {
            let err = manage.create_vpc(request).await.unwrap_err();
            assert_eq!(err.kind(), Some(ErrorKind::InvalidRequest));
            assert!(!err.is_retryable());
        }
        assert!(forge.calls().is_empty());
    }

    #[tokio::test]
    async fn create_vpc_returns_created_vpc() {
        let manage = ManageVpc::new(Arc::new(FakeForge::new()));
        let vpc = manage
            .create_vpc(creation("vpc-1", "prod", "org"))
            .await
            .unwrap();
        assert_eq!(vpc.name, "prod");
        assert_eq!(vpc.id.unwrap().value, "vpc-1");
    }

    #[tokio::test]
    async fn create_vpc_wraps_controller_errors() {
        let forge = FakeForge::new().fail("CreateVpc", Status::already_exists("dup"));
        let manage = ManageVpc::new(Arc::new(forge));
        let err = manage
            .create_vpc(creation("vpc-1", "prod", "org"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::CarbideAlreadyExists));

        let forge = FakeForge::new().fail("CreateVpc", Status::internal("boom"));
        let manage = ManageVpc::new(Arc::new(forge));
        let err = manage
            .create_vpc(creation("vpc-1", "prod", "org"))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn delete_vpc_requires_id_and_maps_not_found() {
        let manage = ManageVpc::new(Arc::new(FakeForge::new().with_vpcs(1)));

        let err = manage
            .delete_vpc(VpcDeletionRequest { id: None })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::InvalidRequest));

        manage
            .delete_vpc(VpcDeletionRequest {
                id: Some(VpcId {
                    value: "vpc-000".to_string(),
                }),
            })
            .await
            .unwrap();

        let err = manage
            .delete_vpc(VpcDeletionRequest {
                id: Some(VpcId {
                    value: "vpc-999".to_string(),
                }),
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::CarbideObjectNotFound));
    }

    #[tokio::test]
    async fn release_instance() {
        let forge = Arc::new(FakeForge::new().with_instances(1));
        let manage = ManageInstance::new(forge.clone());

        let err = manage
            .release_instance(InstanceReleaseRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::InvalidRequest));
        assert_eq!(forge.call_count("ReleaseInstance"), 0);

        manage
            .release_instance(InstanceReleaseRequest {
                id: Some(InstanceId {
                    value: "inst-000".to_string(),
                }),
                issue: None,
            })
            .await
            .unwrap();
        assert_eq!(forge.call_count("ReleaseInstance"), 1);
    }
}
