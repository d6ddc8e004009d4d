use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use siteagent_carbide::proto::{
    GetNetworkSecurityGroupPropagationStatusRequest, NetworkSecurityGroupPropagationObjectStatus,
    Vpc, VpcId, VpcSearchFilter, VpcsByIdsRequest,
};
use siteagent_carbide::{ForgeApi, Status};

use super::InventorySource;
use crate::page::{InventoryPage, InventoryStatus, PagedInventoryInput, epoch_secs};

/// One published page of VPC inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VpcInventory {
    pub vpcs: Vec<Vpc>,
    pub timestamp: u64,
    pub inventory_status: InventoryStatus,
    pub status_msg: String,
    pub inventory_page: Option<InventoryPage>,
    pub network_security_group_propagations: Vec<NetworkSecurityGroupPropagationObjectStatus>,
}

pub struct VpcSource {
    forge: Arc<dyn ForgeApi>,
}

impl VpcSource {
    pub fn new(forge: Arc<dyn ForgeApi>) -> Self {
        Self { forge }
    }
}

#[async_trait]
impl InventorySource for VpcSource {
    type Id = VpcId;
    type Record = Vpc;
    type Page = VpcInventory;

    fn item_type(&self) -> &'static str {
        "Vpc"
    }

    async fn find_ids(&self) -> Result<Vec<VpcId>, Status> {
        Ok(self
            .forge
            .find_vpc_ids(VpcSearchFilter::default())
            .await?
            .vpc_ids)
    }

    async fn find_by_ids(&self, ids: &[VpcId]) -> Result<Vec<Vpc>, Status> {
        let request = VpcsByIdsRequest {
            vpc_ids: ids.to_vec(),
        };
        Ok(self.forge.find_vpcs_by_ids(request).await?.vpcs)
    }

    fn build_page(
        &self,
        all_ids: &[VpcId],
        items: Vec<Vpc>,
        input: &PagedInventoryInput,
    ) -> VpcInventory {
        VpcInventory {
            vpcs: items,
            timestamp: epoch_secs(),
            inventory_status: input.status,
            status_msg: input.status_message.clone(),
            inventory_page: input.build_page(all_ids.iter().map(|id| id.value.clone()).collect()),
            network_security_group_propagations: Vec::new(),
        }
    }

    /// Attach security group propagation status for the page's VPCs.
    async fn post_process(&self, mut page: VpcInventory) -> Result<VpcInventory, Status> {
        let vpc_ids = page
            .vpcs
            .iter()
            .filter_map(|vpc| vpc.id.as_ref().map(|id| id.value.clone()))
            .collect();
        let request = GetNetworkSecurityGroupPropagationStatusRequest {
            vpc_ids,
            instance_ids: Vec::new(),
        };
        page.network_security_group_propagations = self
            .forge
            .get_network_security_group_propagation_status(request)
            .await?
            .vpcs;
        Ok(page)
    }
}
