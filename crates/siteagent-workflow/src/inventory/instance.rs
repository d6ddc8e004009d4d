use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use siteagent_carbide::proto::{
    GetNetworkSecurityGroupPropagationStatusRequest, Instance, InstanceId, InstanceSearchFilter,
    InstancesByIdsRequest, NetworkSecurityGroupPropagationObjectStatus,
};
use siteagent_carbide::{ForgeApi, Status};

use super::InventorySource;
use crate::page::{InventoryPage, InventoryStatus, PagedInventoryInput, epoch_secs};

/// One published page of instance inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceInventory {
    pub instances: Vec<Instance>,
    pub timestamp: u64,
    pub inventory_status: InventoryStatus,
    pub status_msg: String,
    pub inventory_page: Option<InventoryPage>,
    pub network_security_group_propagations: Vec<NetworkSecurityGroupPropagationObjectStatus>,
}

pub struct InstanceSource {
    forge: Arc<dyn ForgeApi>,
}

impl InstanceSource {
    pub fn new(forge: Arc<dyn ForgeApi>) -> Self {
        Self { forge }
    }
}

#[async_trait]
impl InventorySource for InstanceSource {
    type Id = InstanceId;
    type Record = Instance;
    type Page = InstanceInventory;

    fn item_type(&self) -> &'static str {
        "Instance"
    }

    async fn find_ids(&self) -> Result<Vec<InstanceId>, Status> {
        Ok(self
            .forge
            .find_instance_ids(InstanceSearchFilter::default())
            .await?
            .instance_ids)
    }

    async fn find_by_ids(&self, ids: &[InstanceId]) -> Result<Vec<Instance>, Status> {
        let request = InstancesByIdsRequest {
            instance_ids: ids.to_vec(),
        };
        Ok(self.forge.find_instances_by_ids(request).await?.instances)
    }

    fn build_page(
        &self,
        all_ids: &[InstanceId],
        items: Vec<Instance>,
        input: &PagedInventoryInput,
    ) -> InstanceInventory {
        InstanceInventory {
            instances: items,
            timestamp: epoch_secs(),
            inventory_status: input.status,
            status_msg: input.status_message.clone(),
            inventory_page: input.build_page(all_ids.iter().map(|id| id.value.clone()).collect()),
            network_security_group_propagations: Vec::new(),
        }
    }

    async fn post_process(
        &self,
        mut page: InstanceInventory,
    ) -> Result<InstanceInventory, Status> {
        let instance_ids = page
            .instances
            .iter()
            .filter_map(|instance| instance.id.as_ref().map(|id| id.value.clone()))
            .collect();
        let request = GetNetworkSecurityGroupPropagationStatusRequest {
            vpc_ids: Vec::new(),
            instance_ids,
        };
        page.network_security_group_propagations = self
            .forge
            .get_network_security_group_propagation_status(request)
            .await?
            .instances;
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::{InventoryCollector, ManageInventoryConfig};
    use crate::testing::{FakeForge, RecordingPublisher};

    #[tokio::test]
    async fn tolerates_instances_vanishing_between_calls() {
        let mut fake = FakeForge::new().with_instances(12);
        fake.vanished.insert("inst-004".to_string());
        let forge = Arc::new(fake);
        let publisher = Arc::new(RecordingPublisher::new());
        let config = ManageInventoryConfig {
            site_id: "site-a".to_string(),
            publish_queue: "cloud".to_string(),
            site_page_size: 5,
            cloud_page_size: 10,
        };
        let collector =
            InventoryCollector::new(InstanceSource::new(forge.clone()), config, publisher.clone());

        let summary = collector.collect_and_publish().await.unwrap();
        assert_eq!(summary.total_items, 12);
        // Three site pages of 5/5/2 IDs, each fitting in one cloud page.
        assert_eq!(forge.call_count("FindInstancesByIds"), 3);
        assert_eq!(summary.pages_published, 3);

        let pages: Vec<InstanceInventory> = publisher
            .calls()
            .into_iter()
            .map(|c| serde_json::from_value(c.payload).unwrap())
            .collect();
        assert_eq!(pages[0].instances.len(), 4);
        assert_eq!(pages[0].network_security_group_propagations.len(), 4);
        assert_eq!(pages[2].instances.len(), 2);
        assert_eq!(
            pages[2].inventory_page.as_ref().unwrap().current_page,
            3
        );
        assert_eq!(
            publisher.workflow_ids()[2],
            "update-instance-inventory-site-a-3"
        );
    }
}
