use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use siteagent_carbide::proto::{
    NetworkSegment, NetworkSegmentId, NetworkSegmentQuery, NetworkSegmentSearchFilter,
    NetworkSegmentsByIdsRequest,
};
use siteagent_carbide::{ForgeApi, Status};

use super::InventorySource;
use crate::page::{InventoryPage, InventoryStatus, PagedInventoryInput, epoch_secs};

/// One published page of subnet (network segment) inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubnetInventory {
    pub segments: Vec<NetworkSegment>,
    pub timestamp: u64,
    pub inventory_status: InventoryStatus,
    pub status_msg: String,
    pub inventory_page: Option<InventoryPage>,
}

pub struct SubnetSource {
    forge: Arc<dyn ForgeApi>,
}

impl SubnetSource {
    pub fn new(forge: Arc<dyn ForgeApi>) -> Self {
        Self { forge }
    }
}

#[async_trait]
impl InventorySource for SubnetSource {
    type Id = NetworkSegmentId;
    type Record = NetworkSegment;
    type Page = SubnetInventory;

    fn item_type(&self) -> &'static str {
        "Subnet"
    }

    async fn find_ids(&self) -> Result<Vec<NetworkSegmentId>, Status> {
        Ok(self
            .forge
            .find_network_segment_ids(NetworkSegmentSearchFilter::default())
            .await?
            .network_segments_ids)
    }

    async fn find_by_ids(&self, ids: &[NetworkSegmentId]) -> Result<Vec<NetworkSegment>, Status> {
        let request = NetworkSegmentsByIdsRequest {
            network_segments_ids: ids.to_vec(),
        };
        Ok(self
            .forge
            .find_network_segments_by_ids(request)
            .await?
            .network_segments)
    }

    fn build_page(
        &self,
        all_ids: &[NetworkSegmentId],
        items: Vec<NetworkSegment>,
        input: &PagedInventoryInput,
    ) -> SubnetInventory {
        SubnetInventory {
            segments: items,
            timestamp: epoch_secs(),
            inventory_status: input.status,
            status_msg: input.status_message.clone(),
            inventory_page: input.build_page(all_ids.iter().map(|id| id.value.clone()).collect()),
        }
    }

    async fn find_fallback(
        &self,
    ) -> Option<Result<(Vec<NetworkSegmentId>, Vec<NetworkSegment>), Status>> {
        let listing = self
            .forge
            .find_network_segments(NetworkSegmentQuery::default())
            .await
            .map(|list| {
                let segments = list.network_segments;
                let ids = segments.iter().filter_map(|s| s.id.clone()).collect();
                (ids, segments)
            });
        Some(listing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::{InventoryCollector, ManageInventoryConfig};
    use crate::testing::{FakeForge, RecordingPublisher};

    fn config() -> ManageInventoryConfig {
        ManageInventoryConfig {
            site_id: "site-a".to_string(),
            publish_queue: "cloud".to_string(),
            site_page_size: 100,
            cloud_page_size: 25,
        }
    }

    #[tokio::test]
    async fn legacy_listing_used_when_ids_unimplemented() {
        let forge = Arc::new(
            FakeForge::new()
                .with_segments(40)
                .fail("FindNetworkSegmentIds", Status::unimplemented("old controller")),
        );
        let publisher = Arc::new(RecordingPublisher::new());
        let collector =
            InventoryCollector::new(SubnetSource::new(forge.clone()), config(), publisher.clone());

        let summary = collector.collect_and_publish().await.unwrap();
        assert!(summary.used_fallback);
        assert_eq!(summary.pages_published, 2);
        assert_eq!(forge.call_count("FindNetworkSegments"), 1);
        assert_eq!(forge.call_count("FindNetworkSegmentsByIds"), 0);
        assert_eq!(
            publisher.workflow_ids(),
            vec!["update-subnet-inventory-site-a-1", "update-subnet-inventory-site-a-2"]
        );

        let page: SubnetInventory =
            serde_json::from_value(publisher.calls()[1].payload.clone()).unwrap();
        assert_eq!(page.segments.len(), 15);
        assert_eq!(page.inventory_page.unwrap().item_ids.len(), 40);
    }

    #[tokio::test]
    async fn other_enumeration_errors_do_not_fall_back() {
        let forge = Arc::new(
            FakeForge::new()
                .with_segments(3)
                .fail("FindNetworkSegmentIds", Status::unavailable("down")),
        );
        let publisher = Arc::new(RecordingPublisher::new());
        let collector =
            InventoryCollector::new(SubnetSource::new(forge.clone()), config(), publisher.clone());

        assert!(collector.collect_and_publish().await.is_err());
        assert_eq!(forge.call_count("FindNetworkSegments"), 0);
        assert_eq!(publisher.workflow_ids(), vec!["update-subnet-inventory-site-a"]);
    }
}
