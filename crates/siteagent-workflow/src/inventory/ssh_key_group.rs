use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use siteagent_carbide::proto::{
    FindTenantKeysetRequest, TenantKeyset, TenantKeysetIdentifier, TenantKeysetSearchFilter,
    TenantKeysetsByIdsRequest,
};
use siteagent_carbide::{ForgeApi, Status};

use super::InventorySource;
use crate::page::{InventoryPage, InventoryStatus, PagedInventoryInput, epoch_secs};

/// One published page of SSH key group (tenant keyset) inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SshKeyGroupInventory {
    pub tenant_keysets: Vec<TenantKeyset>,
    pub timestamp: u64,
    pub inventory_status: InventoryStatus,
    pub status_msg: String,
    pub inventory_page: Option<InventoryPage>,
}

pub struct SshKeyGroupSource {
    forge: Arc<dyn ForgeApi>,
}

impl SshKeyGroupSource {
    pub fn new(forge: Arc<dyn ForgeApi>) -> Self {
        Self { forge }
    }
}

#[async_trait]
impl InventorySource for SshKeyGroupSource {
    type Id = TenantKeysetIdentifier;
    type Record = TenantKeyset;
    type Page = SshKeyGroupInventory;

    fn item_type(&self) -> &'static str {
        "SSHKeyGroup"
    }

    async fn find_ids(&self) -> Result<Vec<TenantKeysetIdentifier>, Status> {
        Ok(self
            .forge
            .find_tenant_keyset_ids(TenantKeysetSearchFilter::default())
            .await?
            .keyset_ids)
    }

    async fn find_by_ids(
        &self,
        ids: &[TenantKeysetIdentifier],
    ) -> Result<Vec<TenantKeyset>, Status> {
        let request = TenantKeysetsByIdsRequest {
            keyset_ids: ids.to_vec(),
            include_key_data: true,
        };
        Ok(self.forge.find_tenant_keysets_by_ids(request).await?.keyset)
    }

    fn build_page(
        &self,
        all_ids: &[TenantKeysetIdentifier],
        items: Vec<TenantKeyset>,
        input: &PagedInventoryInput,
    ) -> SshKeyGroupInventory {
        SshKeyGroupInventory {
            tenant_keysets: items,
            timestamp: epoch_secs(),
            inventory_status: input.status,
            status_msg: input.status_message.clone(),
            inventory_page: input
                .build_page(all_ids.iter().map(|id| id.keyset_id.clone()).collect()),
        }
    }

    async fn find_fallback(
        &self,
    ) -> Option<Result<(Vec<TenantKeysetIdentifier>, Vec<TenantKeyset>), Status>> {
        let request = FindTenantKeysetRequest {
            organization_id: None,
            keyset_id: None,
            include_key_data: true,
        };
        let listing = self.forge.find_tenant_keyset(request).await.map(|list| {
            let keysets = list.keyset;
            let ids = keysets
                .iter()
                .filter_map(|k| k.keyset_identifier.clone())
                .collect();
            (ids, keysets)
        });
        Some(listing)
    }
}
