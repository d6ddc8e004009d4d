//! Paginated inventory collection.
//!
//! An [`InventoryCollector`] drives one [`InventorySource`] through a full
//! collection run:
//!
//! ```text
//!   find_ids ──► site pages (site_page_size) ──► find_by_ids
//!                                                   │
//!                      cloud pages (cloud_page_size) ◄┘
//!                           │
//!          build_page ──► post_process ──► execute_workflow("<base>-<n>")
//! ```
//!
//! When `find_ids` reports `Unimplemented` and the source has a legacy
//! bulk listing, the run switches to it. Any other enumeration failure is
//! published once as a FAILED page under the base workflow ID.
//!
//! Every run first calls [`WorkflowClient::begin_run`] with the base
//! workflow ID, so publishers can retire pages left by an earlier run.

mod instance;
mod ssh_key_group;
mod subnet;
mod vpc;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use siteagent_carbide::{ForgeApi, Status, TransportCode};
use siteagent_core::ResourceKind;
use thiserror::Error;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::page::{PagedInventoryInput, STATUS_NO_ITEMS, STATUS_RETRIEVED};
use crate::publish::{PublishError, StartWorkflowOptions, WorkflowClient};

pub use instance::{InstanceInventory, InstanceSource};
pub use ssh_key_group::{SshKeyGroupInventory, SshKeyGroupSource};
pub use subnet::{SubnetInventory, SubnetSource};
pub use vpc::{VpcInventory, VpcSource};

pub type InventoryResult<T> = Result<T, InventoryError>;

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("failed to retrieve {item_type} IDs from site controller: {source}")]
    FindIds {
        item_type: &'static str,
        #[source]
        source: Status,
    },

    #[error("failed to retrieve {item_type} records from site controller: {source}")]
    FindByIds {
        item_type: &'static str,
        #[source]
        source: Status,
    },

    #[error("failed to list {item_type} inventory through fallback API: {source}")]
    Fallback {
        item_type: &'static str,
        #[source]
        source: Status,
    },

    #[error("failed to post-process {item_type} inventory page {page}: {source}")]
    PostProcess {
        item_type: &'static str,
        page: usize,
        #[source]
        source: Status,
    },

    #[error("failed to serialize {item_type} inventory page: {source}")]
    Serialize {
        item_type: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to publish {item_type} inventory: {source}")]
    Publish {
        item_type: &'static str,
        #[source]
        source: PublishError,
    },
}

impl InventoryError {
    /// Site controller status behind this error, if any.
    pub fn status(&self) -> Option<&Status> {
        match self {
            InventoryError::FindIds { source, .. }
            | InventoryError::FindByIds { source, .. }
            | InventoryError::Fallback { source, .. }
            | InventoryError::PostProcess { source, .. } => Some(source),
            InventoryError::Serialize { .. } | InventoryError::Publish { .. } => None,
        }
    }
}

/// One resource type's view of the site controller.
#[async_trait]
pub trait InventorySource: Send + Sync {
    type Id: Send + Sync;
    type Record: Send;
    type Page: Serialize + Send;

    /// Name used in workflow names and IDs, e.g. `Vpc`.
    fn item_type(&self) -> &'static str;

    /// Enumerate every ID on the site.
    async fn find_ids(&self) -> Result<Vec<Self::Id>, Status>;

    /// Hydrate the records for one site page of IDs.
    async fn find_by_ids(&self, ids: &[Self::Id]) -> Result<Vec<Self::Record>, Status>;

    /// Build the message for one cloud page. `all_ids` is every ID of the run.
    fn build_page(
        &self,
        all_ids: &[Self::Id],
        items: Vec<Self::Record>,
        input: &PagedInventoryInput,
    ) -> Self::Page;

    /// Enrich a successful, non-empty page before it is published.
    async fn post_process(&self, page: Self::Page) -> Result<Self::Page, Status> {
        Ok(page)
    }

    /// Legacy single-call listing of every ID and record, used when
    /// `find_ids` is unimplemented. `None` means the source has no fallback.
    #[allow(clippy::type_complexity)]
    async fn find_fallback(&self) -> Option<Result<(Vec<Self::Id>, Vec<Self::Record>), Status>> {
        None
    }
}

/// Paging and publishing parameters of a collection run.
#[derive(Debug, Clone)]
pub struct ManageInventoryConfig {
    pub site_id: String,
    pub publish_queue: String,
    /// IDs hydrated per `find_by_ids` call.
    pub site_page_size: usize,
    /// Records per published message.
    pub cloud_page_size: usize,
}

/// Result of a completed collection run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectSummary {
    pub total_items: usize,
    pub pages_published: usize,
    pub used_fallback: bool,
}

/// Collects one resource type and publishes it page by page.
pub struct InventoryCollector<S> {
    source: S,
    config: ManageInventoryConfig,
    publisher: Arc<dyn WorkflowClient>,
}

impl<S: InventorySource> InventoryCollector<S> {
    pub fn new(source: S, config: ManageInventoryConfig, publisher: Arc<dyn WorkflowClient>) -> Self {
        Self {
            source,
            config,
            publisher,
        }
    }

    /// `Update<ItemType>Inventory`
    pub fn workflow_name(&self) -> String {
        format!("Update{}Inventory", self.source.item_type())
    }

    /// `update-<itemtype>-inventory-<site>`; pages append `-<n>`.
    pub fn base_workflow_id(&self) -> String {
        format!(
            "update-{}-inventory-{}",
            self.source.item_type().to_lowercase(),
            self.config.site_id
        )
    }

    pub async fn collect_and_publish(&self) -> InventoryResult<CollectSummary> {
        let span = info_span!(
            "inventory",
            activity = "CollectAndPublishInventory",
            item_type = self.source.item_type(),
            site_id = %self.config.site_id,
        );
        self.run().instrument(span).await
    }

    async fn run(&self) -> InventoryResult<CollectSummary> {
        let item_type = self.source.item_type();
        info!("starting inventory collection");
        self.publisher
            .begin_run(&self.base_workflow_id())
            .await
            .map_err(|source| InventoryError::Publish { item_type, source })?;

        let ids = match self.source.find_ids().await {
            Ok(ids) => ids,
            Err(status) if TransportCode::from(status.code()) == TransportCode::Unimplemented => {
                match self.source.find_fallback().await {
                    Some(listing) => {
                        info!("ID enumeration unimplemented, using fallback listing");
                        return self.run_fallback(listing).await;
                    }
                    None => {
                        return Err(self
                            .report_failure(status, |source| InventoryError::FindIds {
                                item_type,
                                source,
                            })
                            .await);
                    }
                }
            }
            Err(status) => {
                return Err(self
                    .report_failure(status, |source| InventoryError::FindIds { item_type, source })
                    .await);
            }
        };

        let total_items = ids.len();
        if total_items == 0 {
            return self.publish_empty(false).await;
        }

        let mut page_number = 1;
        for (site_page, chunk) in ids.chunks(self.config.site_page_size.max(1)).enumerate() {
            debug!(site_page = site_page + 1, ids = chunk.len(), "hydrating site page");
            let records = self.source.find_by_ids(chunk).await.map_err(|source| {
                error!(site_page = site_page + 1, error = %source, "failed to hydrate site page");
                InventoryError::FindByIds { item_type, source }
            })?;
            if records.len() != chunk.len() {
                warn!(
                    requested = chunk.len(),
                    received = records.len(),
                    "hydrated record count does not match requested IDs"
                );
            }
            page_number = self
                .publish_records(&ids, records, total_items, page_number)
                .await?;
        }

        let pages_published = page_number - 1;
        info!(total_items, pages_published, "inventory published");
        Ok(CollectSummary {
            total_items,
            pages_published,
            used_fallback: false,
        })
    }

    async fn run_fallback(
        &self,
        listing: Result<(Vec<S::Id>, Vec<S::Record>), Status>,
    ) -> InventoryResult<CollectSummary> {
        let item_type = self.source.item_type();
        let (ids, records) = match listing {
            Ok(listing) => listing,
            Err(status) => {
                return Err(self
                    .report_failure(status, |source| InventoryError::Fallback { item_type, source })
                    .await);
            }
        };

        let total_items = ids.len();
        if total_items == 0 {
            return self.publish_empty(true).await;
        }

        let next = self.publish_records(&ids, records, total_items, 1).await?;
        let pages_published = next - 1;
        info!(total_items, pages_published, "inventory published from fallback listing");
        Ok(CollectSummary {
            total_items,
            pages_published,
            used_fallback: true,
        })
    }

    /// Split `records` into cloud pages and publish them starting at
    /// `page_number`. Returns the next page number.
    async fn publish_records(
        &self,
        all_ids: &[S::Id],
        records: Vec<S::Record>,
        total_items: usize,
        mut page_number: usize,
    ) -> InventoryResult<usize> {
        let item_type = self.source.item_type();
        let cloud_page_size = self.config.cloud_page_size.max(1);

        for items in into_chunks(records, cloud_page_size) {
            let input = PagedInventoryInput::success(
                total_items,
                cloud_page_size,
                page_number,
                STATUS_RETRIEVED,
            );
            let page = self.source.build_page(all_ids, items, &input);
            let page = self.source.post_process(page).await.map_err(|source| {
                error!(page = page_number, error = %source, "failed to post-process page");
                InventoryError::PostProcess {
                    item_type,
                    page: page_number,
                    source,
                }
            })?;
            let id = format!("{}-{page_number}", self.base_workflow_id());
            self.publish(id, &page).await?;
            page_number += 1;
        }
        Ok(page_number)
    }

    async fn publish_empty(&self, used_fallback: bool) -> InventoryResult<CollectSummary> {
        let input = PagedInventoryInput::success(0, self.config.cloud_page_size, 1, STATUS_NO_ITEMS);
        let page = self.source.build_page(&[], Vec::new(), &input);
        self.publish(self.base_workflow_id(), &page).await?;
        info!("no items reported, published empty inventory");
        Ok(CollectSummary {
            total_items: 0,
            pages_published: 1,
            used_fallback,
        })
    }

    /// Publish a FAILED page for `status`. Returns the error the run ends
    /// with: the publish error if publishing failed, else `to_error(status)`.
    async fn report_failure(
        &self,
        status: Status,
        to_error: impl FnOnce(Status) -> InventoryError,
    ) -> InventoryError {
        error!(code = ?status.code(), error = %status.message(), "inventory collection failed");
        let input = PagedInventoryInput::failed(self.config.cloud_page_size, status.to_string());
        let page = self.source.build_page(&[], Vec::new(), &input);
        match self.publish(self.base_workflow_id(), &page).await {
            Ok(()) => to_error(status),
            Err(e) => e,
        }
    }

    async fn publish(&self, workflow_id: String, page: &S::Page) -> InventoryResult<()> {
        let item_type = self.source.item_type();
        let payload = serde_json::to_value(page)
            .map_err(|source| InventoryError::Serialize { item_type, source })?;
        let options = StartWorkflowOptions {
            id: workflow_id,
            task_queue: self.config.publish_queue.clone(),
        };
        let run = self
            .publisher
            .execute_workflow(options, &self.workflow_name(), &self.config.site_id, payload)
            .await
            .map_err(|source| {
                error!(error = %source, "failed to publish inventory page");
                InventoryError::Publish { item_type, source }
            })?;
        debug!(workflow_id = %run.workflow_id, run_id = %run.run_id, "inventory page published");
        Ok(())
    }
}

fn into_chunks<T>(items: Vec<T>, size: usize) -> Vec<Vec<T>> {
    let mut chunks = Vec::with_capacity(items.len().div_ceil(size));
    let mut iter = items.into_iter().peekable();
    while iter.peek().is_some() {
        chunks.push(iter.by_ref().take(size).collect());
    }
    chunks
}

/// Run one collection for `kind` against `forge`.
pub async fn collect_resource(
    kind: ResourceKind,
    forge: Arc<dyn ForgeApi>,
    config: ManageInventoryConfig,
    publisher: Arc<dyn WorkflowClient>,
) -> InventoryResult<CollectSummary> {
    match kind {
        ResourceKind::Vpc => {
            InventoryCollector::new(VpcSource::new(forge), config, publisher)
                .collect_and_publish()
                .await
        }
        ResourceKind::Subnet => {
            InventoryCollector::new(SubnetSource::new(forge), config, publisher)
                .collect_and_publish()
                .await
        }
        ResourceKind::Instance => {
            InventoryCollector::new(InstanceSource::new(forge), config, publisher)
                .collect_and_publish()
                .await
        }
        ResourceKind::SshKeyGroup => {
            InventoryCollector::new(SshKeyGroupSource::new(forge), config, publisher)
                .collect_and_publish()
                .await
        }
    }
}
