//! siteagent-workflow: site agent activities.
//!
//! # Architecture
//!
//! ```text
//! inventory
//!   ├── InventorySource      per-resource view of the site controller
//!   │     Vpc, Subnet, Instance, SSHKeyGroup
//!   └── InventoryCollector   enumerate → hydrate → paginate → publish
//!
//! manage                     validated create/delete/release activities
//!
//! publish
//!   ├── WorkflowClient       execute_workflow(options, name, site, payload)
//!   └── OutboxPublisher      records executions in the redb outbox
//! ```

pub mod inventory;
pub mod manage;
pub mod page;
pub mod publish;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use inventory::{
    CollectSummary, InventoryCollector, InventoryError, InventoryResult, InventorySource,
    ManageInventoryConfig, collect_resource,
};
pub use manage::{ManageInstance, ManageVpc};
pub use page::{InventoryPage, InventoryStatus, PagedInventoryInput, total_pages};
pub use publish::{
    IdConflictPolicy, OutboxPublisher, PublishError, StartWorkflowOptions, WorkflowClient,
    WorkflowRun,
};
