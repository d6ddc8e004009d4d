//! Workflow execution against the cloud.
//!
//! Activities hand each message to a [`WorkflowClient`]. The agent's
//! client is [`OutboxPublisher`], which records executions in the redb
//! outbox for a relay to deliver.

use async_trait::async_trait;
use serde_json::Value;
use siteagent_state::{OutboxEntry, StateError, StateStore};
use thiserror::Error;
use tracing::{debug, info};

/// Options for starting one workflow execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartWorkflowOptions {
    pub id: String,
    pub task_queue: String,
}

/// Handle to a started execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowRun {
    pub workflow_id: String,
    pub run_id: String,
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("workflow {0} is already started")]
    AlreadyStarted(String),

    #[error("workflow {workflow_id} rejected: {reason}")]
    Rejected { workflow_id: String, reason: String },

    #[error("outbox write failed: {0}")]
    Store(#[from] StateError),
}

/// Starts named workflows on the cloud side.
#[async_trait]
pub trait WorkflowClient: Send + Sync {
    /// Start `workflow_name` with arguments `(site_id, payload)`.
    async fn execute_workflow(
        &self,
        options: StartWorkflowOptions,
        workflow_name: &str,
        site_id: &str,
        payload: Value,
    ) -> Result<WorkflowRun, PublishError>;

    /// Called once before a collection run publishes under `base_id`, either
    /// as `base_id` itself or as `<base_id>-<n>`.
    async fn begin_run(&self, base_id: &str) -> Result<(), PublishError> {
        let _ = base_id;
        Ok(())
    }
}

/// What to do when a pending execution already holds the workflow ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdConflictPolicy {
    /// Refuse with [`PublishError::AlreadyStarted`].
    #[default]
    Fail,
    /// Supersede undelivered executions. A new collection run drops every
    /// pending page of the previous run for the same base ID.
    ReplacePending,
}

/// [`WorkflowClient`] that records executions in the state store outbox.
#[derive(Clone)]
pub struct OutboxPublisher {
    store: StateStore,
    policy: IdConflictPolicy,
}

impl OutboxPublisher {
    pub fn new(store: StateStore) -> Self {
        Self {
            store,
            policy: IdConflictPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: IdConflictPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }
}

#[async_trait]
impl WorkflowClient for OutboxPublisher {
    async fn execute_workflow(
        &self,
        options: StartWorkflowOptions,
        workflow_name: &str,
        site_id: &str,
        payload: Value,
    ) -> Result<WorkflowRun, PublishError> {
        if options.id.is_empty() || options.task_queue.is_empty() {
            return Err(PublishError::Rejected {
                workflow_id: options.id,
                reason: "workflow ID and task queue are required".to_string(),
            });
        }
        let entry = OutboxEntry::new(
            options.id,
            options.task_queue,
            workflow_name,
            site_id,
            payload,
        );

        match self.policy {
            IdConflictPolicy::Fail => {
                self.store.insert_outbox_entry(&entry).map_err(|e| match e {
                    StateError::AlreadyExists(_) => {
                        PublishError::AlreadyStarted(entry.workflow_id.clone())
                    }
                    other => PublishError::Store(other),
                })?;
            }
            IdConflictPolicy::ReplacePending => {
                if let Some(previous) = self.store.replace_outbox_entry(&entry)? {
                    info!(
                        workflow_id = %entry.workflow_id,
                        superseded_run = %previous.run_id,
                        "superseded undelivered workflow execution"
                    );
                }
            }
        }

        debug!(
            workflow_id = %entry.workflow_id,
            run_id = %entry.run_id,
            workflow = workflow_name,
            queue = %entry.task_queue,
            "workflow execution recorded"
        );
        Ok(WorkflowRun {
            workflow_id: entry.workflow_id,
            run_id: entry.run_id,
        })
    }

    async fn begin_run(&self, base_id: &str) -> Result<(), PublishError> {
        if self.policy != IdConflictPolicy::ReplacePending {
            return Ok(());
        }
        let mut superseded = usize::from(self.store.delete_outbox_entry(base_id)?);
        superseded += self.store.delete_outbox_entries(&format!("{base_id}-"))?;
        if superseded > 0 {
            info!(%base_id, superseded, "superseded undelivered pages of previous run");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn options(id: &str) -> StartWorkflowOptions {
        StartWorkflowOptions {
            id: id.to_string(),
            task_queue: "cloud".to_string(),
        }
    }

    #[tokio::test]
    async fn records_execution_in_outbox() {
        let store = StateStore::open_in_memory().unwrap();
        let publisher = OutboxPublisher::new(store.clone());

        let run = publisher
            .execute_workflow(options("wf-1"), "UpdateVpcInventory", "site-1", json!({"n": 1}))
            .await
            .unwrap();
        assert_eq!(run.workflow_id, "wf-1");

        let entry = store.get_outbox_entry("wf-1").unwrap().unwrap();
        assert_eq!(entry.run_id, run.run_id);
        assert_eq!(entry.workflow_name, "UpdateVpcInventory");
        assert_eq!(entry.site_id, "site-1");
        assert_eq!(entry.task_queue, "cloud");
        assert_eq!(entry.payload, json!({"n": 1}));
    }

    #[tokio::test]
    async fn duplicate_id_is_already_started() {
        let publisher = OutboxPublisher::new(StateStore::open_in_memory().unwrap());
        publisher
            .execute_workflow(options("wf-1"), "W", "s", json!(null))
            .await
            .unwrap();
        let err = publisher
            .execute_workflow(options("wf-1"), "W", "s", json!(null))
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::AlreadyStarted(id) if id == "wf-1"));
    }

    #[tokio::test]
    async fn replace_pending_supersedes() {
        let store = StateStore::open_in_memory().unwrap();
        let publisher =
            OutboxPublisher::new(store.clone()).with_policy(IdConflictPolicy::ReplacePending);
        let first = publisher
            .execute_workflow(options("wf-1"), "W", "s", json!(1))
            .await
            .unwrap();
        let second = publisher
            .execute_workflow(options("wf-1"), "W", "s", json!(2))
            .await
            .unwrap();
        assert_ne!(first.run_id, second.run_id);

        let entry = store.get_outbox_entry("wf-1").unwrap().unwrap();
        assert_eq!(entry.payload, json!(2));
        assert_eq!(entry.run_id, second.run_id);
    }

    #[tokio::test]
    async fn begin_run_drops_previous_pages_only_under_replace_pending() {
        let store = StateStore::open_in_memory().unwrap();
        for id in ["inv-s", "inv-s-1", "inv-s-2", "other-s-1"] {
            OutboxPublisher::new(store.clone())
                .execute_workflow(options(id), "W", "s", json!(null))
                .await
                .unwrap();
        }

        OutboxPublisher::new(store.clone()).begin_run("inv-s").await.unwrap();
        assert_eq!(store.list_outbox_entries("").unwrap().len(), 4);

        OutboxPublisher::new(store.clone())
            .with_policy(IdConflictPolicy::ReplacePending)
            .begin_run("inv-s")
            .await
            .unwrap();
        let remaining: Vec<String> = store
            .list_outbox_entries("")
            .unwrap()
            .into_iter()
            .map(|e| e.workflow_id)
            .collect();
        assert_eq!(remaining, vec!["other-s-1"]);
    }

    #[tokio::test]
    async fn empty_workflow_id_is_rejected() {
        let store = StateStore::open_in_memory().unwrap();
        let err = OutboxPublisher::new(store.clone())
            .execute_workflow(options(""), "W", "s", json!(null))
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Rejected { .. }));
        assert!(store.list_outbox_entries("").unwrap().is_empty());
    }
}
