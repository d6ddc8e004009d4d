//! Inventory agent: periodically collects every configured resource type
//! from the site controller and publishes it to the cloud.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use siteagent_carbide::{CarbideClient, ForgeApi};
use siteagent_core::{AgentConfig, ResourceKind};
use siteagent_state::StateStore;
use siteagent_workflow::{
    IdConflictPolicy, ManageInventoryConfig, OutboxPublisher, WorkflowClient, collect_resource,
};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// Drives inventory collection for one site.
pub struct InventoryAgent {
    forge: Arc<dyn ForgeApi>,
    publisher: Arc<dyn WorkflowClient>,
    inventory: ManageInventoryConfig,
    resources: Vec<ResourceKind>,
    interval: Duration,
}

impl InventoryAgent {
    pub fn new(
        config: &AgentConfig,
        forge: Arc<dyn ForgeApi>,
        publisher: Arc<dyn WorkflowClient>,
    ) -> Self {
        let inventory = ManageInventoryConfig {
            site_id: config.site.id.to_string(),
            publish_queue: config.inventory.publish_queue.clone(),
            site_page_size: config.inventory.site_page_size,
            cloud_page_size: config.inventory.cloud_page_size,
        };
        Self {
            forge,
            publisher,
            inventory,
            resources: config.inventory.resources.clone(),
            interval: config.inventory.interval(),
        }
    }

    /// Collect every configured resource once. Returns the number of
    /// collections that failed.
    pub async fn collect_all(&self) -> usize {
        let mut failures = 0;
        for &kind in &self.resources {
            let result = collect_resource(
                kind,
                self.forge.clone(),
                self.inventory.clone(),
                self.publisher.clone(),
            )
            .await;
            match result {
                Ok(summary) => info!(
                    resource = %kind,
                    total_items = summary.total_items,
                    pages = summary.pages_published,
                    fallback = summary.used_fallback,
                    "inventory collected"
                ),
                Err(e) => {
                    failures += 1;
                    warn!(resource = %kind, error = %e, "inventory collection failed");
                }
            }
        }
        failures
    }

    /// Collect on every interval tick until shutdown is signalled. The
    /// first pass starts immediately.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            resources = self.resources.len(),
            "inventory agent started"
        );
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let failures = self.collect_all().await;
                    if failures > 0 {
                        warn!(failures, "inventory pass finished with failures");
                    }
                }
                _ = shutdown.changed() => {
                    info!("inventory agent shutting down");
                    break;
                }
            }
        }
    }
}

/// Entry point of `siteagentd run`.
pub async fn run_agent(
    config_path: &Path,
    data_dir: Option<PathBuf>,
    once: bool,
) -> anyhow::Result<()> {
    let mut config = AgentConfig::from_file(config_path)?;
    if let Some(dir) = data_dir {
        config.state.data_dir = dir;
    }
    info!(site_id = %config.site.id, "site agent starting");

    std::fs::create_dir_all(&config.state.data_dir)?;
    let db_path = config.state.db_path();
    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    let forge = CarbideClient::connect_lazy(
        &config.carbide.address,
        config.carbide.connect_timeout(),
        config.carbide.request_timeout(),
    )?;
    info!(address = %config.carbide.address, "site controller client ready");

    // Pages not yet relayed to the cloud are superseded by newer snapshots.
    let publisher =
        OutboxPublisher::new(store).with_policy(IdConflictPolicy::ReplacePending);
    let agent = InventoryAgent::new(&config, Arc::new(forge), Arc::new(publisher));

    if once {
        let failures = agent.collect_all().await;
        if failures > 0 {
            anyhow::bail!("{failures} inventory collection(s) failed");
        }
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(async move {
        agent.run(shutdown_rx).await;
    });

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);
    let _ = handle.await;

    info!("site agent stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use siteagent_carbide::Status;
    use siteagent_workflow::testing::{FakeForge, RecordingPublisher};

    use super::*;

    fn config(resources: &str) -> AgentConfig {
        AgentConfig::parse(&format!(
            "[site]\nid = \"0b7f7f64-7c9e-4c4b-9f57-3f7f2b9cf1aa\"\n\
             [inventory]\ncloud_page_size = 10\nresources = [{resources}]\n"
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn collect_all_covers_every_resource() {
        let forge = Arc::new(
            FakeForge::new()
                .with_vpcs(12)
                .with_segments(3)
                .with_instances(0)
                .with_keysets(1),
        );
        let publisher = Arc::new(RecordingPublisher::new());
        let agent = InventoryAgent::new(
            &config(r#""vpc", "subnet", "instance", "ssh_key_group""#),
            forge,
            publisher.clone(),
        );

        assert_eq!(agent.collect_all().await, 0);
        let site = "0b7f7f64-7c9e-4c4b-9f57-3f7f2b9cf1aa";
        assert_eq!(
            publisher.workflow_ids(),
            vec![
                format!("update-vpc-inventory-{site}-1"),
                format!("update-vpc-inventory-{site}-2"),
                format!("update-subnet-inventory-{site}-1"),
                format!("update-instance-inventory-{site}"),
                format!("update-sshkeygroup-inventory-{site}-1"),
            ]
        );
    }

    #[tokio::test]
    async fn one_failing_resource_does_not_stop_the_pass() {
        let forge = Arc::new(
            FakeForge::new()
                .with_keysets(2)
                .fail("FindVpcIds", Status::internal("down")),
        );
        let publisher = Arc::new(RecordingPublisher::new());
        let agent = InventoryAgent::new(
            &config(r#""vpc", "ssh_key_group""#),
            forge,
            publisher.clone(),
        );

        assert_eq!(agent.collect_all().await, 1);
        let calls = publisher.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].payload["inventory_status"], "FAILED");
        assert_eq!(calls[1].payload["inventory_status"], "SUCCESS");
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let forge = Arc::new(FakeForge::new().with_vpcs(1));
        let publisher = Arc::new(RecordingPublisher::new());
        let agent = InventoryAgent::new(&config(r#""vpc""#), forge, publisher.clone());

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { agent.run(rx).await });

        // The first tick fires immediately.
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(publisher.calls().len(), 1);
    }
}
