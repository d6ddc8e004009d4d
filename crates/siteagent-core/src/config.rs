//! siteagent.toml configuration parser.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::types::ResourceKind;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub site: SiteConfig,
    #[serde(default)]
    pub carbide: CarbideConfig,
    #[serde(default)]
    pub inventory: InventoryConfig,
    #[serde(default)]
    pub state: StateConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    pub id: Uuid,
}

/// Site controller connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CarbideConfig {
    pub address: String,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for CarbideConfig {
    fn default() -> Self {
        Self {
            address: "http://127.0.0.1:1079".to_string(),
            connect_timeout_secs: 5,
            request_timeout_secs: 30,
        }
    }
}

impl CarbideConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Inventory collection and publishing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryConfig {
    /// Task queue inventory pages are published to.
    pub publish_queue: String,
    /// Records hydrated per site controller call.
    pub site_page_size: usize,
    /// Records per published page.
    pub cloud_page_size: usize,
    pub interval_secs: u64,
    pub resources: Vec<ResourceKind>,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            publish_queue: "cloud".to_string(),
            site_page_size: 100,
            cloud_page_size: 25,
            interval_secs: 180,
            resources: ResourceKind::ALL.to_vec(),
        }
    }
}

impl InventoryConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    pub data_dir: PathBuf,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/var/lib/siteagent"),
        }
    }
}

impl StateConfig {
    /// Path of the redb database file.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("siteagent.redb")
    }
}

impl AgentConfig {
    /// Read, parse and validate a config file.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse and validate a config document.
    pub fn parse(content: &str) -> ConfigResult<Self> {
        let config: AgentConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.carbide.address.trim().is_empty() {
            return Err(ConfigError::Invalid("carbide.address must not be empty".into()));
        }
        if self.inventory.publish_queue.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "inventory.publish_queue must not be empty".into(),
            ));
        }
        if self.inventory.site_page_size == 0 {
            return Err(ConfigError::Invalid(
                "inventory.site_page_size must be at least 1".into(),
            ));
        }
        if self.inventory.cloud_page_size == 0 {
            return Err(ConfigError::Invalid(
                "inventory.cloud_page_size must be at least 1".into(),
            ));
        }
        // Page numbers run on across site pages, so a partial cloud page at
        // the end of a full site page would push current_page past total_pages.
        if self.inventory.site_page_size % self.inventory.cloud_page_size != 0 {
            return Err(ConfigError::Invalid(format!(
                "inventory.site_page_size ({}) must be a multiple of inventory.cloud_page_size ({})",
                self.inventory.site_page_size, self.inventory.cloud_page_size
            )));
        }
        if self.inventory.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "inventory.interval_secs must be at least 1".into(),
            ));
        }
        let mut seen = HashSet::new();
        for kind in &self.inventory.resources {
            if !seen.insert(kind) {
                return Err(ConfigError::Invalid(format!(
                    "inventory.resources lists {kind} more than once"
                )));
            }
        }
        Ok(())
    }
}
