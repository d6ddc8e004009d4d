pub mod config;
pub mod types;

pub use config::{
    AgentConfig, CarbideConfig, ConfigError, ConfigResult, InventoryConfig, SiteConfig,
    StateConfig,
};
pub use types::ResourceKind;
