//! Shared types used across site agent crates.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Resource types the agent collects inventory for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Vpc,
    Subnet,
    Instance,
    SshKeyGroup,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Vpc,
        ResourceKind::Subnet,
        ResourceKind::Instance,
        ResourceKind::SshKeyGroup,
    ];

    /// Name as written in `siteagent.toml`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Vpc => "vpc",
            ResourceKind::Subnet => "subnet",
            ResourceKind::Instance => "instance",
            ResourceKind::SshKeyGroup => "ssh_key_group",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
