//! `siteagentd ipam`: IP block administration through the full-grant layer.

use std::path::Path;

use anyhow::{Context, bail};
use clap::Subcommand;
use serde_json::{Value, json};
use siteagent_state::ipam::parse_cidr;
use siteagent_state::{IpBlock, IpBlockIpam, RoutingType, StateStore};
use uuid::Uuid;

use super::{open_store, print_json};

#[derive(Subcommand)]
pub enum IpamAction {
    /// Register an IP block and its allocator entry.
    CreateBlock {
        #[arg(long)]
        name: String,
        #[arg(long)]
        site: Uuid,
        #[arg(long)]
        provider: Uuid,
        /// Block CIDR; host bits are masked off.
        #[arg(long)]
        cidr: String,
        /// Public or DatacenterOnly.
        #[arg(long, default_value = "DatacenterOnly")]
        routing_type: RoutingType,
        #[arg(long)]
        tenant: Option<Uuid>,
    },
    /// Remove an IP block. Fails while it has allocations.
    DeleteBlock {
        #[arg(long)]
        id: Uuid,
    },
    /// Allocate a child prefix. The block's own length is a full grant.
    Allocate {
        #[arg(long)]
        block: Uuid,
        #[arg(long)]
        length: u8,
    },
    /// Release a child prefix, or the full grant when given the block's CIDR.
    Release {
        #[arg(long)]
        block: Uuid,
        #[arg(long)]
        cidr: String,
    },
    /// Show allocation usage of a block.
    Usage {
        #[arg(long)]
        id: Uuid,
    },
    /// List all IP blocks.
    List,
}

pub fn run(data_dir: &Path, action: IpamAction) -> anyhow::Result<()> {
    let store = open_store(data_dir)?;
    let output = execute(&store, action)?;
    print_json(&output)
}

fn execute(store: &StateStore, action: IpamAction) -> anyhow::Result<Value> {
    let ipam = IpBlockIpam::new(store, store);

    match action {
        IpamAction::CreateBlock {
            name,
            site,
            provider,
            cidr,
            routing_type,
            tenant,
        } => {
            let (prefix, length) = parse_cidr(&cidr)?;
            let mut block = IpBlock::new(name, site, provider, routing_type, prefix, length);
            block.tenant_id = tenant;
            ipam.create_namespaced_entry(&block)
                .with_context(|| format!("failed to register {}", block.cidr()))?;
            store.put_ip_block(&block)?;
            Ok(serde_json::to_value(&block)?)
        }
        IpamAction::DeleteBlock { id } => {
            let block = load(store, &id)?;
            ipam.delete_namespaced_entry(&block)?;
            store.delete_ip_block(&id)?;
            Ok(json!({ "deleted": id }))
        }
        IpamAction::Allocate { block, length } => {
            let mut parent = load(store, &block)?;
            let prefix = ipam.create_child_entry(Some(&mut parent), length)?;
            Ok(json!({
                "block": parent.id,
                "cidr": prefix.cidr,
                "full_grant": parent.full_grant,
            }))
        }
        IpamAction::Release { block, cidr } => {
            let mut parent = load(store, &block)?;
            ipam.delete_child_entry(Some(&mut parent), cidr.trim())?;
            Ok(json!({
                "block": parent.id,
                "released": cidr.trim(),
                "full_grant": parent.full_grant,
            }))
        }
        IpamAction::Usage { id } => {
            let block = load(store, &id)?;
            let usage = ipam.usage(Some(&block))?;
            Ok(serde_json::to_value(&usage)?)
        }
        IpamAction::List => Ok(serde_json::to_value(store.list_ip_blocks()?)?),
    }
}

fn load(store: &StateStore, id: &Uuid) -> anyhow::Result<IpBlock> {
    match store.get_ip_block(id)? {
        Some(block) => Ok(block),
        None => bail!("IP block {id} not found"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create(store: &StateStore, cidr: &str) -> Uuid {
        let out = execute(
            store,
            IpamAction::CreateBlock {
                name: "overlay".to_string(),
                site: Uuid::new_v4(),
                provider: Uuid::new_v4(),
                cidr: cidr.to_string(),
                routing_type: RoutingType::DatacenterOnly,
                tenant: None,
            },
        )
        .unwrap();
        serde_json::from_value(out["id"].clone()).unwrap()
    }

    #[test]
    fn create_allocate_release_delete() {
        let store = StateStore::open_in_memory().unwrap();
        let id = create(&store, "10.1.2.3/16");
        let block = store.get_ip_block(&id).unwrap().unwrap();
        assert_eq!(block.prefix, "10.1.0.0");
        assert_eq!(block.prefix_length, 16);

        let out = execute(&store, IpamAction::Allocate { block: id, length: 24 }).unwrap();
        assert_eq!(out["cidr"], "10.1.0.0/24");
        assert_eq!(out["full_grant"], false);

        let usage = execute(&store, IpamAction::Usage { id }).unwrap();
        assert_eq!(usage["acquired_prefixes"], 1);

        // Allocations block deletion.
        assert!(execute(&store, IpamAction::DeleteBlock { id }).is_err());

        execute(
            &store,
            IpamAction::Release {
                block: id,
                cidr: "10.1.0.0/24".to_string(),
            },
        )
        .unwrap();
        execute(&store, IpamAction::DeleteBlock { id }).unwrap();
        assert!(store.get_ip_block(&id).unwrap().is_none());
    }

    #[test]
    fn full_grant_round_trip() {
        let store = StateStore::open_in_memory().unwrap();
        let id = create(&store, "192.168.10.0/24");

        let out = execute(&store, IpamAction::Allocate { block: id, length: 24 }).unwrap();
        assert_eq!(out["cidr"], "192.168.10.0/24");
        assert_eq!(out["full_grant"], true);
        assert!(store.get_ip_block(&id).unwrap().unwrap().full_grant);

        let usage = execute(&store, IpamAction::Usage { id }).unwrap();
        assert_eq!(usage["acquired_prefixes"], 1);
        assert_eq!(usage["available_ips"], 0);

        // A second allocation on a full grant is refused.
        assert!(execute(&store, IpamAction::Allocate { block: id, length: 26 }).is_err());

        execute(
            &store,
            IpamAction::Release {
                block: id,
                cidr: "192.168.10.0/24".to_string(),
            },
        )
        .unwrap();
        assert!(!store.get_ip_block(&id).unwrap().unwrap().full_grant);
    }

    #[test]
    fn overlapping_blocks_in_one_namespace_are_refused() {
        let store = StateStore::open_in_memory().unwrap();
        let site = Uuid::new_v4();
        let provider = Uuid::new_v4();
        let action = |cidr: &str| IpamAction::CreateBlock {
            name: "b".to_string(),
            site,
            provider,
            cidr: cidr.to_string(),
            routing_type: RoutingType::Public,
            tenant: None,
        };
        execute(&store, action("10.0.0.0/16")).unwrap();
        assert!(execute(&store, action("10.0.128.0/17")).is_err());
        assert_eq!(store.list_ip_blocks().unwrap().len(), 1);
    }

    #[test]
    fn unknown_block_is_reported() {
        let store = StateStore::open_in_memory().unwrap();
        let err = execute(&store, IpamAction::Usage { id: Uuid::nil() }).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
