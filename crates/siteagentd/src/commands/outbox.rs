//! `siteagentd outbox`: inspect recorded workflow executions.

use std::path::Path;

use anyhow::bail;
use clap::Subcommand;
use serde_json::{Value, json};
use siteagent_state::StateStore;

use super::{open_store, print_json};

#[derive(Subcommand)]
pub enum OutboxAction {
    /// List pending executions, oldest workflow ID first.
    List {
        /// Only workflow IDs starting with this prefix.
        #[arg(long, default_value = "")]
        prefix: String,
        /// Include payloads in the listing.
        #[arg(long)]
        payload: bool,
    },
    /// Show one execution with its payload.
    Show { workflow_id: String },
    /// Acknowledge delivery of an execution and remove it.
    Ack { workflow_id: String },
}

pub fn run(data_dir: &Path, action: OutboxAction) -> anyhow::Result<()> {
    let store = open_store(data_dir)?;
    let output = execute(&store, action)?;
    print_json(&output)
}

fn execute(store: &StateStore, action: OutboxAction) -> anyhow::Result<Value> {
    match action {
        OutboxAction::List { prefix, payload } => {
            let entries = store.list_outbox_entries(&prefix)?;
            let rows: Vec<Value> = entries
                .into_iter()
                .map(|entry| {
                    let mut row = json!({
                        "workflow_id": entry.workflow_id,
                        "run_id": entry.run_id,
                        "workflow_name": entry.workflow_name,
                        "task_queue": entry.task_queue,
                        "site_id": entry.site_id,
                        "created_at": entry.created_at,
                    });
                    if payload {
                        row["payload"] = entry.payload;
                    }
                    row
                })
                .collect();
            Ok(Value::Array(rows))
        }
        OutboxAction::Show { workflow_id } => match store.get_outbox_entry(&workflow_id)? {
            Some(entry) => Ok(serde_json::to_value(entry)?),
            None => bail!("no outbox entry for workflow {workflow_id}"),
        },
        OutboxAction::Ack { workflow_id } => {
            if !store.delete_outbox_entry(&workflow_id)? {
                bail!("no outbox entry for workflow {workflow_id}");
            }
            Ok(json!({ "acknowledged": workflow_id }))
        }
    }
}
