pub mod ipam;
pub mod outbox;

use std::path::Path;

use siteagent_core::StateConfig;
use siteagent_state::StateStore;

/// Open the state store under `data_dir`, the same file `run` uses.
fn open_store(data_dir: &Path) -> anyhow::Result<StateStore> {
    let state = StateConfig {
        data_dir: data_dir.to_path_buf(),
    };
    std::fs::create_dir_all(&state.data_dir)?;
    Ok(StateStore::open(&state.db_path())?)
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
