//! siteagentd: the site agent daemon.
//!
//! Runs inventory collection against the local site controller and
//! records every published page in the redb outbox. Also carries the
//! administration commands for IP blocks and the outbox.
//!
//! # Usage
//!
//! ```text
//! siteagentd run --config /etc/siteagent/siteagent.toml
//! siteagentd ipam create-block --name overlay --site <uuid> --provider <uuid> --cidr 10.0.0.0/16
//! siteagentd outbox list --prefix update-vpc-inventory-
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod agent;
mod commands;

use commands::ipam::IpamAction;
use commands::outbox::OutboxAction;

#[derive(Parser)]
#[command(name = "siteagentd", about = "Site agent daemon", version)]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Collect and publish site inventory on an interval until Ctrl-C.
    Run {
        /// Agent configuration file.
        #[arg(short, long, default_value = "/etc/siteagent/siteagent.toml")]
        config: PathBuf,

        /// Override `state.data_dir` from the config.
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Run a single collection pass and exit.
        #[arg(long)]
        once: bool,
    },

    /// Administer IP blocks and their allocations.
    Ipam {
        /// Data directory holding the state store.
        #[arg(long, default_value = "/var/lib/siteagent")]
        data_dir: PathBuf,

        #[command(subcommand)]
        action: IpamAction,
    },

    /// Inspect and acknowledge recorded workflow executions.
    Outbox {
        /// Data directory holding the state store.
        #[arg(long, default_value = "/var/lib/siteagent")]
        data_dir: PathBuf,

        #[command(subcommand)]
        action: OutboxAction,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Run {
            config,
            data_dir,
            once,
        } => agent::run_agent(&config, data_dir, once).await,
        Command::Ipam { data_dir, action } => commands::ipam::run(&data_dir, action),
        Command::Outbox { data_dir, action } => commands::outbox::run(&data_dir, action),
    }
}

/// Logs go to stderr so command output on stdout stays machine-readable.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,siteagent=debug"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
