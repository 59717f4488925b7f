//! routegridd — the routegrid daemon.
//!
//! Runs one cluster coordinator per process against a redb-backed routing
//! document, and offers offline subcommands that inspect or edit the same
//! document directly.
//!
//! # Usage
//!
//! ```text
//! routegridd run --config /etc/routegrid.toml --data-dir /var/lib/routegrid
//! routegridd routes --data-dir /var/lib/routegrid
//! routegridd assign session-42 --type session --data-dir /var/lib/routegrid
//! routegridd unassign session-42 --data-dir /var/lib/routegrid
//! ```

mod daemon;
mod offline;
mod reload;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use routegrid_state::RouteState;

#[derive(Parser)]
#[command(name = "routegridd", about = "routegrid cluster coordinator daemon")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Join the cluster and keep heartbeating until interrupted.
    Run {
        /// Path to routegrid.toml.
        #[arg(long)]
        config: PathBuf,

        /// Data directory for the routing database.
        #[arg(long, default_value = "/var/lib/routegrid")]
        data_dir: PathBuf,

        /// How often the config file is re-read, in seconds.
        #[arg(long, default_value = "10")]
        reload_interval_secs: u64,
    },

    /// Print the stored routing table as JSON.
    Routes {
        #[arg(long, default_value = "/var/lib/routegrid")]
        data_dir: PathBuf,

        /// Optional routegrid.toml for the store path and document key.
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Assign a resource to a node.
    Assign {
        resource: String,

        /// Resource type recorded with the route.
        #[arg(long = "type")]
        resource_type: String,

        #[arg(long, default_value = "started")]
        state: RouteState,

        /// Owning node id, normally a running routegridd's node id.
        #[arg(long)]
        owner: String,

        #[arg(long, default_value = "/var/lib/routegrid")]
        data_dir: PathBuf,

        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Remove a resource from the routing table.
    Unassign {
        resource: String,

        #[arg(long, default_value = "/var/lib/routegrid")]
        data_dir: PathBuf,

        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn init_tracing(json: bool) -> anyhow::Result<()> {
    let filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => "info,routegridd=debug,routegrid=debug".parse()?,
    };
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json)?;

    match cli.command {
        Command::Run {
            config,
            data_dir,
            reload_interval_secs,
        } => daemon::run(config, data_dir, reload_interval_secs).await,
        Command::Routes { data_dir, config } => {
            let store = offline::OfflineStore::open(&data_dir, config.as_deref())?;
            offline::print_routes(&store).await
        }
        Command::Assign {
            resource,
            resource_type,
            state,
            owner,
            data_dir,
            config,
        } => {
            let store = offline::OfflineStore::open(&data_dir, config.as_deref())?;
            offline::assign(&store, &resource, &resource_type, state, &owner).await
        }
        Command::Unassign {
            resource,
            data_dir,
            config,
        } => {
            let store = offline::OfflineStore::open(&data_dir, config.as_deref())?;
            offline::unassign(&store, &resource).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assign_requires_an_owner() {
        let err = Cli::try_parse_from(["routegridd", "assign", "res-1", "--type", "session"])
            .err()
            .expect("assign without --owner must be rejected");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn assign_parses_owner_and_state() {
        let cli = Cli::try_parse_from([
            "routegridd", "assign", "res-1", "--type", "session", "--owner", "node-a", "--state",
            "initializing",
        ])
        .unwrap();
        match cli.command {
            Command::Assign { owner, state, .. } => {
                assert_eq!(owner, "node-a");
                assert_eq!(state, RouteState::Initializing);
            }
            _ => panic!("expected assign"),
        }
    }
}
