//! Volume manager binary

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use volmgr::common::{Config, SpreadPolicy, StoreBackend};
use volmgr::ManagerServer;

#[derive(Parser)]
#[command(name = "volmgr-server")]
#[command(about = "volmgr block-storage metadata manager")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the volume manager
    Serve {
        /// TOML config file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Bind address for HTTP
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Database directory
        #[arg(long)]
        db: Option<PathBuf>,

        /// Keep metadata in memory only
        #[arg(long)]
        memory: bool,

        /// Capacity units per block
        #[arg(long)]
        block_size: Option<u64>,

        /// Blocks per group
        #[arg(long)]
        replicas: Option<usize>,

        /// Fail groups that cannot span distinct hosts
        #[arg(long)]
        strict_spread: bool,

        /// Re-enable a host's blocks when it reports healthy again
        #[arg(long)]
        reenable_on_recovery: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            bind,
            db,
            memory,
            block_size,
            replicas,
            strict_spread,
            reenable_on_recovery,
        } => {
            // File and environment first, CLI flags win
            let mut config = Config::load(config.as_deref())?;
            let manager = &mut config.manager;
            if let Some(bind) = bind {
                manager.bind_addr = bind;
            }
            if let Some(db) = db {
                manager.db_path = db;
            }
            if memory {
                manager.backend = StoreBackend::Memory;
            }
            if let Some(block_size) = block_size {
                manager.block_size = block_size;
            }
            if let Some(replicas) = replicas {
                manager.replicas = replicas;
            }
            if strict_spread {
                manager.spread = SpreadPolicy::Strict;
            }
            if reenable_on_recovery {
                manager.reenable_on_recovery = true;
            }

            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| config.log_level.clone().into()),
                )
                .with(tracing_subscriber::fmt::layer())
                .init();

            let server = ManagerServer::new(config.manager)?;
            server.serve().await?;
        }
    }

    Ok(())
}
