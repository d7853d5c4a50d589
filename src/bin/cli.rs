//! CLI for the volume manager

use anyhow::bail;
use clap::{Parser, Subcommand};
use uuid::Uuid;
use volmgr::api::{CreateVolumeRequest, HeartbeatRequest, RegisterDiskRequest};
use volmgr::common::Status;
use volmgr::ManagerClient;

#[derive(Parser)]
#[command(name = "volmgr")]
#[command(about = "volmgr block-storage metadata CLI")]
#[command(version)]
struct Cli {
    /// Volume manager URL
    #[arg(long, default_value = "http://localhost:10001")]
    manager: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a datanode disk
    Register {
        #[arg(long)]
        host: String,

        #[arg(long)]
        port: u16,

        /// Mount path
        #[arg(long)]
        mount: String,

        /// Capacity in block-size units
        #[arg(long)]
        capacity: i64,
    },

    /// Send a heartbeat for a datanode
    Heartbeat {
        #[arg(long)]
        host: String,

        #[arg(long)]
        port: u16,

        #[arg(long)]
        used: i64,

        #[arg(long)]
        free: i64,

        /// 0 = healthy, anything else is a fault code
        #[arg(long, default_value = "0")]
        status: u32,
    },

    /// Create a volume
    Create {
        /// Volume name
        name: String,

        #[arg(long)]
        quota: i64,
    },

    /// Show a volume's block-group topology
    Info {
        /// Volume UUID
        uuid: Uuid,
    },

    /// List volumes
    Volumes,

    /// List disks
    Disks,

    /// Show pool status
    Status,
}

fn check(status: u32, error: Option<String>) -> anyhow::Result<()> {
    let status = Status::from_code(status)
        .ok_or_else(|| anyhow::anyhow!("unknown status code {}", status))?;
    if !status.is_ok() {
        bail!("{}: {}", status, error.unwrap_or_default());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let client = ManagerClient::new(cli.manager)?;

    match cli.command {
        Commands::Register {
            host,
            port,
            mount,
            capacity,
        } => {
            let resp = client
                .register_disk(&RegisterDiskRequest {
                    host_ip: host,
                    port,
                    mount_path: mount,
                    capacity,
                    timeout_ms: None,
                })
                .await?;
            check(resp.status, resp.error)?;
            if resp.first_block_id == 0 {
                println!("Registered (capacity below one block, no blocks)");
            } else {
                println!(
                    "Registered blocks {}..={}",
                    resp.first_block_id, resp.last_block_id
                );
            }
        }

        Commands::Heartbeat {
            host,
            port,
            used,
            free,
            status,
        } => {
            let resp = client
                .report_heartbeat(&HeartbeatRequest {
                    host_ip: host,
                    port,
                    used,
                    free,
                    status,
                    timeout_ms: None,
                })
                .await?;
            check(resp.status, resp.error)?;
            println!("Heartbeat acknowledged");
        }

        Commands::Create { name, quota } => {
            let resp = client
                .create_volume(&CreateVolumeRequest {
                    name,
                    quota,
                    timeout_ms: None,
                })
                .await?;
            check(resp.status, resp.error)?;
            if let Some(uuid) = resp.volume_uuid {
                println!("{}", uuid);
            }
        }

        Commands::Info { uuid } => {
            let resp = client.get_volume_info(&uuid).await?;
            check(resp.status, resp.error)?;
            println!("Volume {} ({})", resp.name, uuid);
            println!("  Quota: {}", resp.quota);
            for group in &resp.groups {
                let blocks: Vec<_> = group
                    .blocks
                    .iter()
                    .map(|b| format!("{}@{}:{}", b.block_id, b.host_ip, b.host_port))
                    .collect();
                println!("  Group {}: {}", group.group_id, blocks.join(", "));
            }
        }

        Commands::Volumes => {
            let resp = client.list_volumes().await?;
            check(resp.status, resp.error)?;
            for v in &resp.volumes {
                println!("{}  {}  quota={} groups={}", v.uuid, v.name, v.quota, v.group_count);
            }
        }

        Commands::Disks => {
            let resp = client.list_disks().await?;
            check(resp.status, resp.error)?;
            for d in &resp.disks {
                println!(
                    "{}:{}{}  total={} used={} free={} status={} blocks={}..={}",
                    d.host_ip,
                    d.port,
                    d.mount_path,
                    d.total,
                    d.used,
                    d.free,
                    d.status,
                    d.first_block_id,
                    d.last_block_id
                );
            }
        }

        Commands::Status => {
            let resp = client.status().await?;
            check(resp.status, resp.error)?;
            println!("Pool status:");
            println!("  Disks: {}", resp.disks);
            println!("  Volumes: {}", resp.volumes);
            println!("  Blocks total: {}", resp.pool.total_blocks);
            println!("  Free: {}", resp.pool.free_blocks);
            println!("  Allocated: {}", resp.pool.allocated_blocks);
            println!("  Disabled: {}", resp.pool.disabled_blocks);
            println!("  Block size: {}, replicas: {}", resp.block_size, resp.replicas);
        }
    }

    Ok(())
}
