use clap::{Parser, Subcommand};
use lan_share::core::config::{DISCOVERY_PORT, TRANSFER_PORT};
use lan_share::storage::{content_id, FileCatalog, DEFAULT_BLOCK_SIZE};
use lan_share::utils::setup_logging;
use lan_share::{Config, Node, P2PError, Result};
use log::info;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "lan-share")]
#[command(about = "Share files on a local network by content identifier")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a node and accept commands on stdin
    Start {
        /// Directory holding manifests and files
        #[arg(short, long, default_value = "./p2p-data")]
        data_dir: PathBuf,
        /// Port of the discovery (broadcast) channel
        #[arg(long, default_value_t = DISCOVERY_PORT)]
        discovery_port: u16,
        /// Port of the transfer channel
        #[arg(long, default_value_t = TRANSFER_PORT)]
        transfer_port: u16,
        /// Broadcast address for presence announcements
        #[arg(short, long, default_value_t = IpAddr::V4(Ipv4Addr::BROADCAST))]
        broadcast: IpAddr,
        /// Seconds between announcements
        #[arg(long, default_value_t = 2)]
        interval: u64,
        /// Block size used when sharing files
        #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE)]
        block_size: usize,
    },
    /// Publish a file into a data directory and print its identifier
    Share {
        path: PathBuf,
        #[arg(short, long, default_value = "./p2p-data")]
        data_dir: PathBuf,
        #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE)]
        block_size: usize,
    },
    /// Print the content identifier of a manifest file
    Hash { manifest: PathBuf },
}

enum Flow {
    Continue,
    Quit,
}

const HELP: &str = "commands:
  fingerprint <id>      request a file by content identifier
  block <id> <index>    request a single block
  share <path>          publish a local file
  files                 list known manifests
  peers                 list discovered peers
  downloads             show in-flight downloads
  hash <manifest-path>  print a manifest's content identifier
  quit";

async fn hash_manifest(path: &Path) -> Result<String> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| P2PError::IoError(format!("Failed to read {}: {}", path.display(), e)))?;
    Ok(content_id(&content))
}

async fn execute(node: &Node, line: &str) -> Result<Flow> {
    let parts: Vec<&str> = line.split_whitespace().collect();

    match parts.as_slice() {
        [] => {}
        ["fingerprint", file_id] => {
            let sent = node.client().request_fingerprint(file_id).await?;
            println!("Fingerprint request sent to {} peers", sent);
        }
        ["block", file_id, index] => {
            let index: usize = index
                .parse()
                .map_err(|_| P2PError::ConfigError(format!("invalid block index: {}", index)))?;
            let sent = node.client().request_block(file_id, index).await?;
            println!("Block request sent to {} peers", sent);
        }
        ["share", path] => {
            let file_id = node.catalog().publish(Path::new(path)).await?;
            println!("{}", file_id);
        }
        ["files"] => {
            for (file_id, manifest) in node.catalog().list().await? {
                println!(
                    "  {} - {} ({} blocks, {} bytes)",
                    file_id,
                    manifest.file_name(),
                    manifest.number_of_blocks(),
                    manifest.header.file_size
                );
            }
        }
        ["peers"] => {
            for record in node.peers().snapshot().await {
                println!(
                    "  {} - {} (seen {:?} ago)",
                    record.peer_id,
                    record.address,
                    record.last_seen.elapsed()
                );
            }
        }
        ["downloads"] => {
            let assembler = node.assembler().lock().await;
            for file_id in assembler.in_flight() {
                if let Some((received, total)) = assembler.progress(&file_id) {
                    println!("  {} - {}/{} blocks", file_id, received, total);
                }
            }
        }
        ["hash", path] => println!("{}", hash_manifest(Path::new(path)).await?),
        ["help"] => println!("{}", HELP),
        ["quit"] | ["exit"] => return Ok(Flow::Quit),
        _ => println!("unknown command, try `help`"),
    }

    Ok(Flow::Continue)
}

async fn run_prompt(node: &Node) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("node {}\n{}", node.id(), HELP);

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down");
                return Ok(());
            }
        };

        let Some(line) = line else {
            // stdin closed: keep serving until interrupted
            tokio::signal::ctrl_c().await?;
            return Ok(());
        };

        match execute(node, line.trim()).await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Quit) => return Ok(()),
            Err(e) => println!("error: {}", e),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start {
            data_dir,
            discovery_port,
            transfer_port,
            broadcast,
            interval,
            block_size,
        } => {
            let config = Config {
                data_dir,
                discovery_port,
                transfer_port,
                broadcast_addr: broadcast,
                announce_interval: interval,
                block_size,
                ..Config::default()
            };

            let mut node = Node::new(config).await?;
            node.start();
            run_prompt(&node).await?;
            node.shutdown();
        }
        Commands::Share {
            path,
            data_dir,
            block_size,
        } => {
            let config = Config {
                data_dir,
                block_size,
                ..Config::default()
            };
            config.validate()?;

            let catalog = FileCatalog::open(&config.data_dir, config.block_size)
                .await?
                .with_max_datagram(config.max_datagram);
            println!("{}", catalog.publish(&path).await?);
        }
        Commands::Hash { manifest } => {
            println!("{}", hash_manifest(&manifest).await?);
        }
    }

    Ok(())
}
