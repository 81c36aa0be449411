// mesh - command line entry point for a fileset-mesh node

use clap::{ArgAction, Parser, Subcommand};
use fileset_mesh::api::{verify_download, FileResponse};
use fileset_mesh::config::NodeConfig;
use fileset_mesh::model::SetId;
use fileset_mesh::network::NetworkConfig;
use fileset_mesh::node::Node;
use fileset_mesh::proof;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

type CliResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Share Merkle-rooted file sets with peers on the local network
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging (can be specified multiple times)
    #[clap(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a node until interrupted
    Run {
        /// Directory of the node's store; temporary if omitted
        #[clap(long, env = "MESH_DATA_DIR")]
        data_dir: Option<PathBuf>,

        /// Multiaddr to listen on
        #[clap(long, env = "MESH_LISTEN", default_value = "/ip4/0.0.0.0/tcp/0")]
        listen: String,

        /// Disable mDNS peer discovery
        #[clap(long, env = "MESH_NO_MDNS")]
        no_mdns: bool,

        /// Pause between announcing a set and streaming it, in milliseconds
        #[clap(long, env = "MESH_ANNOUNCE_GRACE_MS", default_value_t = 500)]
        announce_grace_ms: u64,

        /// Files to upload as one set once the node is up
        #[clap(long, num_args = 1..)]
        upload: Vec<PathBuf>,

        /// Seconds to wait for peers before uploading
        #[clap(long, env = "MESH_UPLOAD_DELAY_SECS", default_value_t = 5)]
        upload_delay_secs: u64,
    },

    /// Print a stored file of a complete set with its inclusion proof
    ///
    /// Opens the store directly, so it cannot run against the data directory
    /// of a node that is still running.
    Proof {
        #[clap(long, env = "MESH_DATA_DIR")]
        data_dir: PathBuf,

        #[clap(long)]
        set_id: String,

        #[clap(long)]
        index: usize,
    },

    /// Print the Merkle root of a complete stored set
    ///
    /// Same store locking rule as `proof`.
    Root {
        #[clap(long, env = "MESH_DATA_DIR")]
        data_dir: PathBuf,

        #[clap(long)]
        set_id: String,
    },

    /// Verify a file response (JSON) against a trusted root
    Verify {
        /// Path to the JSON produced by `proof`
        #[clap(long)]
        response: PathBuf,

        /// 0x-hex Merkle root of the set
        #[clap(long)]
        root: String,
    },
}

#[tokio::main]
async fn main() -> CliResult<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "info".into()),
        1 => tracing_subscriber::EnvFilter::new("debug"),
        _ => tracing_subscriber::EnvFilter::new("trace"),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Command::Run {
            data_dir,
            listen,
            no_mdns,
            announce_grace_ms,
            upload,
            upload_delay_secs,
        } => {
            let mut config = NodeConfig::new()
                .with_network(NetworkConfig::new().with_listen_addr(&listen).with_mdns(!no_mdns))
                .with_announce_grace(Duration::from_millis(announce_grace_ms));
            if let Some(dir) = data_dir {
                config = config.with_data_dir(dir);
            }
            run(config, upload, Duration::from_secs(upload_delay_secs)).await
        }
        Command::Proof {
            data_dir,
            set_id,
            index,
        } => print_proof(data_dir, SetId::from(set_id), index).await,
        Command::Root { data_dir, set_id } => print_root(data_dir, SetId::from(set_id)).await,
        Command::Verify { response, root } => verify(response, &root).await,
    }
}

async fn run(config: NodeConfig, upload: Vec<PathBuf>, upload_delay: Duration) -> CliResult<()> {
    let mut node = Node::start(config).await?;
    for set in node.recovered() {
        info!(set_id = %set.set_id, root = %proof::encode_hex(&set.root), "set available");
    }

    let mut completions = node.take_completions();
    let cancel = node.cancellation_token();
    tokio::spawn(async move {
        let Some(completions) = completions.as_mut() else {
            return;
        };
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                completed = completions.recv() => match completed {
                    Some(set) => println!(
                        "{}",
                        serde_json::json!({
                            "setId": set.set_id.to_string(),
                            "hash": proof::encode_hex(&set.root),
                        })
                    ),
                    None => break,
                },
            }
        }
    });

    if !upload.is_empty() {
        tokio::time::sleep(upload_delay).await;

        let mut contents = Vec::with_capacity(upload.len());
        for path in &upload {
            contents.push(tokio::fs::read(path).await?);
        }
        let response = node.service().upload(contents).await?;
        println!("{}", serde_json::to_string_pretty(&response)?);
    }

    tokio::signal::ctrl_c().await?;
    node.shutdown().await?;
    Ok(())
}

async fn print_proof(data_dir: PathBuf, set_id: SetId, index: usize) -> CliResult<()> {
    let service = Node::offline_service(&NodeConfig::new().with_data_dir(data_dir)).await?;
    let response = service.file(&set_id, index)?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

async fn print_root(data_dir: PathBuf, set_id: SetId) -> CliResult<()> {
    let service = Node::offline_service(&NodeConfig::new().with_data_dir(data_dir)).await?;
    let root = service.root(&set_id)?;
    println!(
        "{}",
        serde_json::json!({
            "setId": set_id.to_string(),
            "hash": proof::encode_hex(&root),
        })
    );
    Ok(())
}

async fn verify(path: PathBuf, root: &str) -> CliResult<()> {
    let json = tokio::fs::read_to_string(&path).await?;
    let response: FileResponse = serde_json::from_str(&json)?;

    match verify_download(&response, root) {
        Ok(contents) => {
            println!("verified: {} bytes belong to set {}", contents.len(), root);
            Ok(())
        }
        Err(e) => {
            warn!(error = %e, "verification failed");
            Err(e.into())
        }
    }
}
