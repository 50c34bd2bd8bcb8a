use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use stroom_cache::cluster::{NodeClearOutcome, NodeInfo};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stroom_cache_node::config::DEFAULT_JWT_SECRET;
use stroom_cache_node::{CacheNode, ConfigStore, HttpNodeClient};

#[derive(Parser)]
#[command(name = "stroom-cache-node")]
#[command(about = "Cache admin node: list and clear caches locally or cluster-wide", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a cache node
    Serve {
        /// Node configuration file
        #[arg(short, long, default_value = "node.yaml")]
        config: PathBuf,
    },

    /// List the caches on a node
    List {
        /// Base URL of the node
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        node: String,

        /// Cluster member to list instead, reached through --node
        #[arg(long)]
        member: Option<String>,

        /// JWT secret key (can also use JWT_SECRET env var)
        #[arg(long)]
        jwt_secret: Option<String>,
    },

    /// Clear one cache, or every cache, on a node or the whole cluster
    Clear {
        /// Cache to clear (omit for all caches)
        name: Option<String>,

        /// Base URL of the node
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        node: String,

        /// Cluster member to clear instead, reached through --node
        #[arg(long, conflicts_with = "all_nodes")]
        member: Option<String>,

        /// Ask the node to clear on every node of its cluster
        #[arg(long)]
        all_nodes: bool,

        /// JWT secret key (can also use JWT_SECRET env var)
        #[arg(long)]
        jwt_secret: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "stroom_cache=info,stroom_cache_node=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { ref config } => {
            let store = Arc::new(ConfigStore::open(config)?);
            let settings = store.current();
            if settings.uses_default_secret() {
                warn!("Using default JWT secret. Set JWT_SECRET env var or jwtSecret for production.");
            }

            let node = CacheNode::build(store)?;
            let _background = node.spawn_background()?;

            let addr = format!("{}:{}", settings.host, settings.port);
            let listener = tokio::net::TcpListener::bind(&addr)
                .await
                .with_context(|| format!("Failed to bind {}", addr))?;
            info!(
                "Node '{}' serving {} caches",
                settings.node_name,
                settings.caches.len()
            );

            node.serve(listener, shutdown_signal()).await?;
        }

        Commands::List {
            ref node,
            ref member,
            ref jwt_secret,
        } => {
            let client = cli_client(jwt_secret)?;
            let caches = client.list_caches(&target(node), member.as_deref()).await?;

            println!(
                "{:<16} {:<32} {:>10} {:>12} {:>9}",
                "NODE", "NAME", "SIZE", "MAX SIZE", "HIT RATE"
            );
            for cache in caches {
                println!(
                    "{:<16} {:<32} {:>10} {:>12} {:>8.1}%",
                    cache.node.as_deref().unwrap_or("-"),
                    cache.name,
                    cache.size,
                    cache
                        .maximum_size
                        .map(|size| size.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    cache.hit_rate
                );
            }
        }

        Commands::Clear {
            ref name,
            ref node,
            ref member,
            all_nodes,
            ref jwt_secret,
        } => {
            let client = cli_client(jwt_secret)?;
            let node = target(node);

            if all_nodes {
                let report = client.cluster_clear(&node, name.as_deref()).await?;
                println!("Cluster clear {}", report.request_id);
                for (node_name, outcome) in &report.results {
                    match outcome {
                        NodeClearOutcome::Cleared { caches } => {
                            println!("  {}: cleared {} caches", node_name, caches)
                        }
                        NodeClearOutcome::Failed { error } => {
                            println!("  {}: FAILED ({})", node_name, error)
                        }
                    }
                }
                if !report.is_complete_success() {
                    anyhow::bail!("Clear failed on nodes: {}", report.failed().join(", "));
                }
            } else {
                let cleared = client
                    .clear(&node, name.as_deref(), member.as_deref())
                    .await?;
                println!(
                    "Cleared {} caches on {}",
                    cleared,
                    member.as_deref().unwrap_or(&node.base_url)
                );
            }
        }
    }

    Ok(())
}

fn cli_client(jwt_secret: &Option<String>) -> Result<HttpNodeClient> {
    let secret = jwt_secret
        .clone()
        .or_else(|| std::env::var("JWT_SECRET").ok())
        .unwrap_or_else(|| {
            println!("Warning: Using default JWT secret. Set JWT_SECRET env var or --jwt-secret.");
            DEFAULT_JWT_SECRET.to_string()
        });
    HttpNodeClient::new(&secret, "cli", Duration::from_secs(30))
}

fn target(base_url: &str) -> NodeInfo {
    NodeInfo::new(base_url, base_url)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
