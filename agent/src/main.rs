use anyhow::{Context, Result};
use clap::Parser;
use owo_colors::OwoColorize;
use tokio_util::sync::CancellationToken;

mod catalog;
mod cluster;
mod config;
mod context;
mod executor;
mod host;
mod process;
mod reconcile;
mod snapshot;
mod steps;
mod store;
mod util;

use cluster::ClusterClient;
use config::Config;
use context::AgentContext;
use store::OperationStore;
use util::AGENT_NAME;

#[tokio::main]
async fn main() {
    cupcake_common::init();

    let config = Config::parse();
    cupcake_common::logging::init(&config.log_level);

    println!(
        "{}",
        format!("🧁 starting {AGENT_NAME} for node {}", config.node_name).green()
    );

    if let Err(e) = run(config).await {
        eprintln!("{}", format!("🛑 fatal startup error: {e:#}").red());
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<()> {
    let store = OperationStore::new(config.hostpath_root.clone())
        .context("failed to initialize hostpath root")?;

    let cluster = ClusterClient::connect()
        .await
        .context("failed to load Kubernetes credentials")?;
    println!("{}", "✅ connected to the cluster API".green());

    cupcake_common::metrics::maybe_spawn_metrics_server(config.metrics_port);

    let ctx = AgentContext::new(config, cluster, store);

    let cancel = CancellationToken::new();
    let cancel_for_signal = cancel.clone();
    tokio::spawn(async move {
        cupcake_common::shutdown::shutdown_signal().await;
        cancel_for_signal.cancel();
    });

    tokio::select! {
        _ = reconcile::run(&ctx) => {}
        _ = cancel.cancelled() => {
            println!("{}", "🛑 shutting down".red());
        }
    }

    Ok(())
}
