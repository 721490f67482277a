//! Spawn command implementation.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use clap::Parser;
use color_eyre::eyre::{Context, Result};
use tokio::sync::Notify;
use tracing::{error, info, warn};
use zombie_orchestrator::{
    Credentials, DEFAULT_SPAWN_CONCURRENCY, LaunchConfig, LaunchOptions, Network,
};
use zombie_types::{NodeRole, ProviderKind};

use super::Run;

/// Launch a network and keep it running until Ctrl+C.
#[derive(Parser)]
pub struct Spawn {
    /// Launch configuration (`.toml` or `.json`).
    pub config: PathBuf,

    /// Override the provider named in the configuration.
    #[arg(long)]
    pub provider: Option<ProviderKind>,

    /// Workspace directory. If not specified, a temporary directory is created.
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// Reuse an existing workspace directory without asking.
    #[arg(long)]
    pub force: bool,

    /// Maximum number of nodes spawned in parallel.
    #[arg(long, default_value_t = DEFAULT_SPAWN_CONCURRENCY)]
    pub spawn_concurrency: NonZeroUsize,

    /// Keep watching the nodes once the network is up.
    #[arg(long)]
    pub monitor: bool,

    /// Only report launch progress at debug level.
    #[arg(long)]
    pub silent: bool,

    /// Never prompt; fail if the workspace directory already exists.
    #[arg(long)]
    pub in_ci: bool,

    /// Provider credentials, e.g. the path to a kubeconfig.
    #[arg(long, default_value = "")]
    pub credentials: String,
}

impl Run for Spawn {
    async fn run(self) -> Result<()> {
        let mut config = LaunchConfig::from_path(&self.config)
            .wrap_err_with(|| format!("failed to load {}", self.config.display()))?;
        if let Some(provider) = self.provider {
            config.settings.provider = Some(provider);
        }

        let interrupted = Arc::new(Notify::new());
        let interrupted_clone = interrupted.clone();

        // Set up Ctrl+C handler
        ctrlc::set_handler(move || {
            warn!("Received Ctrl+C, shutting down...");
            interrupted_clone.notify_one();
        })
        .wrap_err("failed to set Ctrl+C handler")?;

        // Capture the network as soon as it exists, so it can be torn down whatever happens.
        let captured = Arc::new(OnceLock::new());
        let options = LaunchOptions {
            monitor: self.monitor,
            spawn_concurrency: self.spawn_concurrency,
            in_ci: self.in_ci,
            dir: self.dir,
            force: self.force,
            silent: self.silent,
            ..LaunchOptions::default()
        }
        .on_network({
            let captured = captured.clone();
            move |network| {
                let _ = captured.set(network);
            }
        });

        let credentials = Credentials::new(self.credentials);
        let outcome = tokio::select! {
            result = zombie_orchestrator::start(&credentials, config, options) => Some(result),
            _ = interrupted.notified() => None,
        };

        let network = match outcome {
            Some(Ok(network)) => network,
            Some(Err(e)) => {
                if let Some(network) = captured.get() {
                    teardown(network).await;
                }
                if e.terminates_process() {
                    error!("{e}");
                    std::process::exit(1);
                }
                return Err(e).wrap_err("failed to launch network");
            }
            None => {
                if let Some(network) = captured.get() {
                    teardown(network).await;
                }
                return Ok(());
            }
        };

        print_node_info(&network);
        info!("Network is running, press Ctrl+C to stop it");
        interrupted.notified().await;

        teardown(&network).await;
        Ok(())
    }
}

async fn teardown(network: &Network) {
    let dump = network.dump_logs().await;
    if !dump.dumped.is_empty() {
        info!(
            "Logs of {} node(s) written to {}",
            dump.dumped.len(),
            network.workspace().join("logs").display()
        );
    }
    if let Err(e) = network.stop().await {
        error!("failed to stop network {}: {e}", network.namespace());
    }
}

/// Print information about all nodes in the network.
fn print_node_info(network: &Network) {
    println!("\n=== Network {} ===", network.namespace());
    println!("Workspace: {}", network.workspace().display());
    for node in network.nodes() {
        let role = match node.role {
            NodeRole::Validator => "validator".to_string(),
            NodeRole::FullNode => "full node".to_string(),
            NodeRole::Collator => match node.para_id {
                Some(id) => format!("collator, para {id}"),
                None => "collator".to_string(),
            },
        };
        println!("{} ({})", node.name, role);
        println!("  Multiaddr:   {}", node.multiaddr());
        println!("  RPC:         {}", node.ws_uri());
        println!("  Prometheus:  {}", node.prometheus_uri());
        println!("  Logs:        {}", node.log_path.display());
    }
    println!("=====================\n");
}
