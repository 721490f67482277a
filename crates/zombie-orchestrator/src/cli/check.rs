//! Check command implementation.

use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::Context;
use tracing::info;
use zombie_orchestrator::{DEFAULT_SPAWN_CONCURRENCY, LaunchConfig, effective_spawn_concurrency};

use super::Run;

/// Validate a launch configuration and print the computed network as JSON.
#[derive(Parser)]
pub struct Check {
    /// Launch configuration (`.toml` or `.json`).
    pub config: PathBuf,
}

impl Run for Check {
    async fn run(self) -> color_eyre::Result<()> {
        let config = LaunchConfig::from_path(&self.config)
            .wrap_err_with(|| format!("failed to load {}", self.config.display()))?;
        let network = zombie_types::compile(config).wrap_err("invalid launch configuration")?;

        info!(
            nodes = network.node_count(),
            parachains = network.parachains.len(),
            spawn_concurrency = %effective_spawn_concurrency(&network, DEFAULT_SPAWN_CONCURRENCY),
            "configuration is valid"
        );
        println!(
            "{}",
            serde_json::to_string_pretty(&network).wrap_err("failed to serialize network")?
        );
        Ok(())
    }
}
