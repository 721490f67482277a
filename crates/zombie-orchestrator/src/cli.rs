//! CLI command definitions for zombie.

use clap::Parser;
use std::future::Future;

mod check;
mod spawn;

/// CLI options for zombie.
#[derive(Parser)]
#[command(name = "zombie")]
#[command(about = "Launch ephemeral multi-node test networks")]
pub enum Options {
    /// Launch a network and keep it running until Ctrl+C.
    Spawn(spawn::Spawn),
    /// Validate a launch configuration and print the computed network.
    Check(check::Check),
}

/// Trait for running CLI commands.
pub trait Run {
    fn run(self) -> impl Future<Output = color_eyre::Result<()>> + Send;
}

impl Run for Options {
    async fn run(self) -> color_eyre::Result<()> {
        match self {
            Self::Spawn(cmd) => cmd.run().await,
            Self::Check(cmd) => cmd.run().await,
        }
    }
}
