//! zombie-orchestrator: launch ephemeral multi-node test networks and tear them down again.
//!
//! This crate provides both a CLI and library interface. A launch compiles the declarative
//! [`LaunchConfig`] into a [`zombie_types::ComputedNetwork`], provisions an isolated namespace
//! through a [`zombie_provider::Provider`], generates the relay chain spec, spawns every node
//! and waits for all of them to come up, all under one global deadline.
//!
//! # Example
//!
//! ```rust,no_run
//! use zombie_orchestrator::{Credentials, LaunchConfig, LaunchOptions};
//!
//! # async fn run() -> Result<(), zombie_orchestrator::Error> {
//! let config = LaunchConfig::from_path("network.toml").expect("valid config");
//!
//! let network = zombie_orchestrator::start(
//!     &Credentials::default(),
//!     config,
//!     LaunchOptions::default(),
//! )
//! .await?;
//!
//! for node in network.nodes() {
//!     println!("{}: {}", node.name, node.ws_uri());
//! }
//!
//! network.dump_logs().await;
//! network.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod chain_spec;
pub mod cli_args;
pub mod error;
pub mod namespace;
pub mod network;
pub mod node;
pub mod options;
pub mod orchestrator;
pub mod ports;
pub mod reporter;
pub mod spawner;
pub mod verifier;
pub mod workspace;

pub use error::{Error, Result};
pub use network::{LogDump, Network, NetworkState, Scope};
pub use node::{NetworkNode, NodeKey};
pub use options::{Confirm, DEFAULT_SPAWN_CONCURRENCY, LaunchOptions, NetworkHook, StdinConfirm};
pub use orchestrator::{Orchestrator, effective_spawn_concurrency, start, test};
pub use ports::{NodePorts, PortAllocationStrategy};
pub use reporter::Reporter;
pub use zombie_provider::Credentials;
pub use zombie_types::LaunchConfig;
