//! User-authored launch configuration.
//!
//! A [`LaunchConfig`] is the declarative, provider-agnostic description of a test network. It is
//! never consumed directly by the orchestrator: [`crate::compile`] turns it into a
//! [`crate::ComputedNetwork`] first.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// The infrastructure backend that provisions the nodes of a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Local processes on the current host.
    Native,
    /// Pods in a Kubernetes cluster.
    Kubernetes,
    /// Rootless podman containers.
    Podman,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::Kubernetes => "kubernetes",
            Self::Podman => "podman",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "native" => Ok(Self::Native),
            "kubernetes" | "k8s" => Ok(Self::Kubernetes),
            "podman" => Ok(Self::Podman),
            other => Err(ConfigError::UnknownProvider(other.to_string())),
        }
    }
}

/// Top-level launch configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LaunchConfig {
    /// Global settings (provider, timeouts).
    #[serde(default)]
    pub settings: SettingsConfig,
    /// The relay chain and its nodes.
    pub relaychain: RelaychainConfig,
    /// Parachains and their collators.
    #[serde(default)]
    pub parachains: Vec<ParachainConfig>,
    /// User-defined type definitions, consumed by downstream RPC tooling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub types: Option<TypesDef>,
}

impl LaunchConfig {
    /// Load a launch configuration from a `.toml` or `.json` file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&content),
            Some("toml") => Self::from_toml_str(&content),
            _ => Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }
}

/// Global settings. Every field is optional; the compiler fills in defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingsConfig {
    /// Which provider spawns the nodes.
    pub provider: Option<ProviderKind>,
    /// Global launch deadline, in seconds.
    pub timeout: Option<u64>,
    /// Per-node deadline for a spawned node to become reachable, in seconds.
    pub node_spawn_timeout: Option<u64>,
    /// Whether the first relay chain node is advertised as bootnode in the raw chain spec.
    pub bootnode: Option<bool>,
}

/// The relay chain description.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelaychainConfig {
    /// Chain name passed to `build-spec --chain` (e.g. `rococo-local`).
    pub chain: String,
    /// Command used by nodes that do not set their own.
    pub default_command: Option<String>,
    /// Arguments appended to every node that does not set its own.
    #[serde(default)]
    pub default_args: Vec<String>,
    /// Use this chain spec file instead of generating one.
    pub chain_spec_path: Option<PathBuf>,
    /// Command used to generate the chain spec (defaults to the default command).
    pub chain_spec_command: Option<String>,
    /// Relay chain nodes, in spawn order.
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
}

/// A single node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeConfig {
    pub name: String,
    pub command: Option<String>,
    /// Extra arguments; may contain `{{ZOMBIE:<node>:<field>}}` network references.
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_true")]
    pub validator: bool,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl NodeConfig {
    /// A validator node with no command override and no extra arguments.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: None,
            args: Vec::new(),
            validator: true,
            env: BTreeMap::new(),
        }
    }
}

/// A parachain and its collators.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParachainConfig {
    pub id: u32,
    /// Chain name passed to the collators' `--chain`.
    pub chain: Option<String>,
    /// Inject this parachain into the relay chain genesis.
    #[serde(default = "default_true")]
    pub register_in_genesis: bool,
    /// Hex-encoded genesis head, as written by `export-genesis-state`.
    pub genesis_state_path: Option<PathBuf>,
    /// Hex-encoded validation code, as written by `export-genesis-wasm`.
    pub genesis_wasm_path: Option<PathBuf>,
    #[serde(default)]
    pub collators: Vec<NodeConfig>,
}

/// User type definitions: either a JSON file on disk or an inline table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TypesDef {
    Path(PathBuf),
    Inline(serde_json::Map<String, serde_json::Value>),
}

fn default_true() -> bool {
    true
}
