//! The fully resolved network specification.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{ProviderKind, TypesDef};
use crate::reference;

/// The role a node plays in the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    /// A relay chain node that authors blocks.
    Validator,
    /// A relay chain node that only follows the chain.
    FullNode,
    /// A parachain collator.
    Collator,
}

impl NodeRole {
    pub fn is_validator(&self) -> bool {
        matches!(self, Self::Validator)
    }
}

/// A fully resolved network, produced once per launch by [`crate::compile`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputedNetwork {
    pub settings: ComputedSettings,
    pub relaychain: ComputedRelaychain,
    pub parachains: Vec<ComputedParachain>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub types: Option<TypesDef>,
}

impl ComputedNetwork {
    /// Every node in spawn order: relay chain nodes first, then collators.
    pub fn nodes(&self) -> impl Iterator<Item = &ComputedNode> {
        self.relaychain
            .nodes
            .iter()
            .chain(self.parachains.iter().flat_map(|p| p.collators.iter()))
    }

    pub fn node_count(&self) -> usize {
        self.nodes().count()
    }

    /// Whether any node refers to another node through a `{{ZOMBIE:..}}` token.
    ///
    /// The check runs over the serialized form so that references anywhere in the
    /// specification are caught, not only in node arguments.
    pub fn has_network_references(&self) -> bool {
        match serde_json::to_string(self) {
            Ok(serialized) => reference::contains_reference(&serialized),
            // A computed network always serializes; treat the impossible case as referencing
            // so callers fall back to serial spawning.
            Err(_) => true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputedSettings {
    pub provider: ProviderKind,
    /// Global launch deadline, in seconds.
    pub timeout: u64,
    /// Per-node deadline, in seconds. `None` keeps the provider's default.
    pub node_spawn_timeout: Option<u64>,
    pub bootnode: bool,
}

impl ComputedSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn node_spawn_timeout(&self) -> Option<Duration> {
        self.node_spawn_timeout.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputedRelaychain {
    pub chain: String,
    pub default_command: String,
    pub chain_spec_path: Option<PathBuf>,
    pub chain_spec_command: String,
    pub nodes: Vec<ComputedNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputedParachain {
    pub id: u32,
    pub chain: Option<String>,
    pub register_in_genesis: bool,
    pub genesis_state_path: Option<PathBuf>,
    pub genesis_wasm_path: Option<PathBuf>,
    pub collators: Vec<ComputedNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputedNode {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub role: NodeRole,
    pub env: BTreeMap<String, String>,
    /// The parachain this node collates for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub para_id: Option<u32>,
}
