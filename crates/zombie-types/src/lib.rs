//! zombie-types: launch configuration and the computed network specification.
//!
//! A user writes a [`LaunchConfig`] (TOML or JSON); [`compile`] validates it and resolves every
//! default, producing the read-only [`ComputedNetwork`] that the orchestrator launches.

use std::path::PathBuf;

pub mod compile;
pub mod computed;
pub mod config;
pub mod reference;

pub use compile::compile;
pub use computed::{
    ComputedNetwork, ComputedNode, ComputedParachain, ComputedRelaychain, ComputedSettings,
    NodeRole,
};
pub use config::{
    LaunchConfig, NodeConfig, ParachainConfig, ProviderKind, RelaychainConfig, SettingsConfig,
    TypesDef,
};
pub use reference::{NetworkReference, RefField};

/// Errors raised while reading a launch configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Only `.toml` and `.json` configurations are understood.
    #[error("unsupported configuration format: {0:?}")]
    UnsupportedFormat(PathBuf),
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("unknown provider `{0}`")]
    UnknownProvider(String),
}

/// Errors raised when a launch configuration is structurally invalid.
#[derive(thiserror::Error, Debug)]
pub enum CompileError {
    #[error("relaychain.chain must not be empty")]
    EmptyChainName,
    #[error("the relay chain needs at least one node")]
    NoRelayNodes,
    #[error("timeouts must be greater than zero")]
    ZeroTimeout,
    /// Node names must be lowercase alphanumerics and `-`, at most 63 characters.
    #[error("invalid node name `{0}`")]
    InvalidNodeName(String),
    #[error("duplicate node name `{0}`")]
    DuplicateNodeName(String),
    #[error("duplicate parachain id {0}")]
    DuplicateParachainId(u32),
    /// A parachain registered in genesis needs both its genesis head and validation code.
    #[error("parachain {para_id} is registered in genesis but has no {kind}")]
    MissingGenesisFile { para_id: u32, kind: &'static str },
    #[error("node `{node}` references an unknown node in {reference}")]
    UnknownReferencedNode { node: String, reference: String },
    #[error("node `{node}` references an unknown field in {reference}")]
    UnknownReferenceField { node: String, reference: String },
    #[error("node `{0}` has a network reference in its command")]
    ReferenceInCommand(String),
    /// The referenced node is not spawned before the referencing one.
    #[error("node `{node}` references a node that is not spawned before it: {reference}")]
    ForwardReference { node: String, reference: String },
}
