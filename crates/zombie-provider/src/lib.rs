//! zombie-provider: pluggable backends for zombie test networks.
//!
//! A [`Provider`] is a factory, selected at runtime by the [`ProviderKind`] tag of a computed
//! network. It binds a [`Client`] to one namespace; the client is what the orchestrator drives
//! for access validation, namespace lifecycle, node spawning and log collection.

use std::fmt;

pub mod client;
pub mod native;
pub mod provider;

pub use client::{Client, CommandOutput, DEFAULT_SPAWN_TIMEOUT, SpawnRequest, SpawnedNode};
pub use native::{NativeClient, NativeProvider};
pub use provider::{Provider, ProviderRegistry};
pub use zombie_types::ProviderKind;

pub type Result<T, E = ProviderError> = std::result::Result<T, E>;

/// Errors returned by providers and clients.
#[derive(thiserror::Error, Debug)]
pub enum ProviderError {
    /// No provider is registered for this kind.
    #[error("provider `{0}` is not available")]
    Unsupported(ProviderKind),
    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{program}` exited with {exit_code:?}: {stderr}")]
    CommandFailed {
        program: String,
        exit_code: Option<i32>,
        stderr: String,
    },
    #[error("node `{0}` is already spawned")]
    DuplicateNode(String),
    #[error("node `{0}` is not known to this client")]
    UnknownNode(String),
    #[error("{0}")]
    Other(String),
}

impl ProviderError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Opaque backend credentials, e.g. the path to a kubeconfig.
///
/// The native provider ignores them.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials(String);

impl Credentials {
    pub fn new(credentials: impl Into<String>) -> Self {
        Self(credentials.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credentials(..)")
    }
}
