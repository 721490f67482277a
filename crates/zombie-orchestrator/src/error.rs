use std::path::PathBuf;

use zombie_provider::{ProviderError, ProviderKind};
use zombie_types::CompileError;

use crate::network::NetworkState;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by the launch orchestrator and the [`crate::Network`] handle.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The launch configuration is structurally invalid. Nothing was touched.
    #[error(transparent)]
    SpecCompilation(#[from] CompileError),
    /// The workspace directory exists and reusing it was declined.
    #[error("directory {0:?} already exists and reusing it was declined")]
    DirectoryConflict(PathBuf),
    /// The provider backend is not reachable with the given credentials.
    #[error("can not access {provider}, please check your config")]
    AccessValidation { provider: ProviderKind },
    /// The network did not launch within the global deadline.
    #[error("global timeout ({secs} secs) reached before the network launched")]
    GlobalTimeout { secs: u64 },
    /// A call into the provider failed.
    #[error("provider operation `{operation}` failed")]
    ProviderOperation {
        operation: &'static str,
        #[source]
        source: ProviderError,
    },
    /// A mutating operation was attempted on a stopped network.
    #[error("network {namespace} is already stopped")]
    AlreadyStopped { namespace: String },
    /// A lifecycle step was requested out of order.
    #[error("network {namespace} can not move from {from} to {to}")]
    InvalidTransition {
        namespace: String,
        from: NetworkState,
        to: NetworkState,
    },
    #[error("failed to prepare workspace {path:?}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid chain spec {path:?}: {reason}")]
    ChainSpec { path: PathBuf, reason: String },
    #[error("invalid type definitions {path:?}: {reason}")]
    TypeDefinitions { path: PathBuf, reason: String },
    #[error("node `{node}` uses {reference}, which cannot be resolved yet")]
    UnresolvedReference { node: String, reference: String },
    #[error("node `{node}` failed verification: {reason}")]
    NodeVerification { node: String, reason: String },
    #[error("no ports left to allocate for node #{node_index}")]
    PortRange { node_index: usize },
    #[error("the following ports are not available:\n{0}")]
    PortUnavailable(String),
}

impl Error {
    pub(crate) fn provider(operation: &'static str) -> impl FnOnce(ProviderError) -> Self {
        move |source| Self::ProviderOperation { operation, source }
    }

    pub(crate) fn workspace(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Workspace { path, source }
    }

    /// Whether the command line should report this error and exit with status 1 instead of
    /// returning it: a declined workspace reuse, or a provider that cannot be reached.
    pub fn terminates_process(&self) -> bool {
        matches!(
            self,
            Self::DirectoryConflict(_) | Self::AccessValidation { .. }
        )
    }
}
