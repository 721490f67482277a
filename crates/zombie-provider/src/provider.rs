//! Provider factories and their runtime selection.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use zombie_types::{ComputedRelaychain, ProviderKind};

use crate::client::Client;
use crate::native::NativeProvider;
use crate::{Credentials, ProviderError, Result};

/// A backend that can host a test network.
#[async_trait]
pub trait Provider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Bind a client to `namespace`, using `workspace` as the local artifact directory.
    fn init_client(
        &self,
        credentials: &Credentials,
        namespace: &str,
        workspace: &Path,
    ) -> Result<Box<dyn Client>>;

    /// Produce the plain relay chain spec at `output`, either by copying the configured file
    /// or by generating it.
    async fn setup_chain_spec(
        &self,
        client: &dyn Client,
        relaychain: &ComputedRelaychain,
        chain_name: &str,
        output: &Path,
    ) -> Result<()>;

    /// Convert the plain spec at `plain` into a raw spec at `raw_output`.
    async fn get_chain_spec_raw(
        &self,
        client: &dyn Client,
        relaychain: &ComputedRelaychain,
        chain_name: &str,
        plain: &Path,
        raw_output: &Path,
    ) -> Result<PathBuf>;
}

/// Providers available to a launch, keyed by the tag in the computed specification.
#[derive(Clone)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderKind, Arc<dyn Provider>>,
}

impl Default for ProviderRegistry {
    /// A registry with every built-in provider.
    fn default() -> Self {
        Self::empty().with(Arc::new(NativeProvider))
    }
}

impl ProviderRegistry {
    pub fn empty() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// Register `provider`, replacing any provider of the same kind.
    pub fn with(mut self, provider: Arc<dyn Provider>) -> Self {
        self.register(provider);
        self
    }

    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        self.providers.insert(provider.kind(), provider);
    }

    pub fn get(&self, kind: ProviderKind) -> Result<Arc<dyn Provider>> {
        self.providers
            .get(&kind)
            .cloned()
            .ok_or(ProviderError::Unsupported(kind))
    }
}
