//! The launch sequence and the test harness built on top of it.

use std::future::Future;
use std::num::NonZeroUsize;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use futures::FutureExt as _;
use tracing::{error, warn};
use zombie_provider::{Client, Credentials, Provider, ProviderRegistry};
use zombie_types::{ComputedNetwork, LaunchConfig, TypesDef};

use crate::chain_spec::prepare_relay_chain_spec;
use crate::cli_args::detect_cli_args_versions;
use crate::namespace::generate_namespace;
use crate::network::{DEFAULT_MONITOR_INTERVAL, Network, Scope};
use crate::options::{LaunchOptions, NetworkHook};
use crate::ports::PortAllocationStrategy;
use crate::reporter::Reporter;
use crate::spawner::{NodePlan, SpawnContext, spawn_nodes};
use crate::verifier::verify_nodes;
use crate::workspace::{ChainSpecPaths, prepare_workspace, write_magic_file, write_wrapper_script};
use crate::{Error, Result};

/// Launches networks with a set of providers and a port layout.
///
/// [`crate::start`] and [`crate::test`] use the default orchestrator; build one explicitly to
/// plug in another provider.
#[derive(Clone, Default)]
pub struct Orchestrator {
    providers: ProviderRegistry,
    port_strategy: PortAllocationStrategy,
}

impl Orchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `provider`, replacing the built-in provider of the same kind.
    pub fn with_provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.providers.register(provider);
        self
    }

    pub fn with_port_strategy(mut self, port_strategy: PortAllocationStrategy) -> Self {
        self.port_strategy = port_strategy;
        self
    }

    /// Launch a network and return its handle once every node is running.
    ///
    /// Everything after the workspace gate runs under the configuration's global timeout. The
    /// reuse question may wait on a person, so it is answered before the deadline starts. If the
    /// deadline passes, the sequence is abandoned at whatever step it reached and
    /// [`Error::GlobalTimeout`] is returned.
    ///
    /// On any failure after the network was constructed, its logs are dumped and it is stopped
    /// here, unless `options.set_global_network` was given. With a hook, teardown is up to the
    /// caller that received the handle.
    pub async fn start(
        &self,
        credentials: &Credentials,
        config: LaunchConfig,
        mut options: LaunchOptions,
    ) -> Result<Network> {
        let spec = zombie_types::compile(config)?;
        let concurrency = effective_spawn_concurrency(&spec, options.spawn_concurrency);
        let provider = self
            .providers
            .get(spec.settings.provider)
            .map_err(Error::provider("get_provider"))?;

        let reporter = Reporter::new(options.silent);
        let namespace = generate_namespace();
        reporter.step(
            &namespace,
            format!(
                "Launching network with provider {} (spawn concurrency {concurrency})",
                spec.settings.provider
            ),
        );

        let workspace = prepare_workspace(
            options.dir.as_deref(),
            &namespace,
            options.force,
            options.in_ci,
            options.prompt.clone(),
        )
        .await?;

        let hook = options.set_global_network.take();
        let caller_owns_teardown = hook.is_some();
        let constructed = OnceLock::new();
        let launch = Launch {
            provider: provider.as_ref(),
            credentials,
            spec: &spec,
            namespace,
            workspace,
            reporter,
            concurrency,
            monitor: options.monitor,
            scope: options.scope,
        };

        let result = tokio::select! {
            result = self.launch(launch, hook, &constructed) => result,
            _ = tokio::time::sleep(spec.settings.timeout()) => {
                let secs = spec.settings.timeout;
                error!("global timeout ({secs} secs) reached");
                Err(Error::GlobalTimeout { secs })
            }
        };

        if let (Err(e), Some(network)) = (&result, constructed.get()) {
            error!(namespace = %network.namespace(), "launch failed: {e}");
            if !caller_owns_teardown {
                teardown_after_failure(network).await;
            }
        }
        result
    }

    async fn launch(
        &self,
        launch: Launch<'_>,
        hook: Option<NetworkHook>,
        constructed: &OnceLock<Network>,
    ) -> Result<Network> {
        let Launch {
            provider,
            credentials,
            spec,
            namespace,
            workspace,
            reporter,
            concurrency,
            monitor,
            scope,
        } = launch;

        let type_defs = load_type_defs(spec.types.as_ref()).await?;

        write_magic_file(&workspace).await?;
        let chain_spec_paths = ChainSpecPaths::new(&workspace, &spec.relaychain.chain);

        let mut client = provider
            .init_client(credentials, &namespace, &workspace)
            .map_err(Error::provider("init_client"))?;
        if let Some(timeout) = spec.settings.node_spawn_timeout() {
            client.set_spawn_timeout(timeout);
        }
        let client: Arc<dyn Client> = Arc::from(client);

        let network = Network::new(
            namespace,
            workspace,
            client.clone(),
            scope,
            reporter,
            type_defs,
        );
        let _ = constructed.set(network.clone());
        if let Some(hook) = hook {
            hook(network.clone());
        }

        if !client.validate_access().await {
            return Err(Error::AccessValidation {
                provider: spec.settings.provider,
            });
        }

        write_wrapper_script(network.workspace(), client.remote_dir()).await?;

        network.mark_launching()?;
        reporter.step(network.namespace(), "Creating namespace");
        client
            .create_namespace()
            .await
            .map_err(Error::provider("create_namespace"))?;

        let versions = detect_cli_args_versions(client.as_ref(), spec).await?;

        let plan = NodePlan::new(spec, &self.port_strategy, client.remote_dir())?;
        let boot_nodes = if spec.settings.bootnode {
            plan.boot_nodes(client.as_ref())
        } else {
            Vec::new()
        };

        reporter.step(network.namespace(), "Preparing relay chain spec");
        prepare_relay_chain_spec(
            provider,
            client.as_ref(),
            spec,
            &chain_spec_paths,
            &boot_nodes,
        )
        .await?;

        let remote_chain_spec = client
            .remote_dir()
            .join(format!("{}.json", spec.relaychain.chain));
        spawn_nodes(
            &plan,
            &SpawnContext {
                network: &network,
                chain_spec: &remote_chain_spec,
                boot_nodes: &boot_nodes,
                versions: &versions,
                concurrency,
            },
        )
        .await?;

        verify_nodes(&network).await?;
        network.mark_launched()?;
        reporter.step(network.namespace(), "Network launched");

        if monitor {
            network.start_monitoring(DEFAULT_MONITOR_INTERVAL)?;
        }

        Ok(network)
    }

    /// Launch a network, run `callback` against it, and tear it down.
    ///
    /// Whatever happens (a failed launch, a failed callback, or a panic inside it), the logs of
    /// the network are dumped and the network is stopped before this returns. A panic in the
    /// callback is resumed after teardown.
    pub async fn test<T, E, F, Fut>(
        &self,
        credentials: &Credentials,
        config: LaunchConfig,
        callback: F,
    ) -> std::result::Result<T, E>
    where
        F: FnOnce(Network) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<Error>,
    {
        let captured = Arc::new(OnceLock::new());
        let options = LaunchOptions {
            force: true,
            scope: Scope::Test,
            ..LaunchOptions::default()
        }
        .on_network({
            let captured = captured.clone();
            move |network| {
                let _ = captured.set(network);
            }
        });

        let outcome = AssertUnwindSafe(async {
            let network = self.start(credentials, config, options).await?;
            callback(network).await
        })
        .catch_unwind()
        .await;

        let teardown = match captured.get() {
            Some(network) => {
                let dump = network.dump_logs().await;
                if !dump.is_complete() {
                    warn!(namespace = %network.namespace(), "logs of {} node(s) could not be collected", dump.failed.len());
                }
                network.stop().await
            }
            None => Ok(()),
        };

        match outcome {
            Err(panic) => {
                if let Err(e) = teardown {
                    error!("failed to stop network: {e}");
                }
                std::panic::resume_unwind(panic)
            }
            Ok(Ok(value)) => {
                teardown?;
                Ok(value)
            }
            Ok(Err(e)) => {
                if let Err(stop) = teardown {
                    error!("failed to stop network: {stop}");
                }
                Err(e)
            }
        }
    }
}

/// The part of a launch that runs under the global deadline.
struct Launch<'a> {
    provider: &'a dyn Provider,
    credentials: &'a Credentials,
    spec: &'a ComputedNetwork,
    namespace: String,
    workspace: PathBuf,
    reporter: Reporter,
    concurrency: NonZeroUsize,
    monitor: bool,
    scope: Scope,
}

/// Launch a network with the built-in providers. See [`Orchestrator::start`].
pub async fn start(
    credentials: &Credentials,
    config: LaunchConfig,
    options: LaunchOptions,
) -> Result<Network> {
    Orchestrator::default()
        .start(credentials, config, options)
        .await
}

/// Launch a network with the built-in providers for the duration of `callback`. See
/// [`Orchestrator::test`].
pub async fn test<T, E, F, Fut>(
    credentials: &Credentials,
    config: LaunchConfig,
    callback: F,
) -> std::result::Result<T, E>
where
    F: FnOnce(Network) -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: From<Error>,
{
    Orchestrator::default()
        .test(credentials, config, callback)
        .await
}

/// Number of nodes spawned in parallel.
///
/// Nodes referring to other nodes need those to be registered first, so any reference in the
/// specification forces one node at a time. Otherwise never more than there are nodes.
pub fn effective_spawn_concurrency(
    network: &ComputedNetwork,
    requested: NonZeroUsize,
) -> NonZeroUsize {
    if network.has_network_references() {
        return NonZeroUsize::MIN;
    }
    NonZeroUsize::new(requested.get().min(network.node_count())).unwrap_or(NonZeroUsize::MIN)
}

/// Dump logs and stop a network whose launch failed and that nobody else holds.
async fn teardown_after_failure(network: &Network) {
    let dump = network.dump_logs().await;
    if !dump.is_complete() {
        warn!(namespace = %network.namespace(), "logs of {} node(s) could not be collected", dump.failed.len());
    }
    if let Err(e) = network.stop().await {
        error!(namespace = %network.namespace(), "failed to stop network: {e}");
    }
}

/// Load user type definitions, either inline or from a JSON file.
async fn load_type_defs(types: Option<&TypesDef>) -> Result<Option<serde_json::Value>> {
    match types {
        None => Ok(None),
        Some(TypesDef::Inline(map)) => Ok(Some(serde_json::Value::Object(map.clone()))),
        Some(TypesDef::Path(path)) => read_type_defs(path).await.map(Some),
    }
}

async fn read_type_defs(path: &Path) -> Result<serde_json::Value> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::TypeDefinitions {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    serde_json::from_str(&contents).map_err(|e| Error::TypeDefinitions {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}
