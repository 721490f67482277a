//! The lifecycle handle of a launched (or launching) network.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use zombie_provider::Client;

use crate::node::NetworkNode;
use crate::reporter::Reporter;
use crate::{Error, Result};

/// Interval between two liveness sweeps of the monitoring task.
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(5);

/// Where a network is in its lifecycle.
///
/// `Created -> Launching -> Launched -> Monitoring -> Stopped`, with `Stopped` reachable from
/// every state and terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkState {
    /// Constructed; nothing has been provisioned yet.
    Created,
    /// The namespace has been requested and nodes are being brought up.
    Launching,
    /// Every node is running.
    Launched,
    /// Launched, with a background task watching the nodes.
    Monitoring,
    Stopped,
}

impl NetworkState {
    /// Whether a network in this state may move on to `next`. Progress is forward only;
    /// monitoring may be restarted.
    fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Launching)
                | (Self::Launching, Self::Launched)
                | (Self::Launched | Self::Monitoring, Self::Monitoring)
        )
    }

    /// Whether provisioning has started, so teardown has something to release.
    fn holds_namespace(self) -> bool {
        matches!(self, Self::Launching | Self::Launched | Self::Monitoring)
    }
}

impl fmt::Display for NetworkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            Self::Created => "created",
            Self::Launching => "launching",
            Self::Launched => "launched",
            Self::Monitoring => "monitoring",
            Self::Stopped => "stopped",
        };
        f.write_str(state)
    }
}

/// Who launched the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Launched through [`crate::start`]; the caller owns teardown.
    #[default]
    Standalone,
    /// Launched by [`crate::test`], which tears it down itself.
    Test,
}

/// Result of [`Network::dump_logs`].
#[derive(Debug, Clone, Default)]
pub struct LogDump {
    /// Local copies that were written.
    pub dumped: Vec<PathBuf>,
    /// Nodes whose logs could not be collected, with the reason.
    pub failed: Vec<(String, String)>,
}

impl LogDump {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// A handle to a network.
///
/// Cloning is cheap and every clone refers to the same network. The handle stays usable after
/// [`Network::stop`] for inspection, but refuses further mutation.
#[derive(Clone)]
pub struct Network {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    namespace: String,
    workspace: PathBuf,
    client: Arc<dyn Client>,
    scope: Scope,
    reporter: Reporter,
    type_defs: Option<serde_json::Value>,
    state: Mutex<NetworkState>,
    nodes: Mutex<Vec<NetworkNode>>,
    cancel: CancellationToken,
    monitor: Mutex<Option<JoinHandle<()>>>,
    /// Serializes teardown so that concurrent `stop` calls release the namespace once.
    stopping: tokio::sync::Mutex<()>,
}

/// Take a lock even if a panicking holder poisoned it; the guarded data stays consistent
/// because every critical section is a single assignment or push.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Network {
    pub(crate) fn new(
        namespace: String,
        workspace: PathBuf,
        client: Arc<dyn Client>,
        scope: Scope,
        reporter: Reporter,
        type_defs: Option<serde_json::Value>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                namespace,
                workspace,
                client,
                scope,
                reporter,
                type_defs,
                state: Mutex::new(NetworkState::Created),
                nodes: Mutex::new(Vec::new()),
                cancel: CancellationToken::new(),
                monitor: Mutex::new(None),
                stopping: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    /// The local directory holding the chain specs, the wrapper script and dumped logs.
    pub fn workspace(&self) -> &Path {
        &self.inner.workspace
    }

    pub fn client(&self) -> &Arc<dyn Client> {
        &self.inner.client
    }

    pub fn scope(&self) -> Scope {
        self.inner.scope
    }

    /// User type definitions loaded for this launch, if any.
    pub fn type_defs(&self) -> Option<&serde_json::Value> {
        self.inner.type_defs.as_ref()
    }

    pub(crate) fn reporter(&self) -> Reporter {
        self.inner.reporter
    }

    pub fn state(&self) -> NetworkState {
        *lock(&self.inner.state)
    }

    pub fn is_launched(&self) -> bool {
        matches!(
            self.state(),
            NetworkState::Launched | NetworkState::Monitoring
        )
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == NetworkState::Stopped
    }

    /// Snapshot of the registered nodes, in spawn order.
    pub fn nodes(&self) -> Vec<NetworkNode> {
        lock(&self.inner.nodes).clone()
    }

    pub fn node(&self, name: &str) -> Option<NetworkNode> {
        lock(&self.inner.nodes)
            .iter()
            .find(|node| node.name == name)
            .cloned()
    }

    /// Register a spawned node, replacing any node of the same name.
    pub fn add_node(&self, node: NetworkNode) -> Result<()> {
        self.ensure_active()?;
        let mut nodes = lock(&self.inner.nodes);
        match nodes.iter_mut().find(|n| n.name == node.name) {
            Some(existing) => *existing = node,
            None => nodes.push(node),
        }
        Ok(())
    }

    /// Record that the namespace is being provisioned. From here on, [`Network::stop`]
    /// releases it.
    pub fn mark_launching(&self) -> Result<()> {
        self.transition(NetworkState::Launching)
    }

    pub fn mark_launched(&self) -> Result<()> {
        self.transition(NetworkState::Launched)
    }

    /// Start a background task that sweeps the nodes every `interval` and warns about each node
    /// that stopped running. The task ends when the network is stopped.
    pub fn start_monitoring(&self, interval: Duration) -> Result<()> {
        self.transition(NetworkState::Monitoring)?;

        let weak = Arc::downgrade(&self.inner);
        let cancel = self.inner.cancel.clone();
        let handle = tokio::spawn(monitor_nodes(weak, cancel, interval));

        if let Some(previous) = lock(&self.inner.monitor).replace(handle) {
            previous.abort();
        }
        Ok(())
    }

    fn transition(&self, next: NetworkState) -> Result<()> {
        let mut state = lock(&self.inner.state);
        if *state == NetworkState::Stopped {
            return Err(self.already_stopped());
        }
        if !state.can_advance_to(next) {
            return Err(Error::InvalidTransition {
                namespace: self.inner.namespace.clone(),
                from: *state,
                to: next,
            });
        }
        debug!(namespace = %self.inner.namespace, from = %*state, to = %next, "network state");
        *state = next;
        Ok(())
    }

    fn ensure_active(&self) -> Result<()> {
        if self.is_stopped() {
            return Err(self.already_stopped());
        }
        Ok(())
    }

    fn already_stopped(&self) -> Error {
        Error::AlreadyStopped {
            namespace: self.inner.namespace.clone(),
        }
    }

    /// Copy every node's logs into `<workspace>/logs/`.
    ///
    /// Never fails: nodes whose logs cannot be collected are reported in the returned
    /// [`LogDump`].
    pub async fn dump_logs(&self) -> LogDump {
        let mut dump = LogDump::default();
        let reporter = self.reporter();
        reporter.step(self.namespace(), "Dumping network logs");

        for node in self.nodes() {
            match self
                .inner
                .client
                .dump_logs(&self.inner.workspace, &node.name)
                .await
            {
                Ok(path) => dump.dumped.push(path),
                Err(e) => {
                    warn!(namespace = %self.namespace(), node = %node.name, "failed to dump logs: {e}");
                    dump.failed.push((node.name, e.to_string()));
                }
            }
        }

        dump
    }

    /// Tear the network down: stop monitoring, release the namespace and everything spawned in
    /// it, and mark the network stopped.
    ///
    /// Calling `stop` again, or concurrently, is a no-op. If releasing the namespace fails the
    /// network is left in its current state, so `stop` can be retried.
    pub async fn stop(&self) -> Result<()> {
        let _stopping = self.inner.stopping.lock().await;

        let state = self.state();
        if state == NetworkState::Stopped {
            debug!(namespace = %self.namespace(), "network already stopped");
            return Ok(());
        }

        self.inner.cancel.cancel();
        let monitor = lock(&self.inner.monitor).take();
        if let Some(monitor) = monitor {
            let _ = monitor.await;
        }

        if state.holds_namespace() {
            self.reporter()
                .step(self.namespace(), "Deleting network namespace");
            self.inner
                .client
                .destroy_namespace()
                .await
                .map_err(Error::provider("destroy_namespace"))?;
        }

        *lock(&self.inner.state) = NetworkState::Stopped;
        self.reporter().step(self.namespace(), "Network stopped");
        Ok(())
    }
}

impl fmt::Debug for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Network")
            .field("namespace", &self.inner.namespace)
            .field("workspace", &self.inner.workspace)
            .field("scope", &self.inner.scope)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

async fn monitor_nodes(inner: Weak<Inner>, cancel: CancellationToken, interval: Duration) {
    let mut exited = HashSet::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        let Some(inner) = inner.upgrade() else {
            break;
        };

        let names: Vec<String> = lock(&inner.nodes).iter().map(|n| n.name.clone()).collect();
        for name in names {
            match inner.client.is_node_running(&name).await {
                Ok(true) => {
                    exited.remove(&name);
                }
                Ok(false) => {
                    if exited.insert(name.clone()) {
                        warn!(namespace = %inner.namespace, node = %name, "node is no longer running");
                    }
                }
                Err(e) => debug!(namespace = %inner.namespace, node = %name, "liveness check failed: {e}"),
            }
        }
    }
}
