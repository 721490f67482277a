//! A recording in-memory provider for driving launches without real node binaries.
//!
//! `MockProvider` registers as the native provider, so an [`Orchestrator`] built with
//! [`orchestrator`] routes every launch through it. All calls land in a shared [`MockState`],
//! whose switches let a test make access validation fail, namespace creation hang, or nodes die
//! right after they are spawned.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use zombie_orchestrator::{Confirm, Orchestrator};
use zombie_provider::{
    Client, CommandOutput, Credentials, Provider, ProviderKind, SpawnRequest, SpawnedNode,
};
use zombie_types::{
    ComputedRelaychain, LaunchConfig, NodeConfig, RelaychainConfig, SettingsConfig,
};

/// A provider or client call, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    InitClient(String),
    ValidateAccess,
    CreateNamespace,
    DestroyNamespace,
    RunCommand(String),
    SetupChainSpec,
    GetChainSpecRaw,
    SpawnNode(String),
    DumpLogs(String),
}

#[derive(Debug)]
pub struct MockState {
    calls: Mutex<Vec<Call>>,
    requests: Mutex<Vec<SpawnRequest>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    /// What `validate_access` answers.
    pub access: AtomicBool,
    /// Make `create_namespace` never complete.
    pub hang_create_namespace: AtomicBool,
    /// Report every node as not running.
    pub nodes_die: AtomicBool,
    /// How long each `spawn_node` takes, in milliseconds.
    pub spawn_delay_ms: AtomicU64,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            access: AtomicBool::new(true),
            hang_create_namespace: AtomicBool::new(false),
            nodes_die: AtomicBool::new(false),
            spawn_delay_ms: AtomicU64::new(0),
        }
    }
}

impl MockState {
    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    pub fn called(&self, call: &Call) -> bool {
        self.count(call) > 0
    }

    /// Position of the first occurrence of `call`.
    pub fn position(&self, call: &Call) -> Option<usize> {
        self.calls().iter().position(|c| c == call)
    }

    /// Spawn requests, in the order they reached the client.
    pub fn requests(&self) -> Vec<SpawnRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request(&self, name: &str) -> SpawnRequest {
        self.requests()
            .into_iter()
            .find(|r| r.name == name)
            .unwrap_or_else(|| panic!("{name} was not spawned"))
    }

    /// Highest number of `spawn_node` calls observed in progress at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
pub struct MockProvider {
    pub state: Arc<MockState>,
}

#[async_trait]
impl Provider for MockProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Native
    }

    fn init_client(
        &self,
        _credentials: &Credentials,
        namespace: &str,
        workspace: &Path,
    ) -> zombie_provider::Result<Box<dyn Client>> {
        self.state.record(Call::InitClient(namespace.to_string()));
        Ok(Box::new(MockClient {
            namespace: namespace.to_string(),
            workspace: workspace.to_path_buf(),
            spawn_timeout: Duration::from_secs(2),
            state: self.state.clone(),
        }))
    }

    async fn setup_chain_spec(
        &self,
        _client: &dyn Client,
        relaychain: &ComputedRelaychain,
        _chain_name: &str,
        output: &Path,
    ) -> zombie_provider::Result<()> {
        self.state.record(Call::SetupChainSpec);
        let spec = match &relaychain.chain_spec_path {
            Some(path) => std::fs::read_to_string(path).unwrap(),
            None => serde_json::json!({
                "name": "Rococo Local",
                "bootNodes": ["/dns/stale.example/tcp/30333/p2p/12D3KooWstale"],
                "genesis": { "runtimeGenesis": { "patch": { "paras": { "paras": [] } } } }
            })
            .to_string(),
        };
        std::fs::write(output, spec).unwrap();
        Ok(())
    }

    async fn get_chain_spec_raw(
        &self,
        _client: &dyn Client,
        _relaychain: &ComputedRelaychain,
        _chain_name: &str,
        plain: &Path,
        raw_output: &Path,
    ) -> zombie_provider::Result<PathBuf> {
        self.state.record(Call::GetChainSpecRaw);
        std::fs::copy(plain, raw_output).unwrap();
        Ok(raw_output.to_path_buf())
    }
}

#[derive(Debug)]
pub struct MockClient {
    namespace: String,
    workspace: PathBuf,
    spawn_timeout: Duration,
    state: Arc<MockState>,
}

#[async_trait]
impl Client for MockClient {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn remote_dir(&self) -> &Path {
        &self.workspace
    }

    fn spawn_timeout(&self) -> Duration {
        self.spawn_timeout
    }

    fn set_spawn_timeout(&mut self, timeout: Duration) {
        self.spawn_timeout = timeout;
    }

    async fn validate_access(&self) -> bool {
        self.state.record(Call::ValidateAccess);
        self.state.access.load(Ordering::SeqCst)
    }

    async fn create_namespace(&self) -> zombie_provider::Result<()> {
        self.state.record(Call::CreateNamespace);
        if self.state.hang_create_namespace.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn destroy_namespace(&self) -> zombie_provider::Result<()> {
        self.state.record(Call::DestroyNamespace);
        Ok(())
    }

    async fn run_command(
        &self,
        program: &str,
        _args: &[String],
    ) -> zombie_provider::Result<CommandOutput> {
        self.state.record(Call::RunCommand(program.to_string()));
        Ok(CommandOutput {
            exit_code: Some(0),
            stdout: "OPTIONS:\n      --rpc-port <PORT>\n".to_string(),
            stderr: String::new(),
        })
    }

    async fn spawn_node(&self, request: SpawnRequest) -> zombie_provider::Result<SpawnedNode> {
        self.state.record(Call::SpawnNode(request.name.clone()));
        let in_flight = self.state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);

        let delay = self.state.spawn_delay_ms.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(delay)).await;

        self.state.in_flight.fetch_sub(1, Ordering::SeqCst);
        let name = request.name.clone();
        self.state.requests.lock().unwrap().push(request);

        Ok(SpawnedNode {
            log_path: self.workspace.join(format!("{name}.log")),
            name,
            pid: None,
        })
    }

    async fn is_node_running(&self, _name: &str) -> zombie_provider::Result<bool> {
        Ok(!self.state.nodes_die.load(Ordering::SeqCst))
    }

    async fn probe_rpc(&self, _addr: SocketAddr) -> bool {
        !self.state.nodes_die.load(Ordering::SeqCst)
    }

    async fn dump_logs(&self, local_dir: &Path, name: &str) -> zombie_provider::Result<PathBuf> {
        self.state.record(Call::DumpLogs(name.to_string()));
        let logs = local_dir.join("logs");
        std::fs::create_dir_all(&logs).unwrap();
        let target = logs.join(format!("{name}.log"));
        std::fs::write(&target, format!("{name} log\n")).unwrap();
        Ok(target)
    }
}

/// An orchestrator whose native provider is a fresh mock.
pub fn orchestrator() -> (Orchestrator, Arc<MockState>) {
    let provider = Arc::new(MockProvider::default());
    let state = provider.state.clone();
    (Orchestrator::new().with_provider(provider), state)
}

/// A relay chain network with one validator per name and the given global timeout.
pub fn config(names: &[&str], timeout: u64) -> LaunchConfig {
    LaunchConfig {
        settings: SettingsConfig {
            timeout: Some(timeout),
            node_spawn_timeout: Some(2),
            ..SettingsConfig::default()
        },
        relaychain: RelaychainConfig {
            chain: "rococo-local".to_string(),
            nodes: names.iter().map(|name| NodeConfig::named(*name)).collect(),
            ..RelaychainConfig::default()
        },
        ..LaunchConfig::default()
    }
}

/// Answers every question the same way and counts how often it was asked.
#[derive(Debug)]
pub struct ScriptedConfirm {
    answer: bool,
    /// How long the answer takes.
    delay: Duration,
    asked: AtomicUsize,
}

impl ScriptedConfirm {
    pub fn new(answer: bool) -> Arc<Self> {
        Self::answering_after(answer, Duration::ZERO)
    }

    pub fn answering_after(answer: bool, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            answer,
            delay,
            asked: AtomicUsize::new(0),
        })
    }

    pub fn asked(&self) -> usize {
        self.asked.load(Ordering::SeqCst)
    }
}

impl Confirm for ScriptedConfirm {
    fn confirm(&self, _question: &str) -> bool {
        self.asked.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        self.answer
    }
}

/// Best-effort removal of an ephemeral workspace created by a launch.
pub fn remove_workspace(path: &Path) {
    let _ = std::fs::remove_dir_all(path);
}
