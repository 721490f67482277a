//! The per-launch client contract.

use std::collections::BTreeMap;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// How long a spawned node may take to become reachable when nothing else is configured.
pub const DEFAULT_SPAWN_TIMEOUT: Duration = Duration::from_secs(300);

/// A request to start one node inside the client's namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnRequest {
    /// Unique node name within the namespace.
    pub name: String,
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    /// Directory the node keeps its database in.
    pub data_dir: PathBuf,
}

/// What the client reports back about a started node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnedNode {
    pub name: String,
    /// Process id, when the backend exposes one.
    pub pid: Option<u32>,
    /// Where the node's output is written on the provider side.
    pub log_path: PathBuf,
}

/// Captured output of a command run through a client.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// `None` if the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// A provider-bound handle, scoped to one namespace for the duration of one launch.
///
/// Clients are shared by concurrent spawn operations, so implementations must be `Send + Sync`
/// and do their own locking where the backend needs it.
#[async_trait]
pub trait Client: fmt::Debug + Send + Sync {
    fn namespace(&self) -> &str;

    /// The working directory as seen from the nodes.
    fn remote_dir(&self) -> &Path;

    /// Address nodes listen on, as reachable from the orchestrator.
    fn bind_address(&self) -> IpAddr {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    }

    /// Whether nodes bind ports on the local host.
    fn is_local(&self) -> bool {
        false
    }

    /// Per-node deadline for becoming reachable.
    fn spawn_timeout(&self) -> Duration;

    fn set_spawn_timeout(&mut self, timeout: Duration);

    /// Check that the backend is reachable with the given credentials.
    async fn validate_access(&self) -> bool;

    async fn create_namespace(&self) -> Result<()>;

    /// Release the namespace and everything spawned in it.
    async fn destroy_namespace(&self) -> Result<()>;

    /// Run a short-lived command in the backend's environment.
    async fn run_command(&self, program: &str, args: &[String]) -> Result<CommandOutput>;

    async fn spawn_node(&self, request: SpawnRequest) -> Result<SpawnedNode>;

    async fn is_node_running(&self, name: &str) -> Result<bool>;

    /// Whether something accepts connections on the node's RPC address.
    async fn probe_rpc(&self, addr: SocketAddr) -> bool {
        tokio::net::TcpStream::connect(addr).await.is_ok()
    }

    /// Copy the named node's logs into `<local_dir>/logs/<name>.log`.
    async fn dump_logs(&self, local_dir: &Path, name: &str) -> Result<PathBuf>;
}
