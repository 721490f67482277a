//! The native provider: every node is a process on the local host.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use zombie_types::{ComputedRelaychain, ProviderKind};

use crate::client::{Client, CommandOutput, DEFAULT_SPAWN_TIMEOUT, SpawnRequest, SpawnedNode};
use crate::provider::Provider;
use crate::{Credentials, ProviderError, Result};

/// Spawns nodes as child processes of the orchestrator.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeProvider;

#[async_trait]
impl Provider for NativeProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Native
    }

    fn init_client(
        &self,
        _credentials: &Credentials,
        namespace: &str,
        workspace: &Path,
    ) -> Result<Box<dyn Client>> {
        Ok(Box::new(NativeClient::new(namespace, workspace)))
    }

    async fn setup_chain_spec(
        &self,
        client: &dyn Client,
        relaychain: &ComputedRelaychain,
        chain_name: &str,
        output: &Path,
    ) -> Result<()> {
        if let Some(path) = &relaychain.chain_spec_path {
            info!(?path, "using provided chain spec");
            tokio::fs::copy(path, output)
                .await
                .map_err(|source| ProviderError::io(format!("failed to copy {path:?}"), source))?;
            return Ok(());
        }

        let args = build_spec_args(chain_name, false);
        let spec = run_checked(client, &relaychain.chain_spec_command, &args).await?;
        write_file(output, spec.stdout.as_bytes()).await
    }

    async fn get_chain_spec_raw(
        &self,
        client: &dyn Client,
        relaychain: &ComputedRelaychain,
        _chain_name: &str,
        plain: &Path,
        raw_output: &Path,
    ) -> Result<PathBuf> {
        let args = build_spec_args(&plain.to_string_lossy(), true);
        let spec = run_checked(client, &relaychain.chain_spec_command, &args).await?;
        write_file(raw_output, spec.stdout.as_bytes()).await?;
        Ok(raw_output.to_path_buf())
    }
}

fn build_spec_args(chain: &str, raw: bool) -> Vec<String> {
    let mut args = vec!["build-spec".to_string(), "--chain".to_string(), chain.to_string()];
    if raw {
        args.push("--raw".to_string());
    }
    args.push("--disable-default-bootnode".to_string());
    args
}

async fn run_checked(client: &dyn Client, program: &str, args: &[String]) -> Result<CommandOutput> {
    let output = client.run_command(program, args).await?;
    if !output.success() {
        return Err(ProviderError::CommandFailed {
            program: program.to_string(),
            exit_code: output.exit_code,
            stderr: output.stderr,
        });
    }
    Ok(output)
}

async fn write_file(path: &Path, contents: &[u8]) -> Result<()> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|source| ProviderError::io(format!("failed to write {path:?}"), source))
}

#[derive(Debug)]
struct NativeProcess {
    child: Child,
    log_path: PathBuf,
}

/// A client whose namespace is the set of processes it spawned.
#[derive(Debug)]
pub struct NativeClient {
    namespace: String,
    workspace: PathBuf,
    spawn_timeout: Duration,
    processes: Mutex<HashMap<String, NativeProcess>>,
}

impl NativeClient {
    pub fn new(namespace: &str, workspace: &Path) -> Self {
        Self {
            namespace: namespace.to_string(),
            workspace: workspace.to_path_buf(),
            spawn_timeout: DEFAULT_SPAWN_TIMEOUT,
            processes: Mutex::new(HashMap::new()),
        }
    }

    fn log_path(&self, name: &str) -> PathBuf {
        self.workspace.join(format!("{name}.log"))
    }
}

#[async_trait]
impl Client for NativeClient {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn remote_dir(&self) -> &Path {
        &self.workspace
    }

    fn is_local(&self) -> bool {
        true
    }

    fn spawn_timeout(&self) -> Duration {
        self.spawn_timeout
    }

    fn set_spawn_timeout(&mut self, timeout: Duration) {
        self.spawn_timeout = timeout;
    }

    async fn validate_access(&self) -> bool {
        let workspace_ok = tokio::fs::metadata(&self.workspace)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !workspace_ok {
            warn!(workspace = ?self.workspace, "workspace is not a directory");
            return false;
        }
        match which::which("sh") {
            Ok(_) => true,
            Err(e) => {
                warn!("no shell found on PATH: {e}");
                false
            }
        }
    }

    async fn create_namespace(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.workspace)
            .await
            .map_err(|source| {
                ProviderError::io(format!("failed to create {:?}", self.workspace), source)
            })?;
        debug!(namespace = %self.namespace, "native namespace ready");
        Ok(())
    }

    async fn destroy_namespace(&self) -> Result<()> {
        let mut processes = self.processes.lock().await;
        for (name, mut process) in processes.drain() {
            if let Err(e) = process.child.start_kill() {
                // The process may have already exited.
                if e.kind() != std::io::ErrorKind::InvalidInput {
                    warn!("failed to kill {name}: {e}");
                }
            }
            let _ = process.child.wait().await;
            debug!(node = %name, "process terminated");
        }
        info!(namespace = %self.namespace, "namespace destroyed");
        Ok(())
    }

    async fn run_command(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        let output = Command::new(program)
            .args(args)
            .current_dir(&self.workspace)
            .output()
            .await
            .map_err(|source| ProviderError::io(format!("failed to run `{program}`"), source))?;

        Ok(CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn spawn_node(&self, request: SpawnRequest) -> Result<SpawnedNode> {
        let mut processes = self.processes.lock().await;
        if processes.contains_key(&request.name) {
            return Err(ProviderError::DuplicateNode(request.name));
        }

        tokio::fs::create_dir_all(&request.data_dir)
            .await
            .map_err(|source| {
                ProviderError::io(format!("failed to create {:?}", request.data_dir), source)
            })?;

        let log_path = self.log_path(&request.name);
        let stdout = std::fs::File::create(&log_path)
            .map_err(|source| ProviderError::io(format!("failed to create {log_path:?}"), source))?;
        let stderr = stdout
            .try_clone()
            .map_err(|source| ProviderError::io(format!("failed to clone {log_path:?}"), source))?;

        info!(node = %request.name, "starting {} {}", request.program, request.args.join(" "));
        let child = Command::new(&request.program)
            .args(&request.args)
            .envs(&request.env)
            .current_dir(&self.workspace)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| {
                ProviderError::io(
                    format!(
                        "failed to start {} (binary `{}` not found in PATH or at the given path)",
                        request.name, request.program
                    ),
                    source,
                )
            })?;

        let pid = child.id();
        processes.insert(
            request.name.clone(),
            NativeProcess {
                child,
                log_path: log_path.clone(),
            },
        );

        Ok(SpawnedNode {
            name: request.name,
            pid,
            log_path,
        })
    }

    async fn is_node_running(&self, name: &str) -> Result<bool> {
        let mut processes = self.processes.lock().await;
        let process = processes
            .get_mut(name)
            .ok_or_else(|| ProviderError::UnknownNode(name.to_string()))?;
        match process.child.try_wait() {
            Ok(None) => Ok(true),
            Ok(Some(status)) => {
                debug!(node = %name, %status, "process exited");
                Ok(false)
            }
            Err(source) => Err(ProviderError::io(format!("failed to poll {name}"), source)),
        }
    }

    async fn dump_logs(&self, local_dir: &Path, name: &str) -> Result<PathBuf> {
        let source = {
            let processes = self.processes.lock().await;
            processes
                .get(name)
                .map(|p| p.log_path.clone())
                .unwrap_or_else(|| self.log_path(name))
        };

        let logs_dir = local_dir.join("logs");
        tokio::fs::create_dir_all(&logs_dir)
            .await
            .map_err(|e| ProviderError::io(format!("failed to create {logs_dir:?}"), e))?;

        let target = logs_dir.join(format!("{name}.log"));
        tokio::fs::copy(&source, &target)
            .await
            .map_err(|e| ProviderError::io(format!("failed to copy {source:?}"), e))?;
        Ok(target)
    }
}
