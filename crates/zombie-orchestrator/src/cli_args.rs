//! Detection of the command line dialect spoken by each node binary.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;
use zombie_provider::Client;
use zombie_types::ComputedNetwork;

use crate::{Error, Result};

/// Flag only understood by binaries that still expose a separate websocket port.
const LEGACY_WS_FLAG: &str = "--ws-port";

/// Command line dialect of a node binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CliArgsVersion {
    /// Separate `--ws-port` and `--rpc-port`.
    V0,
    /// A single `--rpc-port` serving both http and websocket.
    #[default]
    V1,
}

impl CliArgsVersion {
    /// Classify a binary from its `--help` output.
    pub fn from_help(help: &str) -> Self {
        if help.contains(LEGACY_WS_FLAG) {
            Self::V0
        } else {
            Self::V1
        }
    }

    /// Arguments that open the node's RPC endpoint on `port`.
    pub fn rpc_args(self, port: u16) -> Vec<String> {
        let mut args = match self {
            Self::V0 => vec![
                "--ws-port".to_string(),
                port.to_string(),
                "--unsafe-ws-external".to_string(),
            ],
            Self::V1 => vec!["--rpc-port".to_string(), port.to_string()],
        };
        args.extend(["--rpc-external".to_string(), "--rpc-cors=all".to_string()]);
        args
    }
}

/// Dialect per distinct node command.
#[derive(Debug, Clone, Default)]
pub struct CliArgsVersions {
    versions: BTreeMap<String, CliArgsVersion>,
}

impl CliArgsVersions {
    /// The dialect of `command`, assuming the current one for commands that were not probed.
    pub fn get(&self, command: &str) -> CliArgsVersion {
        self.versions.get(command).copied().unwrap_or_default()
    }

    pub fn insert(&mut self, command: impl Into<String>, version: CliArgsVersion) {
        self.versions.insert(command.into(), version);
    }
}

/// Run `<command> --help` through `client` once for every distinct node command.
pub(crate) async fn detect_cli_args_versions(
    client: &dyn Client,
    network: &ComputedNetwork,
) -> Result<CliArgsVersions> {
    let commands: BTreeSet<&str> = network.nodes().map(|n| n.command.as_str()).collect();

    let mut versions = CliArgsVersions::default();
    for command in commands {
        let output = client
            .run_command(command, &["--help".to_string()])
            .await
            .map_err(Error::provider("run_command"))?;
        let version = CliArgsVersion::from_help(&output.stdout);
        debug!(%command, ?version, "detected command line dialect");
        versions.insert(command, version);
    }
    Ok(versions)
}
