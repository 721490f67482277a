//! Planning and spawning the nodes of a network.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use futures::future::BoxFuture;
use futures::{FutureExt as _, StreamExt as _, TryStreamExt as _};
use tracing::debug;
use zombie_provider::{Client, SpawnRequest};
use zombie_types::reference::replace_references;
use zombie_types::{ComputedNetwork, ComputedNode, NodeRole};

use crate::cli_args::CliArgsVersions;
use crate::network::Network;
use crate::node::{NetworkNode, NodeKey, bootnode_multiaddr};
use crate::ports::{NodePorts, PortAllocationStrategy, check_ports_available};
use crate::{Error, Result};

/// A node with its identity, ports and directories decided, ready to be spawned.
#[derive(Debug, Clone)]
pub struct PlannedNode {
    pub spec: ComputedNode,
    /// The chain a collator builds, when it differs from the relay chain.
    pub para_chain: Option<String>,
    pub ports: NodePorts,
    pub key: NodeKey,
    pub data_dir: PathBuf,
}

impl PlannedNode {
    pub fn is_collator(&self) -> bool {
        self.spec.role == NodeRole::Collator
    }
}

/// Every node of the network in spawn order, relay chain nodes first.
#[derive(Debug, Clone)]
pub struct NodePlan {
    pub nodes: Vec<PlannedNode>,
}

impl NodePlan {
    /// Decide ports by spawn position and generate a fresh node key for every node.
    pub fn new(
        network: &ComputedNetwork,
        strategy: &PortAllocationStrategy,
        remote_dir: &Path,
    ) -> Result<Self> {
        let nodes = network
            .nodes()
            .enumerate()
            .map(|(index, spec)| {
                let para_chain = spec.para_id.and_then(|id| {
                    network
                        .parachains
                        .iter()
                        .find(|p| p.id == id)
                        .and_then(|p| p.chain.clone())
                });
                Ok(PlannedNode {
                    spec: spec.clone(),
                    para_chain,
                    ports: strategy.allocate(index)?,
                    key: NodeKey::generate(),
                    data_dir: remote_dir.join(&spec.name).join("data"),
                })
            })
            .collect::<Result<_>>()?;
        Ok(Self { nodes })
    }

    pub fn relay_nodes(&self) -> impl Iterator<Item = &PlannedNode> {
        self.nodes.iter().filter(|n| !n.is_collator())
    }

    pub fn collators(&self) -> impl Iterator<Item = &PlannedNode> {
        self.nodes.iter().filter(|n| n.is_collator())
    }

    /// The multiaddr of the first relay chain node, which every other node bootstraps from.
    pub fn boot_nodes(&self, client: &dyn Client) -> Vec<String> {
        self.relay_nodes()
            .take(1)
            .map(|n| bootnode_multiaddr(client.bind_address(), n.ports.p2p, n.key.peer_id()))
            .collect()
    }

    /// Every port the plan binds on the host, for the local preflight check.
    pub fn host_ports(&self) -> Vec<(u16, String)> {
        self.nodes
            .iter()
            .flat_map(|n| {
                let mut ports = vec![
                    (n.ports.p2p, format!("{} p2p", n.spec.name)),
                    (n.ports.rpc, format!("{} rpc", n.spec.name)),
                    (n.ports.prometheus, format!("{} prometheus", n.spec.name)),
                ];
                if n.is_collator() {
                    ports.push((
                        n.ports.embedded_relay_p2p(),
                        format!("{} relay p2p", n.spec.name),
                    ));
                }
                ports
            })
            .collect()
    }
}

/// Everything the spawner needs besides the plan.
pub(crate) struct SpawnContext<'a> {
    pub network: &'a Network,
    pub chain_spec: &'a Path,
    pub boot_nodes: &'a [String],
    pub versions: &'a CliArgsVersions,
    pub concurrency: NonZeroUsize,
}

/// Spawn the relay chain nodes, then the collators, at most `concurrency` at a time, and
/// register each one in the network as soon as it is up.
pub(crate) async fn spawn_nodes(plan: &NodePlan, ctx: &SpawnContext<'_>) -> Result<()> {
    let client = ctx.network.client();
    if client.is_local() {
        check_ports_available(&plan.host_ports())?;
    }

    let reporter = ctx.network.reporter();
    let namespace = ctx.network.namespace();

    reporter.step(namespace, "Spawning relay chain nodes");
    spawn_group(plan.relay_nodes().collect(), ctx).await?;

    let collators: Vec<_> = plan.collators().collect();
    if !collators.is_empty() {
        reporter.step(namespace, "Spawning collators");
        spawn_group(collators, ctx).await?;
    }

    Ok(())
}

async fn spawn_group<'a>(nodes: Vec<&'a PlannedNode>, ctx: &'a SpawnContext<'a>) -> Result<()> {
    // boxed, the launch future must stay `Send`
    let spawns: Vec<BoxFuture<'a, Result<()>>> = nodes
        .into_iter()
        .map(|node| spawn_node(node, ctx).boxed())
        .collect();

    futures::stream::iter(spawns)
        .buffer_unordered(ctx.concurrency.get())
        .try_collect::<Vec<()>>()
        .await?;
    Ok(())
}

async fn spawn_node(node: &PlannedNode, ctx: &SpawnContext<'_>) -> Result<()> {
    let network = ctx.network;
    let client = network.client();
    let bind_address = client.bind_address();

    let args = node_args(node, ctx)
        .into_iter()
        .map(|arg| resolve_references(network, &node.spec.name, &arg))
        .collect::<Result<Vec<_>>>()?;
    let env = node
        .spec
        .env
        .iter()
        .map(|(k, v)| resolve_references(network, &node.spec.name, v).map(|v| (k.clone(), v)))
        .collect::<Result<BTreeMap<_, _>>>()?;

    network
        .reporter()
        .step(network.namespace(), format!("Launching {}", node.spec.name));
    debug!(node = %node.spec.name, "{} {}", node.spec.command, args.join(" "));

    let spawned = client
        .spawn_node(SpawnRequest {
            name: node.spec.name.clone(),
            program: node.spec.command.clone(),
            args,
            env,
            data_dir: node.data_dir.clone(),
        })
        .await
        .map_err(Error::provider("spawn_node"))?;

    network.add_node(NetworkNode {
        name: node.spec.name.clone(),
        role: node.spec.role,
        para_id: node.spec.para_id,
        ports: node.ports,
        bind_address,
        peer_id: node.key.peer_id().to_string(),
        data_dir: node.data_dir.clone(),
        log_path: spawned.log_path,
        pid: spawned.pid,
    })
}

/// Substitute `{{ZOMBIE:<node>:<field>}}` tokens with values of already registered nodes.
fn resolve_references(network: &Network, node: &str, text: &str) -> Result<String> {
    replace_references(text, |name, field| {
        network.node(name).map(|target| target.field(field))
    })
    .map_err(|reference| Error::UnresolvedReference {
        node: node.to_string(),
        reference: reference.to_string(),
    })
}

/// The full command line of a node: the orchestrator's arguments followed by the user's.
///
/// Collators also get the arguments of their embedded relay chain node after `--`.
pub(crate) fn node_args(node: &PlannedNode, ctx: &SpawnContext<'_>) -> Vec<String> {
    let spec = &node.spec;
    let chain_spec = ctx.chain_spec.to_string_lossy().into_owned();
    let mut args = vec!["--name".to_string(), spec.name.clone()];

    match (&node.para_chain, node.is_collator()) {
        (Some(chain), true) => args.extend(["--chain".to_string(), chain.clone()]),
        (None, true) => {}
        (_, false) => args.extend(["--chain".to_string(), chain_spec.clone()]),
    }

    args.extend([
        "--base-path".to_string(),
        node.data_dir.to_string_lossy().into_owned(),
        "--listen-addr".to_string(),
        format!("/ip4/0.0.0.0/tcp/{}", node.ports.p2p),
        "--prometheus-port".to_string(),
        node.ports.prometheus.to_string(),
        "--prometheus-external".to_string(),
        "--node-key".to_string(),
        node.key.secret_hex(),
    ]);
    args.extend(ctx.versions.get(&spec.command).rpc_args(node.ports.rpc));

    if spec.role.is_validator() {
        args.push("--validator".to_string());
    }
    if spec.role == NodeRole::Collator {
        args.push("--collator".to_string());
    }

    let own_multiaddr = bootnode_multiaddr(
        ctx.network.client().bind_address(),
        node.ports.p2p,
        node.key.peer_id(),
    );
    let boot_nodes: Vec<&String> = ctx
        .boot_nodes
        .iter()
        .filter(|addr| **addr != own_multiaddr)
        .collect();
    if !boot_nodes.is_empty() && !node.is_collator() {
        args.push("--bootnodes".to_string());
        args.extend(boot_nodes.iter().map(|addr| addr.to_string()));
    }

    args.extend(spec.args.iter().cloned());

    if node.is_collator() {
        args.extend([
            "--".to_string(),
            "--chain".to_string(),
            chain_spec,
            "--port".to_string(),
            node.ports.embedded_relay_p2p().to_string(),
        ]);
        if !boot_nodes.is_empty() {
            args.push("--bootnodes".to_string());
            args.extend(boot_nodes.iter().map(|addr| addr.to_string()));
        }
    }

    args
}
