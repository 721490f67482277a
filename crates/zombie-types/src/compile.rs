//! The network spec compiler: [`LaunchConfig`] in, [`ComputedNetwork`] out.

use std::collections::{HashMap, HashSet};

use crate::computed::{
    ComputedNetwork, ComputedNode, ComputedParachain, ComputedRelaychain, ComputedSettings,
    NodeRole,
};
use crate::config::{LaunchConfig, NodeConfig, ProviderKind};
use crate::reference;
use crate::CompileError;

/// Global launch deadline used when the configuration sets none, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 1000;
pub const DEFAULT_RELAY_COMMAND: &str = "polkadot";
pub const DEFAULT_COLLATOR_COMMAND: &str = "polkadot-parachain";

/// Resolve and validate a launch configuration.
///
/// Fills in every default the orchestrator relies on, so that the returned specification has
/// no optional field the launch sequence needs to dereference.
pub fn compile(config: LaunchConfig) -> Result<ComputedNetwork, CompileError> {
    let LaunchConfig {
        settings,
        relaychain,
        parachains,
        types,
    } = config;

    if relaychain.chain.trim().is_empty() {
        return Err(CompileError::EmptyChainName);
    }
    if relaychain.nodes.is_empty() {
        return Err(CompileError::NoRelayNodes);
    }

    let timeout = settings.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS);
    if timeout == 0 {
        return Err(CompileError::ZeroTimeout);
    }
    if settings.node_spawn_timeout == Some(0) {
        return Err(CompileError::ZeroTimeout);
    }

    let default_command = relaychain
        .default_command
        .unwrap_or_else(|| DEFAULT_RELAY_COMMAND.to_string());

    let nodes = relaychain
        .nodes
        .into_iter()
        .map(|node| {
            let role = if node.validator {
                NodeRole::Validator
            } else {
                NodeRole::FullNode
            };
            compute_node(node, &default_command, &relaychain.default_args, role, None)
        })
        .collect();

    let mut para_ids = HashSet::new();
    let mut computed_parachains = Vec::with_capacity(parachains.len());
    for para in parachains {
        if !para_ids.insert(para.id) {
            return Err(CompileError::DuplicateParachainId(para.id));
        }
        if para.register_in_genesis {
            if para.genesis_state_path.is_none() {
                return Err(CompileError::MissingGenesisFile {
                    para_id: para.id,
                    kind: "genesis_state_path",
                });
            }
            if para.genesis_wasm_path.is_none() {
                return Err(CompileError::MissingGenesisFile {
                    para_id: para.id,
                    kind: "genesis_wasm_path",
                });
            }
        }

        let collators = para
            .collators
            .into_iter()
            .map(|node| {
                compute_node(
                    node,
                    DEFAULT_COLLATOR_COMMAND,
                    &[],
                    NodeRole::Collator,
                    Some(para.id),
                )
            })
            .collect();

        computed_parachains.push(ComputedParachain {
            id: para.id,
            chain: para.chain,
            register_in_genesis: para.register_in_genesis,
            genesis_state_path: para.genesis_state_path,
            genesis_wasm_path: para.genesis_wasm_path,
            collators,
        });
    }

    let network = ComputedNetwork {
        settings: ComputedSettings {
            provider: settings.provider.unwrap_or(ProviderKind::Native),
            timeout,
            node_spawn_timeout: settings.node_spawn_timeout,
            bootnode: settings.bootnode.unwrap_or(true),
        },
        relaychain: ComputedRelaychain {
            chain: relaychain.chain,
            chain_spec_command: relaychain
                .chain_spec_command
                .unwrap_or_else(|| default_command.clone()),
            default_command,
            chain_spec_path: relaychain.chain_spec_path,
            nodes,
        },
        parachains: computed_parachains,
        types,
    };

    validate_names(&network)?;
    validate_references(&network)?;

    Ok(network)
}

fn compute_node(
    node: NodeConfig,
    default_command: &str,
    default_args: &[String],
    role: NodeRole,
    para_id: Option<u32>,
) -> ComputedNode {
    let args = if node.args.is_empty() {
        default_args.to_vec()
    } else {
        node.args
    };

    ComputedNode {
        name: node.name,
        command: node.command.unwrap_or_else(|| default_command.to_string()),
        args,
        role,
        env: node.env,
        para_id,
    }
}

/// Node names become directory names and pod names, so keep them DNS-label shaped.
fn validate_names(network: &ComputedNetwork) -> Result<(), CompileError> {
    let mut seen = HashSet::new();
    for node in network.nodes() {
        let valid = !node.name.is_empty()
            && node.name.len() <= 63
            && node
                .name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
            && !node.name.starts_with('-');
        if !valid {
            return Err(CompileError::InvalidNodeName(node.name.clone()));
        }
        if !seen.insert(node.name.as_str()) {
            return Err(CompileError::DuplicateNodeName(node.name.clone()));
        }
    }
    Ok(())
}

/// Every reference in a node's arguments or environment must name a known field of a node
/// spawned earlier. Commands are not resolved at spawn time, so they may not hold any.
fn validate_references(network: &ComputedNetwork) -> Result<(), CompileError> {
    let spawn_order: HashMap<&str, usize> = network
        .nodes()
        .enumerate()
        .map(|(i, node)| (node.name.as_str(), i))
        .collect();

    for (position, node) in network.nodes().enumerate() {
        if reference::contains_reference(&node.command) {
            return Err(CompileError::ReferenceInCommand(node.name.clone()));
        }

        let resolved_at_spawn = node.args.iter().chain(node.env.values());
        for reference in resolved_at_spawn.flat_map(|text| reference::find_references(text)) {
            if reference.field.is_none() {
                return Err(CompileError::UnknownReferenceField {
                    node: node.name.clone(),
                    reference: reference.to_string(),
                });
            }
            match spawn_order.get(reference.node.as_str()) {
                None => {
                    return Err(CompileError::UnknownReferencedNode {
                        node: node.name.clone(),
                        reference: reference.to_string(),
                    });
                }
                Some(&target) if target >= position => {
                    return Err(CompileError::ForwardReference {
                        node: node.name.clone(),
                        reference: reference.to_string(),
                    });
                }
                Some(_) => {}
            }
        }
    }
    Ok(())
}
