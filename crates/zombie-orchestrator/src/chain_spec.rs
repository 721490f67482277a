//! Relay chain spec generation and customization.
//!
//! The provider produces the plain spec; when the spec was generated rather than supplied, it is
//! customized here (stale boot nodes removed, parachains registered in genesis) before the
//! provider converts it to the raw form. Boot nodes are written into the raw spec last.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value, json};
use tracing::debug;
use zombie_provider::{Client, Provider};
use zombie_types::{ComputedNetwork, ComputedParachain};

use crate::workspace::ChainSpecPaths;
use crate::{Error, Result};

pub async fn read_chain_spec(path: &Path) -> Result<Value> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(Error::workspace(path))?;
    serde_json::from_str(&contents).map_err(|e| Error::ChainSpec {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

pub async fn write_chain_spec(path: &Path, spec: &Value) -> Result<()> {
    let contents = serde_json::to_string_pretty(spec).map_err(|e| Error::ChainSpec {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    tokio::fs::write(path, contents)
        .await
        .map_err(Error::workspace(path))
}

/// Replace the spec's boot nodes.
pub fn set_boot_nodes(spec: &mut Value, boot_nodes: &[String]) -> std::result::Result<(), String> {
    let object = spec
        .as_object_mut()
        .ok_or_else(|| "chain spec is not a JSON object".to_string())?;
    object.insert("bootNodes".to_string(), json!(boot_nodes));
    Ok(())
}

/// The runtime genesis configuration of a plain spec, whichever layout the node binary used.
pub fn runtime_config_mut(spec: &mut Value) -> Option<&mut Map<String, Value>> {
    let genesis = spec.get_mut("genesis")?.as_object_mut()?;

    if genesis.contains_key("runtimeGenesis") {
        let runtime_genesis = genesis.get_mut("runtimeGenesis")?.as_object_mut()?;
        let key = if runtime_genesis.contains_key("patch") {
            "patch"
        } else {
            "config"
        };
        return runtime_genesis.get_mut(key)?.as_object_mut();
    }

    let runtime = genesis.get_mut("runtime")?.as_object_mut()?;
    if runtime.contains_key("runtime_genesis_config") {
        return runtime.get_mut("runtime_genesis_config")?.as_object_mut();
    }
    Some(runtime)
}

/// Register a parachain in the relay chain genesis, replacing any earlier registration of the
/// same id.
pub fn add_parachain_to_genesis(
    spec: &mut Value,
    para_id: u32,
    genesis_head: &str,
    validation_code: &str,
) -> std::result::Result<(), String> {
    let runtime =
        runtime_config_mut(spec).ok_or_else(|| "no runtime genesis config found".to_string())?;

    let paras = runtime
        .entry("paras")
        .or_insert_with(|| json!({ "paras": [] }))
        .as_object_mut()
        .ok_or_else(|| "`paras` is not an object".to_string())?
        .entry("paras")
        .or_insert_with(|| json!([]))
        .as_array_mut()
        .ok_or_else(|| "`paras.paras` is not an array".to_string())?;

    paras.retain(|entry| entry.get(0).and_then(Value::as_u64) != Some(u64::from(para_id)));
    paras.push(json!([para_id, [genesis_head, validation_code, true]]));
    Ok(())
}

/// Remove boot nodes baked into a generated spec, and register every parachain that asks for
/// genesis registration.
pub async fn customize_plain_relay_chain(
    path: &Path,
    parachains: &[ComputedParachain],
) -> Result<()> {
    let mut spec = read_chain_spec(path).await?;
    let invalid = |reason: String| Error::ChainSpec {
        path: path.to_path_buf(),
        reason,
    };

    set_boot_nodes(&mut spec, &[]).map_err(invalid)?;

    for parachain in parachains.iter().filter(|p| p.register_in_genesis) {
        let head = read_genesis_artifact(parachain, parachain.genesis_state_path.as_deref()).await?;
        let wasm = read_genesis_artifact(parachain, parachain.genesis_wasm_path.as_deref()).await?;
        add_parachain_to_genesis(&mut spec, parachain.id, &head, &wasm).map_err(invalid)?;
        debug!(para_id = parachain.id, "parachain registered in genesis");
    }

    write_chain_spec(path, &spec).await
}

async fn read_genesis_artifact(parachain: &ComputedParachain, path: Option<&Path>) -> Result<String> {
    let path = path.ok_or_else(|| Error::ChainSpec {
        path: PathBuf::new(),
        reason: format!("parachain {} has no genesis artifacts", parachain.id),
    })?;
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(Error::workspace(path))?;
    Ok(contents.trim().to_string())
}

/// Write `boot_nodes` into the raw spec at `path`.
pub async fn add_boot_nodes(path: &Path, boot_nodes: &[String]) -> Result<()> {
    let mut spec = read_chain_spec(path).await?;
    set_boot_nodes(&mut spec, boot_nodes).map_err(|reason| Error::ChainSpec {
        path: path.to_path_buf(),
        reason,
    })?;
    write_chain_spec(path, &spec).await
}

/// Produce the raw relay chain spec for `network` at `paths.raw`.
pub(crate) async fn prepare_relay_chain_spec(
    provider: &dyn Provider,
    client: &dyn Client,
    network: &ComputedNetwork,
    paths: &ChainSpecPaths,
    boot_nodes: &[String],
) -> Result<PathBuf> {
    let relaychain = &network.relaychain;

    provider
        .setup_chain_spec(client, relaychain, &relaychain.chain, &paths.plain)
        .await
        .map_err(Error::provider("setup_chain_spec"))?;

    if relaychain.chain_spec_path.is_none() {
        customize_plain_relay_chain(&paths.plain, &network.parachains).await?;
    }

    let raw = provider
        .get_chain_spec_raw(
            client,
            relaychain,
            &relaychain.chain,
            &paths.plain,
            &paths.raw,
        )
        .await
        .map_err(Error::provider("get_chain_spec_raw"))?;

    add_boot_nodes(&raw, boot_nodes).await?;
    Ok(raw)
}
