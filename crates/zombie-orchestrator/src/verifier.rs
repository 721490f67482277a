//! Liveness verification of freshly spawned nodes.

use std::time::Duration;

use futures::future::try_join_all;
use tokio::time::Instant;
use tracing::debug;

use crate::network::Network;
use crate::node::NetworkNode;
use crate::{Error, Result};

/// Pause between two liveness probes of the same node.
pub const VERIFY_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Stand-in for spawn timeouts too large to add to the current instant (about 30 years).
const UNBOUNDED_DEADLINE: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

/// Wait until every registered node runs and accepts RPC connections, each within the client's
/// spawn timeout.
pub async fn verify_nodes(network: &Network) -> Result<()> {
    network
        .reporter()
        .step(network.namespace(), "Verifying nodes");
    try_join_all(network.nodes().iter().map(|node| verify_node(network, node))).await?;
    Ok(())
}

/// `timeout` from now, or practically never when that is not representable.
fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .unwrap_or_else(|| now + UNBOUNDED_DEADLINE)
}

async fn verify_node(network: &Network, node: &NetworkNode) -> Result<()> {
    let client = network.client();
    let deadline = deadline_after(client.spawn_timeout());
    let addr = node.rpc_socket_addr();

    loop {
        let running = client
            .is_node_running(&node.name)
            .await
            .map_err(Error::provider("is_node_running"))?;
        if !running {
            return Err(Error::NodeVerification {
                node: node.name.clone(),
                reason: "process is not running".to_string(),
            });
        }

        if client.probe_rpc(addr).await {
            debug!(node = %node.name, %addr, "node is up");
            return Ok(());
        }

        if Instant::now() >= deadline {
            return Err(Error::NodeVerification {
                node: node.name.clone(),
                reason: format!(
                    "rpc endpoint {addr} not reachable within {}s",
                    client.spawn_timeout().as_secs()
                ),
            });
        }
        tokio::time::sleep(VERIFY_POLL_INTERVAL).await;
    }
}
