//! Port allocation for locally bound nodes.

use std::net::TcpListener;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Default base ports for node services.
pub const DEFAULT_P2P_PORT: u16 = 30333;
pub const DEFAULT_RPC_PORT: u16 = 9944;
pub const DEFAULT_PROMETHEUS_PORT: u16 = 9615;

/// Default offset between nodes for port allocation.
pub const DEFAULT_PORT_OFFSET: u16 = 100;

/// Port allocation strategy for assigning ports to nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortAllocationStrategy {
    pub p2p_base: u16,
    pub rpc_base: u16,
    pub prometheus_base: u16,
    /// Offset between consecutive nodes.
    pub node_offset: u16,
}

impl Default for PortAllocationStrategy {
    fn default() -> Self {
        Self {
            p2p_base: DEFAULT_P2P_PORT,
            rpc_base: DEFAULT_RPC_PORT,
            prometheus_base: DEFAULT_PROMETHEUS_PORT,
            node_offset: DEFAULT_PORT_OFFSET,
        }
    }
}

impl PortAllocationStrategy {
    /// Allocate ports for the node at the given spawn index.
    ///
    /// Fails once the index pushes any port past `u16::MAX`. The p2p port always leaves room for
    /// a collator's embedded relay node right above it.
    pub fn allocate(&self, node_index: usize) -> Result<NodePorts> {
        let port = |base: u16| {
            u16::try_from(node_index)
                .ok()
                .and_then(|index| index.checked_mul(self.node_offset))
                .and_then(|offset| base.checked_add(offset))
        };

        match (
            port(self.p2p_base),
            port(self.rpc_base),
            port(self.prometheus_base),
        ) {
            (Some(p2p), Some(rpc), Some(prometheus)) if p2p < u16::MAX => Ok(NodePorts {
                p2p,
                rpc,
                prometheus,
            }),
            _ => Err(Error::PortRange { node_index }),
        }
    }
}

/// All ports allocated to a single node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePorts {
    /// libp2p listen port (default 30333).
    pub p2p: u16,
    /// JSON-RPC / websocket port (default 9944).
    pub rpc: u16,
    /// Prometheus exporter port (default 9615).
    pub prometheus: u16,
}

impl NodePorts {
    /// Listen port of the relay chain node embedded in a collator.
    pub fn embedded_relay_p2p(&self) -> u16 {
        self.p2p.saturating_add(1)
    }
}

/// Check that all specified ports are available on localhost.
///
/// This binds each port and immediately releases it, so there is a window in which another
/// process can take a port, but most conflicts are caught before any node is started.
pub fn check_ports_available(ports: &[(u16, String)]) -> Result<()> {
    let mut unavailable = Vec::new();

    for (port, description) in ports {
        if let Err(e) = TcpListener::bind(("127.0.0.1", *port)) {
            unavailable.push(format!("  {} (port {}): {}", description, port, e));
        }
    }

    if !unavailable.is_empty() {
        return Err(Error::PortUnavailable(unavailable.join("\n")));
    }

    Ok(())
}
