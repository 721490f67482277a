//! Node identities and the registry entry of a running node.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};
use zombie_types::{NodeRole, RefField};

use crate::ports::NodePorts;

/// A libp2p ed25519 node key.
///
/// The secret is handed to the node through `--node-key`, which lets the orchestrator know every
/// node's peer id, and thus its bootnode multiaddr, before the node is started.
#[derive(Clone)]
pub struct NodeKey {
    secret: [u8; 32],
    peer_id: String,
}

impl NodeKey {
    pub fn generate() -> Self {
        Self::from_secret(rand::random())
    }

    pub fn from_secret(secret: [u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(&secret);
        let peer_id = peer_id(&signing_key.verifying_key().to_bytes());
        Self { secret, peer_id }
    }

    /// The secret in the hex form `--node-key` expects.
    pub fn secret_hex(&self) -> String {
        hex::encode(self.secret)
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }
}

impl fmt::Debug for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeKey")
            .field("peer_id", &self.peer_id)
            .finish_non_exhaustive()
    }
}

/// Peer id of an ed25519 public key: the protobuf-encoded key inside an identity multihash,
/// base58 encoded.
fn peer_id(public_key: &[u8; 32]) -> String {
    let mut bytes = Vec::with_capacity(38);
    // identity multihash, 36 byte digest
    bytes.extend_from_slice(&[0x00, 0x24]);
    // protobuf PublicKey { Type: Ed25519, Data: <32 bytes> }
    bytes.extend_from_slice(&[0x08, 0x01, 0x12, 0x20]);
    bytes.extend_from_slice(public_key);
    bs58::encode(bytes).into_string()
}

/// A node registered in a [`crate::Network`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkNode {
    /// The unique name of this node (e.g., "alice", "collator-1").
    pub name: String,
    pub role: NodeRole,
    /// The parachain this node collates for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub para_id: Option<u32>,
    pub ports: NodePorts,
    pub bind_address: IpAddr,
    pub peer_id: String,
    /// The node's database directory, as seen by the node.
    pub data_dir: PathBuf,
    /// Where the provider writes this node's output.
    pub log_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

impl NetworkNode {
    /// Get the P2P address for this node (e.g., "/ip4/127.0.0.1/tcp/30333/p2p/12D3KooW...").
    pub fn multiaddr(&self) -> String {
        bootnode_multiaddr(self.bind_address, self.ports.p2p, &self.peer_id)
    }

    /// Get the RPC websocket endpoint (e.g., "ws://127.0.0.1:9944").
    pub fn ws_uri(&self) -> String {
        format!("ws://{}:{}", self.bind_address, self.ports.rpc)
    }

    /// Get the Prometheus endpoint (e.g., "http://127.0.0.1:9615/metrics").
    pub fn prometheus_uri(&self) -> String {
        format!("http://{}:{}/metrics", self.bind_address, self.ports.prometheus)
    }

    pub fn rpc_socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.ports.rpc)
    }

    /// The value a `{{ZOMBIE:<node>:<field>}}` reference to this node resolves to.
    pub fn field(&self, field: RefField) -> String {
        match field {
            RefField::Multiaddr => self.multiaddr(),
            RefField::WsUri => self.ws_uri(),
            RefField::PrometheusUri => self.prometheus_uri(),
            RefField::RpcPort => self.ports.rpc.to_string(),
            RefField::P2pPort => self.ports.p2p.to_string(),
        }
    }
}

pub fn bootnode_multiaddr(address: IpAddr, p2p_port: u16, peer_id: &str) -> String {
    match address {
        IpAddr::V4(ip) => format!("/ip4/{ip}/tcp/{p2p_port}/p2p/{peer_id}"),
        IpAddr::V6(ip) => format!("/ip6/{ip}/tcp/{p2p_port}/p2p/{peer_id}"),
    }
}
