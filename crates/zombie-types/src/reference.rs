//! Node-to-node network references.
//!
//! A node's arguments may embed `{{ZOMBIE:<node>:<field>}}`, which is replaced at spawn time by
//! the referenced node's resolved value (e.g. its multiaddr). A reference can only be resolved
//! once the referenced node is running.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

static TOKEN_PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\{\{ZOMBIE:([^:}]+):([^}]+)\}\}").expect("token regex is valid")
});

/// A field of a running node that can be referenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefField {
    Multiaddr,
    WsUri,
    PrometheusUri,
    RpcPort,
    P2pPort,
}

impl FromStr for RefField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "multiaddr" | "multiAddress" => Ok(Self::Multiaddr),
            "ws_uri" | "wsUri" => Ok(Self::WsUri),
            "prometheus_uri" | "prometheusUri" => Ok(Self::PrometheusUri),
            "rpc_port" | "rpcPort" => Ok(Self::RpcPort),
            "p2p_port" | "p2pPort" => Ok(Self::P2pPort),
            other => Err(other.to_string()),
        }
    }
}

/// A parsed `{{ZOMBIE:<node>:<field>}}` token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkReference {
    pub node: String,
    /// The field as written, kept for error messages.
    pub raw_field: String,
    /// `None` when the field name is not recognized.
    pub field: Option<RefField>,
}

impl fmt::Display for NetworkReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{{ZOMBIE:{}:{}}}}}", self.node, self.raw_field)
    }
}

impl NetworkReference {
    fn from_captures(caps: &Captures<'_>) -> Self {
        let node = caps[1].trim().to_string();
        let raw_field = caps[2].trim().to_string();
        let field = raw_field.parse().ok();
        Self {
            node,
            raw_field,
            field,
        }
    }
}

/// Whether `text` contains at least one network reference.
pub fn contains_reference(text: &str) -> bool {
    TOKEN_PLACEHOLDER.is_match(text)
}

/// All network references in `text`, in order of appearance.
pub fn find_references(text: &str) -> Vec<NetworkReference> {
    TOKEN_PLACEHOLDER
        .captures_iter(text)
        .map(|caps| NetworkReference::from_captures(&caps))
        .collect()
}

/// Replace every network reference in `text` using `resolve`.
///
/// Returns the first reference that `resolve` could not satisfy.
pub fn replace_references<F>(text: &str, mut resolve: F) -> Result<String, NetworkReference>
where
    F: FnMut(&str, RefField) -> Option<String>,
{
    let mut unresolved = None;
    let replaced = TOKEN_PLACEHOLDER.replace_all(text, |caps: &Captures<'_>| {
        let reference = NetworkReference::from_captures(caps);
        match reference
            .field
            .and_then(|field| resolve(&reference.node, field))
        {
            Some(value) => value,
            None => {
                unresolved.get_or_insert(reference);
                String::new()
            }
        }
    });

    match unresolved {
        Some(reference) => Err(reference),
        None => Ok(replaced.into_owned()),
    }
}
