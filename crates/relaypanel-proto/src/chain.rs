//! Relay chain payloads

use serde::{Deserialize, Serialize};

use crate::service::KeepAlive;

const QUIC_KEEP_ALIVE_TTL: &str = "10s";

/// Agent-side chain name for a rule base name
pub fn chain_name(base: &str) -> String {
    format!("{}_chains", base)
}

/// Description of the single-hop chain behind a chain-forwarded rule
#[derive(Debug, Clone, PartialEq)]
pub struct ChainSpec {
    pub name: String,
    /// Address of the next relay
    pub remote_addr: String,
    /// Dialer transport, e.g. `tls`, `ws`, `quic`
    pub protocol: String,
    pub interface_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainConfig {
    pub name: String,
    pub hops: Vec<HopConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HopConfig {
    pub name: String,
    pub nodes: Vec<ChainNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainNode {
    pub name: String,
    pub addr: String,
    pub connector: ConnectorConfig,
    pub dialer: DialerConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorConfig {
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialerConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<KeepAlive>,
}

/// Payload of `UpdateChains`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainUpdate {
    pub chain: String,
    pub data: ChainConfig,
}

/// Payload of `DeleteChains`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainRef {
    pub chain: String,
}

impl ChainRef {
    pub fn for_rule(base: &str) -> Self {
        Self {
            chain: chain_name(base),
        }
    }
}

pub fn encode_chain(spec: &ChainSpec) -> ChainConfig {
    let metadata = (spec.protocol == "quic").then(|| KeepAlive {
        keep_alive: true,
        ttl: Some(QUIC_KEEP_ALIVE_TTL.to_string()),
    });

    let node = ChainNode {
        name: format!("node-{}", spec.name),
        addr: spec.remote_addr.clone(),
        connector: ConnectorConfig {
            kind: "relay".to_string(),
        },
        dialer: DialerConfig {
            kind: spec.protocol.clone(),
            metadata,
        },
        interface: spec.interface_name.clone().filter(|name| !name.is_empty()),
    };

    ChainConfig {
        name: chain_name(&spec.name),
        hops: vec![HopConfig {
            name: format!("hop-{}", spec.name),
            nodes: vec![node],
        }],
    }
}

pub fn encode_chain_update(spec: &ChainSpec) -> ChainUpdate {
    ChainUpdate {
        chain: chain_name(&spec.name),
        data: encode_chain(spec),
    }
}
