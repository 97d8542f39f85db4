//! Service payloads: one forward rule becomes a TCP and a UDP service

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chain::chain_name;

/// Selection strategy used when a rule does not name one
pub const DEFAULT_STRATEGY: &str = "fifo";

const SELECTOR_MAX_FAILS: u32 = 1;
const SELECTOR_FAIL_TIMEOUT: &str = "600s";

/// Errors produced while encoding agent payloads
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("forward rule {0} has no remote targets")]
    NoRemoteTargets(String),
}

/// Transport class of a service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Tcp,
    Udp,
}

impl Transport {
    pub const ALL: [Transport; 2] = [Transport::Tcp, Transport::Udp];

    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Tcp => "tcp",
            Transport::Udp => "udp",
        }
    }

    /// Agent-side service name for a rule base name
    pub fn service_name(&self, base: &str) -> String {
        format!("{}_{}", base, self.as_str())
    }
}

/// How a forward rule reaches its destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForwardKind {
    /// Straight to the remote targets through a load-balancing forwarder
    Direct,
    /// Through the named relay chain of the rule
    Chain,
}

/// Everything needed to encode the services of one forward rule
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceSpec {
    /// Base name; the agent sees `{name}_tcp` and `{name}_udp`
    pub name: String,
    pub port: u16,
    pub tcp_listen_addr: String,
    pub udp_listen_addr: String,
    /// Comma-separated `host:port` targets
    pub remote_addr: String,
    pub kind: ForwardKind,
    pub strategy: Option<String>,
    pub limiter: Option<String>,
    pub interface_name: Option<String>,
}

impl ServiceSpec {
    fn listen_addr(&self, transport: Transport) -> String {
        let host = match transport {
            Transport::Tcp => &self.tcp_listen_addr,
            Transport::Udp => &self.udp_listen_addr,
        };
        format!("{}:{}", host, self.port)
    }

    fn remote_targets(&self) -> Vec<&str> {
        self.remote_addr
            .split(',')
            .map(str::trim)
            .filter(|addr| !addr.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub addr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limiter: Option<String>,
    pub handler: HandlerConfig,
    pub listener: ListenerConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forwarder: Option<ForwarderConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ServiceMetadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerConfig {
    #[serde(rename = "type")]
    pub kind: Transport,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListenerConfig {
    #[serde(rename = "type")]
    pub kind: Transport,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<KeepAlive>,
}

/// Keep-alive metadata shared by UDP listeners and QUIC dialers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeepAlive {
    #[serde(rename = "keepAlive")]
    pub keep_alive: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwarderConfig {
    pub nodes: Vec<ForwardNode>,
    pub selector: SelectorConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardNode {
    pub name: String,
    pub addr: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectorConfig {
    pub strategy: String,
    #[serde(rename = "maxFails")]
    pub max_fails: u32,
    #[serde(rename = "failTimeout")]
    pub fail_timeout: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceMetadata {
    pub interface: String,
}

/// Payload of `DeleteService`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDeletion {
    pub services: Vec<String>,
}

impl ServiceDeletion {
    /// Both transport services of a rule
    pub fn for_rule(base: &str) -> Self {
        Self {
            services: Transport::ALL
                .iter()
                .map(|transport| transport.service_name(base))
                .collect(),
        }
    }
}

/// Encode the TCP and UDP services of a forward rule, in that order.
pub fn encode_services(spec: &ServiceSpec) -> Result<Vec<ServiceConfig>, EncodeError> {
    let forwarder = match spec.kind {
        ForwardKind::Direct => Some(encode_forwarder(spec)?),
        ForwardKind::Chain => None,
    };

    Ok(Transport::ALL
        .iter()
        .map(|&transport| ServiceConfig {
            name: transport.service_name(&spec.name),
            addr: spec.listen_addr(transport),
            limiter: spec.limiter.clone(),
            handler: HandlerConfig {
                kind: transport,
                chain: match spec.kind {
                    ForwardKind::Chain => Some(chain_name(&spec.name)),
                    ForwardKind::Direct => None,
                },
            },
            listener: ListenerConfig {
                kind: transport,
                metadata: (transport == Transport::Udp).then_some(KeepAlive {
                    keep_alive: true,
                    ttl: None,
                }),
            },
            forwarder: forwarder.clone(),
            metadata: spec
                .interface_name
                .as_ref()
                .filter(|name| !name.is_empty())
                .map(|name| ServiceMetadata {
                    interface: name.clone(),
                }),
        })
        .collect())
}

fn encode_forwarder(spec: &ServiceSpec) -> Result<ForwarderConfig, EncodeError> {
    let targets = spec.remote_targets();
    if targets.is_empty() {
        return Err(EncodeError::NoRemoteTargets(spec.name.clone()));
    }

    let strategy = spec
        .strategy
        .as_deref()
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_STRATEGY);

    Ok(ForwarderConfig {
        nodes: targets
            .into_iter()
            .enumerate()
            .map(|(i, addr)| ForwardNode {
                name: format!("node_{}", i + 1),
                addr: addr.to_string(),
            })
            .collect(),
        selector: SelectorConfig {
            strategy: strategy.to_string(),
            max_fails: SELECTOR_MAX_FAILS,
            fail_timeout: SELECTOR_FAIL_TIMEOUT.to_string(),
        },
    })
}
