//! Building encoder inputs from stored rules

use relaypanel_db::entities::forward::{self, ForwardType};
use relaypanel_db::entities::tunnel;
use relaypanel_proto::{ChainSpec, ForwardKind, ServiceSpec};

use crate::error::SyncError;

const DEFAULT_CHAIN_PROTOCOL: &str = "tls";

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.trim().is_empty()).cloned()
}

/// Services description of a rule. `limiter` is the agent-side limiter name, if any.
pub fn service_spec(
    forward: &forward::Model,
    tunnel: &tunnel::Model,
    limiter: Option<String>,
) -> Result<ServiceSpec, SyncError> {
    let port = u16::try_from(forward.in_port)
        .ok()
        .filter(|port| *port != 0)
        .ok_or_else(|| {
            SyncError::Invalid(format!(
                "forward {} has invalid port {}",
                forward.id, forward.in_port
            ))
        })?;

    Ok(ServiceSpec {
        name: forward.service_name(),
        port,
        tcp_listen_addr: tunnel.tcp_listen_addr.clone(),
        udp_listen_addr: tunnel.udp_listen_addr.clone(),
        remote_addr: forward.remote_addr.clone(),
        kind: match forward.forward_type {
            ForwardType::Direct => ForwardKind::Direct,
            ForwardType::Chain => ForwardKind::Chain,
        },
        strategy: non_empty(&forward.strategy),
        limiter,
        interface_name: non_empty(&forward.interface_name),
    })
}

/// Chain description of a chain-forwarded rule; `None` for direct rules
pub fn chain_spec(
    forward: &forward::Model,
    tunnel: &tunnel::Model,
) -> Result<Option<ChainSpec>, SyncError> {
    if forward.forward_type != ForwardType::Chain {
        return Ok(None);
    }

    let remote_addr = non_empty(&tunnel.chain_addr).ok_or_else(|| {
        SyncError::Invalid(format!(
            "tunnel {} has no chain address for chain forward {}",
            tunnel.id, forward.id
        ))
    })?;

    let protocol = if tunnel.protocol.trim().is_empty() {
        DEFAULT_CHAIN_PROTOCOL.to_string()
    } else {
        tunnel.protocol.clone()
    };

    Ok(Some(ChainSpec {
        name: forward.service_name(),
        remote_addr,
        protocol,
        interface_name: non_empty(&forward.interface_name).or_else(|| non_empty(&tunnel.interface_name)),
    }))
}
