//! Resolving nodes to agent endpoints

use relaypanel_db::entities::{forward, node};
use relaypanel_db::tunnel_node;
use relaypanel_link::{AgentEndpoint, LinkError};
use sea_orm::ConnectionTrait;

use crate::error::SyncError;

/// Control endpoint of a node's agent
pub fn agent_endpoint(node: &node::Model) -> Result<AgentEndpoint, LinkError> {
    let port = u16::try_from(node.api_port).map_err(|_| {
        LinkError::InvalidEndpoint(format!(
            "node {} has invalid api port {}",
            node.id, node.api_port
        ))
    })?;

    Ok(AgentEndpoint::new(node.id, node.api_host.as_str(), port)
        .with_credentials(&node.api_username, &node.api_password))
}

/// Endpoint of the agent that runs a rule: the entry node of the rule's tunnel
pub async fn rule_endpoint<C: ConnectionTrait>(
    db: &C,
    forward: &forward::Model,
) -> Result<AgentEndpoint, SyncError> {
    let node = tunnel_node(db, forward.tunnel_id)
        .await?
        .ok_or_else(|| SyncError::not_found("tunnel node", forward.tunnel_id))?;

    Ok(agent_endpoint(&node)?)
}
