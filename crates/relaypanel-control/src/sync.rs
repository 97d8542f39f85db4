//! Pushing stored configuration to agents
//!
//! Called by whatever owns the CRUD surface after it has changed the store.

use relaypanel_db::entities::forward::{self, ForwardStatus};
use relaypanel_db::entities::{node, speed_limit, tunnel};
use relaypanel_db::{
    active_nodes, forward_with_tunnel, reset_account_flow, reset_assignment_flow,
    reset_forward_flow, set_forward_status,
};
use relaypanel_link::{AgentDispatcher, AgentEndpoint};
use relaypanel_proto::{
    encode_chain, encode_chain_update, encode_limiter, encode_limiter_update, encode_services,
    AgentCommand, ChainRef, LimiterRef, ServiceDeletion,
};
use sea_orm::{DatabaseConnection, EntityTrait};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::SyncError;
use crate::nodes::{agent_endpoint, rule_endpoint};
use crate::rule::{chain_spec, service_spec};

/// Limiter change to broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimiterOp {
    Add,
    Update,
    Delete,
}

/// Result of sending one command to every active node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Broadcast {
    pub delivered: usize,
    pub failed: usize,
}

/// A stored rule with what is needed to talk to its agent
struct DeployedRule {
    forward: forward::Model,
    tunnel: tunnel::Model,
    endpoint: AgentEndpoint,
}

#[derive(Clone)]
pub struct AgentSync {
    db: DatabaseConnection,
    dispatcher: Arc<dyn AgentDispatcher>,
}

impl AgentSync {
    pub fn new(db: DatabaseConnection, dispatcher: Arc<dyn AgentDispatcher>) -> Self {
        Self { db, dispatcher }
    }

    async fn load_rule(&self, forward_id: i64) -> Result<DeployedRule, SyncError> {
        let (forward, tunnel) = forward_with_tunnel(&self.db, forward_id)
            .await?
            .ok_or_else(|| SyncError::not_found("forward", forward_id))?;
        let endpoint = rule_endpoint(&self.db, &forward).await?;

        Ok(DeployedRule {
            forward,
            tunnel,
            endpoint,
        })
    }

    /// Limiter name for a rule, skipping references to deleted speed limits
    async fn limiter_for(&self, forward: &forward::Model) -> Result<Option<String>, SyncError> {
        let Some(limit_id) = forward.speed_limit_id else {
            return Ok(None);
        };

        match speed_limit::Entity::find_by_id(limit_id).one(&self.db).await? {
            Some(limit) => Ok(Some(limit.limiter_name())),
            None => {
                warn!(forward_id = forward.id, speed_limit_id = limit_id, "speed limit not found, deploying unlimited");
                Ok(None)
            }
        }
    }

    async fn send(&self, endpoint: &AgentEndpoint, command: AgentCommand) -> Result<Value, SyncError> {
        Ok(self.dispatcher.dispatch(endpoint, command).await?)
    }

    async fn service_command(
        &self,
        rule: &DeployedRule,
        update: bool,
    ) -> Result<AgentCommand, SyncError> {
        let limiter = self.limiter_for(&rule.forward).await?;
        let services = encode_services(&service_spec(&rule.forward, &rule.tunnel, limiter)?)?;

        Ok(if update {
            AgentCommand::UpdateService(services)
        } else {
            AgentCommand::AddService(services)
        })
    }

    /// Install a newly stored rule. On error the caller should roll its insert back.
    pub async fn deploy_forward(&self, forward_id: i64) -> Result<(), SyncError> {
        let rule = self.load_rule(forward_id).await?;

        if let Some(chain) = chain_spec(&rule.forward, &rule.tunnel)? {
            self.send(&rule.endpoint, AgentCommand::AddChains(encode_chain(&chain)))
                .await?;
        }
        let command = self.service_command(&rule, false).await?;
        self.send(&rule.endpoint, command).await?;

        info!(forward_id, node_id = rule.endpoint.node_id, "deployed forward");
        Ok(())
    }

    /// Push an edited rule. The store keeps the edit even if the agent rejects it.
    pub async fn redeploy_forward(&self, forward_id: i64) -> Result<(), SyncError> {
        let rule = self.load_rule(forward_id).await?;

        let result = async {
            if let Some(chain) = chain_spec(&rule.forward, &rule.tunnel)? {
                self.send(&rule.endpoint, AgentCommand::UpdateChains(encode_chain_update(&chain)))
                    .await?;
            }
            let command = self.service_command(&rule, true).await?;
            self.send(&rule.endpoint, command).await
        }
        .await;

        match result {
            Ok(_) => {
                info!(forward_id, node_id = rule.endpoint.node_id, "updated forward");
                Ok(())
            }
            Err(e) => {
                warn!(forward_id, node_id = rule.endpoint.node_id, error = %e, "failed to update forward on agent");
                Err(e)
            }
        }
    }

    /// Remove a rule from its agent before the caller deletes it.
    ///
    /// Agent failures are logged and never block the delete. Returns whether
    /// every command was acknowledged.
    pub async fn withdraw_forward(&self, forward_id: i64) -> Result<bool, SyncError> {
        let rule = self.load_rule(forward_id).await?;
        let base = rule.forward.service_name();
        let mut clean = true;

        let deletion = AgentCommand::DeleteService(ServiceDeletion::for_rule(&base));
        if let Err(e) = self.send(&rule.endpoint, deletion).await {
            warn!(forward_id, node_id = rule.endpoint.node_id, error = %e, "failed to delete services");
            clean = false;
        }

        if rule.forward.forward_type == forward::ForwardType::Chain {
            let chain = AgentCommand::DeleteChains(ChainRef::for_rule(&base));
            if let Err(e) = self.send(&rule.endpoint, chain).await {
                warn!(forward_id, node_id = rule.endpoint.node_id, error = %e, "failed to delete chain");
                clean = false;
            }
        }

        Ok(clean)
    }

    /// Stop a rule's services and mark it paused. Returns whether the agent acknowledged.
    pub async fn pause_forward(&self, forward_id: i64) -> Result<bool, SyncError> {
        let rule = self.load_rule(forward_id).await?;
        let deletion = AgentCommand::DeleteService(ServiceDeletion::for_rule(&rule.forward.service_name()));

        let delivered = match self.send(&rule.endpoint, deletion).await {
            Ok(_) => true,
            Err(e) => {
                warn!(forward_id, node_id = rule.endpoint.node_id, error = %e, "failed to stop services");
                false
            }
        };

        set_forward_status(&self.db, forward_id, ForwardStatus::Paused).await?;
        info!(forward_id, delivered, "paused forward");
        Ok(delivered)
    }

    /// Re-install a paused rule's services and mark it running
    pub async fn resume_forward(&self, forward_id: i64) -> Result<(), SyncError> {
        let rule = self.load_rule(forward_id).await?;

        let command = self.service_command(&rule, false).await?;
        self.send(&rule.endpoint, command).await?;

        set_forward_status(&self.db, forward_id, ForwardStatus::Running).await?;
        info!(forward_id, "resumed forward");
        Ok(())
    }

    /// Mirror a speed limit change onto every active node
    pub async fn sync_limiter(
        &self,
        op: LimiterOp,
        limit: &speed_limit::Model,
    ) -> Result<Broadcast, SyncError> {
        let name = limit.limiter_name();
        let speed = u32::try_from(limit.speed).map_err(|_| {
            SyncError::Invalid(format!("speed limit {} has negative speed {}", limit.id, limit.speed))
        })?;

        let command = match op {
            LimiterOp::Add => AgentCommand::AddLimiters(encode_limiter(&name, speed)),
            LimiterOp::Update => AgentCommand::UpdateLimiters(encode_limiter_update(&name, speed)),
            LimiterOp::Delete => AgentCommand::DeleteLimiters(LimiterRef { limiter: name.clone() }),
        };

        let mut outcome = Broadcast::default();
        for node in active_nodes(&self.db).await? {
            match self.send_to_node(&node, command.clone()).await {
                Ok(_) => outcome.delivered += 1,
                Err(e) => {
                    warn!(node_id = node.id, node = %node.name, limiter = %name, ?op, error = %e, "failed to sync limiter");
                    outcome.failed += 1;
                }
            }
        }

        info!(limiter = %name, ?op, delivered = outcome.delivered, failed = outcome.failed, "synced limiter");
        Ok(outcome)
    }

    async fn send_to_node(&self, node: &node::Model, command: AgentCommand) -> Result<Value, SyncError> {
        let endpoint = agent_endpoint(node)?;
        self.send(&endpoint, command).await
    }

    pub async fn reset_account_traffic(&self, account_id: i64) -> Result<(), SyncError> {
        if !reset_account_flow(&self.db, account_id).await? {
            return Err(SyncError::not_found("account", account_id));
        }
        info!(account_id, "reset account traffic");
        Ok(())
    }

    pub async fn reset_assignment_traffic(&self, assignment_id: i64) -> Result<(), SyncError> {
        if !reset_assignment_flow(&self.db, assignment_id).await? {
            return Err(SyncError::not_found("tunnel assignment", assignment_id));
        }
        info!(assignment_id, "reset tunnel assignment traffic");
        Ok(())
    }

    pub async fn reset_forward_traffic(&self, forward_id: i64) -> Result<(), SyncError> {
        if !reset_forward_flow(&self.db, forward_id).await? {
            return Err(SyncError::not_found("forward", forward_id));
        }
        info!(forward_id, "reset forward traffic");
        Ok(())
    }

    /// Make sure the node's agent link is up
    pub async fn probe_node(&self, node_id: i64) -> Result<(), SyncError> {
        let node = node::Entity::find_by_id(node_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| SyncError::not_found("node", node_id))?;

        self.dispatcher.probe(&agent_endpoint(&node)?).await?;
        Ok(())
    }
}
