//! Agent control channel envelope

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chain::{ChainConfig, ChainRef, ChainUpdate};
use crate::limiter::{LimiterConfig, LimiterRef, LimiterUpdate};
use crate::service::{ServiceConfig, ServiceDeletion};

/// Commands understood by a relay agent.
///
/// Serialized adjacently tagged so that flattening it into [`AgentRequest`]
/// yields `{"method": "...", "params": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "method", content = "params")]
pub enum AgentCommand {
    AddService(Vec<ServiceConfig>),
    UpdateService(Vec<ServiceConfig>),
    DeleteService(ServiceDeletion),
    AddChains(ChainConfig),
    UpdateChains(ChainUpdate),
    DeleteChains(ChainRef),
    AddLimiters(LimiterConfig),
    UpdateLimiters(LimiterUpdate),
    DeleteLimiters(LimiterRef),
}

impl AgentCommand {
    /// Method name as it appears on the wire
    pub fn method(&self) -> &'static str {
        match self {
            AgentCommand::AddService(_) => "AddService",
            AgentCommand::UpdateService(_) => "UpdateService",
            AgentCommand::DeleteService(_) => "DeleteService",
            AgentCommand::AddChains(_) => "AddChains",
            AgentCommand::UpdateChains(_) => "UpdateChains",
            AgentCommand::DeleteChains(_) => "DeleteChains",
            AgentCommand::AddLimiters(_) => "AddLimiters",
            AgentCommand::UpdateLimiters(_) => "UpdateLimiters",
            AgentCommand::DeleteLimiters(_) => "DeleteLimiters",
        }
    }
}

/// One request sent to an agent. The agent echoes `id` in its reply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentRequest {
    pub id: String,
    #[serde(flatten)]
    pub command: AgentCommand,
}

impl AgentRequest {
    pub fn new(id: impl Into<String>, command: AgentCommand) -> Self {
        Self {
            id: id.into(),
            command,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Extract the correlation id from an inbound agent message.
///
/// Returns `None` for non-objects and objects without a string `id`.
pub fn reply_id(message: &Value) -> Option<&str> {
    message.get("id").and_then(Value::as_str)
}
