//! Persistent control-channel client for relay agents
//!
//! One [`AgentLink`] owns the WebSocket connection to one agent. Calls are
//! multiplexed over it: every request carries a fresh id, a single inbound
//! pump task matches replies to waiting callers through [`PendingCalls`],
//! and the same task redials the agent whenever the connection drops.
//!
//! [`LinkRegistry`] hands out one shared link per [`AgentEndpoint`] and is the
//! production [`AgentDispatcher`].

pub mod config;
pub mod endpoint;
pub mod error;
pub mod link;
pub mod pending;
pub mod registry;

pub use config::LinkConfig;
pub use endpoint::AgentEndpoint;
pub use error::{LinkError, LinkResult};
pub use link::AgentLink;
pub use pending::{CallOutcome, PendingCall, PendingCalls};
pub use registry::{AgentDispatcher, LinkRegistry};
