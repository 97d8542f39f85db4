//! Control plane for relay agents
//!
//! Turns usage reports into counter updates, pauses forward rules whose
//! account or tunnel assignment ran out of allowance, and pushes rule,
//! chain and limiter changes to agents. Everything that talks to an agent
//! goes through [`relaypanel_link::AgentDispatcher`].
pub mod aggregator;
pub mod enforcer;
pub mod error;
pub mod nodes;
pub mod rule;
pub mod sync;

pub use aggregator::{effective_ratio, ReportOutcome, TrafficAggregator};
pub use enforcer::{system_clock, Allowance, Clock, Enforcement, LimitEnforcer, PauseReason};
pub use error::{ReportError, SyncError};
pub use nodes::{agent_endpoint, rule_endpoint};
pub use rule::{chain_spec, service_spec};
pub use sync::{AgentSync, Broadcast, LimiterOp};
