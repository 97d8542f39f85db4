//! Wire protocol for relay agents
//!
//! Everything that crosses the agent control channel or the usage-report
//! endpoint is defined here as typed structures:
//!
//! - [`AgentRequest`] / [`AgentCommand`]: the `{"id","method","params"}` envelope
//! - [`service`], [`chain`], [`limiter`]: command payloads and their encoders
//! - [`UsageReport`] / [`ServiceKey`]: inbound traffic samples
//!
//! Encoders are pure functions from plain descriptions of a forward rule,
//! tunnel or speed limit to payloads. They never perform I/O.

pub mod chain;
pub mod limiter;
pub mod report;
pub mod service;
pub mod wire;

pub use chain::{
    chain_name, encode_chain, encode_chain_update, ChainConfig, ChainRef, ChainSpec, ChainUpdate,
};
pub use limiter::{
    encode_limiter, encode_limiter_update, limit_expression, LimiterConfig, LimiterRef,
    LimiterUpdate,
};
pub use report::{ServiceKey, ServiceKeyError, UsageReport, UNATTRIBUTED_SERVICE};
pub use service::{
    encode_services, EncodeError, ForwardKind, ServiceConfig, ServiceDeletion, ServiceSpec,
    Transport, DEFAULT_STRATEGY,
};
pub use wire::{reply_id, AgentCommand, AgentRequest};
