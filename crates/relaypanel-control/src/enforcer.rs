//! Limit enforcement
//!
//! After every counter update the owning account, and the tunnel assignment
//! when the rule has one, are checked against their allowance. When either
//! is exhausted, expired or suspended, every rule it covers is withdrawn
//! from its agent and marked paused. The paused status is written even when
//! the agent could not be reached; the store wins over agent state.

use futures_util::future::join_all;
use relaypanel_db::entities::forward::{self, ForwardStatus};
use relaypanel_db::entities::user::STATUS_ACTIVE;
use relaypanel_db::entities::{user, user_tunnel};
use relaypanel_db::{forwards_for_account, forwards_for_assignment, set_forward_status};
use relaypanel_link::AgentDispatcher;
use relaypanel_proto::{AgentCommand, ServiceDeletion, ServiceKey};
use sea_orm::{DatabaseConnection, DbErr, EntityTrait};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::nodes::rule_endpoint;

/// Source of the current unix time in seconds
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(|| chrono::Utc::now().timestamp())
}

/// Why an allowance stopped covering its rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseReason {
    BudgetExhausted,
    Expired,
    Suspended,
}

impl fmt::Display for PauseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            PauseReason::BudgetExhausted => "traffic budget exhausted",
            PauseReason::Expired => "expired",
            PauseReason::Suspended => "suspended",
        };
        f.write_str(reason)
    }
}

/// The limit fields accounts and tunnel assignments have in common
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allowance {
    pub in_flow: i64,
    pub out_flow: i64,
    /// Budget in bytes, 0 = unlimited
    pub flow: i64,
    /// Unix seconds, 0 = never
    pub exp_time: i64,
    pub status: i32,
}

impl Allowance {
    /// First failing condition, checked in order: budget, expiry, status
    pub fn pause_reason(&self, now: i64) -> Option<PauseReason> {
        if self.flow > 0 && self.in_flow.saturating_add(self.out_flow) >= self.flow {
            return Some(PauseReason::BudgetExhausted);
        }
        if self.exp_time > 0 && self.exp_time <= now {
            return Some(PauseReason::Expired);
        }
        if self.status != STATUS_ACTIVE {
            return Some(PauseReason::Suspended);
        }
        None
    }
}

impl From<&user::Model> for Allowance {
    fn from(account: &user::Model) -> Self {
        Self {
            in_flow: account.in_flow,
            out_flow: account.out_flow,
            flow: account.flow,
            exp_time: account.exp_time,
            status: account.status,
        }
    }
}

impl From<&user_tunnel::Model> for Allowance {
    fn from(assignment: &user_tunnel::Model) -> Self {
        Self {
            in_flow: assignment.in_flow,
            out_flow: assignment.out_flow,
            flow: assignment.flow,
            exp_time: assignment.exp_time,
            status: assignment.status,
        }
    }
}

/// What one enforcement pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enforcement {
    pub account: Option<PauseReason>,
    pub assignment: Option<PauseReason>,
    /// Rules marked paused, in cascade order
    pub paused: Vec<i64>,
    /// Rules whose agent-side delete failed
    pub agent_failures: usize,
}

impl Enforcement {
    pub fn triggered(&self) -> bool {
        self.account.is_some() || self.assignment.is_some()
    }
}

#[derive(Clone)]
pub struct LimitEnforcer {
    db: DatabaseConnection,
    dispatcher: Arc<dyn AgentDispatcher>,
    clock: Clock,
}

impl LimitEnforcer {
    pub fn new(db: DatabaseConnection, dispatcher: Arc<dyn AgentDispatcher>) -> Self {
        Self {
            db,
            dispatcher,
            clock: system_clock(),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn now(&self) -> i64 {
        (self.clock)()
    }

    /// Check the account and tunnel assignment a report was billed to.
    ///
    /// Only lookups can fail; agent and status-write failures are logged and
    /// the cascade moves on to the next rule.
    pub async fn enforce(&self, key: &ServiceKey) -> Result<Enforcement, DbErr> {
        let now = self.now();
        let mut outcome = Enforcement::default();

        if let Some(account) = user::Entity::find_by_id(key.account_id).one(&self.db).await? {
            if let Some(reason) = Allowance::from(&account).pause_reason(now) {
                info!(
                    account_id = account.id,
                    %reason,
                    "account over limit, pausing its forwards"
                );
                outcome.account = Some(reason);
                let forwards = forwards_for_account(&self.db, account.id).await?;
                self.pause_all(&forwards, &mut outcome).await;
            }
        }

        if let Some(assignment_id) = key.assignment_id {
            if let Some(assignment) = user_tunnel::Entity::find_by_id(assignment_id)
                .one(&self.db)
                .await?
            {
                if let Some(reason) = Allowance::from(&assignment).pause_reason(now) {
                    info!(
                        assignment_id,
                        account_id = assignment.user_id,
                        tunnel_id = assignment.tunnel_id,
                        %reason,
                        "tunnel assignment over limit, pausing its forwards"
                    );
                    outcome.assignment = Some(reason);
                    let forwards = forwards_for_assignment(&self.db, &assignment).await?;
                    self.pause_all(&forwards, &mut outcome).await;
                }
            }
        }

        Ok(outcome)
    }

    /// Withdraw and pause every rule not already handled in this pass
    async fn pause_all(&self, forwards: &[forward::Model], outcome: &mut Enforcement) {
        let todo: Vec<&forward::Model> = forwards
            .iter()
            .filter(|forward| !outcome.paused.contains(&forward.id))
            .collect();

        let deliveries = join_all(todo.iter().map(|forward| self.withdraw(forward))).await;

        for (forward, delivered) in todo.into_iter().zip(deliveries) {
            if !delivered {
                outcome.agent_failures += 1;
            }
            if let Err(e) = set_forward_status(&self.db, forward.id, ForwardStatus::Paused).await {
                warn!(forward_id = forward.id, error = %e, "failed to mark forward paused");
                continue;
            }
            outcome.paused.push(forward.id);
        }
    }

    /// Delete a rule's services on its own agent. Returns whether the agent acknowledged.
    async fn withdraw(&self, forward: &forward::Model) -> bool {
        let service = forward.service_name();

        let endpoint = match rule_endpoint(&self.db, forward).await {
            Ok(endpoint) => endpoint,
            Err(e) => {
                warn!(forward_id = forward.id, error = %e, "cannot resolve agent for forward");
                return false;
            }
        };

        let command = AgentCommand::DeleteService(ServiceDeletion::for_rule(&service));
        match self.dispatcher.dispatch(&endpoint, command).await {
            Ok(_) => {
                debug!(forward_id = forward.id, node_id = endpoint.node_id, %service, "withdrew services");
                true
            }
            Err(e) => {
                warn!(
                    forward_id = forward.id,
                    node_id = endpoint.node_id,
                    %service,
                    error = %e,
                    "failed to withdraw services, marking paused anyway"
                );
                false
            }
        }
    }
}
