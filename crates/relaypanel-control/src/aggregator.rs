//! Usage report aggregation

use relaypanel_db::{add_account_flow, add_assignment_flow, add_forward_flow, forward_with_tunnel};
use relaypanel_proto::UsageReport;
use sea_orm::DatabaseConnection;
use tracing::{debug, warn};

use crate::enforcer::{Enforcement, LimitEnforcer};
use crate::error::ReportError;

/// What happened to an accepted report
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOutcome {
    /// Unattributed traffic, dropped
    Ignored,
    /// The rule was deleted after the agent cached it
    UnknownForward { forward_id: i64 },
    Recorded {
        forward_id: i64,
        in_bytes: i64,
        out_bytes: i64,
        enforcement: Enforcement,
    },
}

/// Billing multiplier for a tunnel ratio; non-positive ratios bill 1:1
pub fn effective_ratio(ratio: f64) -> f64 {
    if ratio > 0.0 {
        ratio
    } else {
        1.0
    }
}

fn scale(bytes: i64, multiplier: f64) -> i64 {
    (bytes as f64 * multiplier) as i64
}

#[derive(Clone)]
pub struct TrafficAggregator {
    db: DatabaseConnection,
    enforcer: LimitEnforcer,
}

impl TrafficAggregator {
    pub fn new(db: DatabaseConnection, enforcer: LimitEnforcer) -> Self {
        Self { db, enforcer }
    }

    pub fn enforcer(&self) -> &LimitEnforcer {
        &self.enforcer
    }

    /// Parse and process a raw report body
    pub async fn process_raw(&self, body: &[u8]) -> Result<ReportOutcome, ReportError> {
        let report: UsageReport =
            serde_json::from_slice(body).map_err(|e| ReportError::Malformed(e.to_string()))?;
        self.process(&report).await
    }

    pub async fn process(&self, report: &UsageReport) -> Result<ReportOutcome, ReportError> {
        if report.u < 0 || report.d < 0 {
            return Err(ReportError::Malformed(format!(
                "negative byte count in report for '{}'",
                report.n
            )));
        }

        let Some(key) = report.service_key()? else {
            debug!(service = %report.n, "ignoring unattributed traffic");
            return Ok(ReportOutcome::Ignored);
        };

        let Some((_, tunnel)) = forward_with_tunnel(&self.db, key.forward_id).await? else {
            debug!(forward_id = key.forward_id, "report for unknown forward, discarding");
            return Ok(ReportOutcome::UnknownForward {
                forward_id: key.forward_id,
            });
        };

        let multiplier = effective_ratio(tunnel.traffic_ratio);
        let in_bytes = scale(report.u, multiplier);
        let out_bytes = scale(report.d, multiplier);

        add_forward_flow(&self.db, key.forward_id, in_bytes, out_bytes).await?;
        if !add_account_flow(&self.db, key.account_id, in_bytes, out_bytes).await? {
            debug!(account_id = key.account_id, "report for unknown account");
        }
        if let Some(assignment_id) = key.assignment_id {
            if !add_assignment_flow(&self.db, assignment_id, in_bytes, out_bytes).await? {
                debug!(assignment_id, "report for unknown tunnel assignment");
            }
        }

        debug!(
            forward_id = key.forward_id,
            in_bytes,
            out_bytes,
            multiplier,
            "recorded usage"
        );

        let enforcement = match self.enforcer.enforce(&key).await {
            Ok(enforcement) => enforcement,
            Err(e) => {
                warn!(forward_id = key.forward_id, error = %e, "limit enforcement failed");
                Enforcement::default()
            }
        };

        Ok(ReportOutcome::Recorded {
            forward_id: key.forward_id,
            in_bytes,
            out_bytes,
            enforcement,
        })
    }
}
