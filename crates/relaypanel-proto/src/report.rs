//! Usage reports pushed by agents

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::service::Transport;

/// Service name agents use for traffic that belongs to no billable rule
pub const UNATTRIBUTED_SERVICE: &str = "web_api";

/// One traffic sample: bytes up, bytes down, service name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct UsageReport {
    /// Bytes uploaded
    pub u: i64,
    /// Bytes downloaded
    pub d: i64,
    /// Service name, `{forward_id}_{account_id}_{assignment_id}`
    pub n: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceKeyError {
    #[error("service name '{0}' must have exactly three components")]
    ComponentCount(String),

    #[error("service name '{0}' has a non-numeric component")]
    NotNumeric(String),
}

/// The forward / account / assignment triple a report is billed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceKey {
    pub forward_id: i64,
    pub account_id: i64,
    /// `None` when the rule is not bound to a tunnel assignment (encoded as 0)
    pub assignment_id: Option<i64>,
}

impl ServiceKey {
    pub fn new(forward_id: i64, account_id: i64, assignment_id: Option<i64>) -> Self {
        Self {
            forward_id,
            account_id,
            assignment_id,
        }
    }

    /// Base name used for the rule's agent services
    pub fn service_name(&self) -> String {
        format!(
            "{}_{}_{}",
            self.forward_id,
            self.account_id,
            self.assignment_id.unwrap_or(0)
        )
    }

    /// Parse a service name. A trailing `_tcp` / `_udp` is accepted and ignored.
    pub fn parse(name: &str) -> Result<Self, ServiceKeyError> {
        let base = Transport::ALL
            .iter()
            .find_map(|t| name.strip_suffix(&format!("_{}", t.as_str())))
            .unwrap_or(name);

        let parts: Vec<&str> = base.split('_').collect();
        if parts.len() != 3 {
            return Err(ServiceKeyError::ComponentCount(name.to_string()));
        }

        let mut ids = [0i64; 3];
        for (slot, part) in ids.iter_mut().zip(&parts) {
            *slot = part
                .parse::<i64>()
                .ok()
                .filter(|id| *id >= 0)
                .ok_or_else(|| ServiceKeyError::NotNumeric(name.to_string()))?;
        }

        Ok(Self {
            forward_id: ids[0],
            account_id: ids[1],
            assignment_id: (ids[2] != 0).then_some(ids[2]),
        })
    }
}

impl UsageReport {
    pub fn is_unattributed(&self) -> bool {
        self.n == UNATTRIBUTED_SERVICE
    }

    /// Billing key of the report, or `None` for unattributed traffic
    pub fn service_key(&self) -> Result<Option<ServiceKey>, ServiceKeyError> {
        if self.is_unattributed() {
            return Ok(None);
        }
        ServiceKey::parse(&self.n).map(Some)
    }
}
