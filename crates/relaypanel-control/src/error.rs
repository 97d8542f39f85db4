//! Error types for report processing and agent sync

use relaypanel_link::LinkError;
use relaypanel_proto::{EncodeError, ServiceKeyError};
use sea_orm::DbErr;
use thiserror::Error;

/// Why a usage report was rejected
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("malformed usage report: {0}")]
    Malformed(String),

    #[error("invalid service name: {0}")]
    InvalidServiceName(#[from] ServiceKeyError),

    #[error("database error: {0}")]
    Database(#[from] DbErr),
}

impl ReportError {
    /// Whether the reporting agent sent something it should not have
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ReportError::Malformed(_) | ReportError::InvalidServiceName(_)
        )
    }
}

/// Failure to bring an agent in line with the store
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("database error: {0}")]
    Database(#[from] DbErr),

    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    #[error("agent error: {0}")]
    Agent(#[from] LinkError),
}

impl SyncError {
    pub(crate) fn not_found(entity: &'static str, id: i64) -> Self {
        SyncError::NotFound { entity, id }
    }
}
