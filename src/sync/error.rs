use sea_orm::DbErr;
use thiserror::Error;

use crate::db::hooks::EntityKind;
use crate::db::services::is_unique_violation;
use crate::router::RouterError;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Router call failed: {0}")]
    Router(#[from] RouterError),
    #[error("Database error: {0}")]
    Database(DbErr),
    #[error("{kind} #{id} not found in the local store")]
    NotFound { kind: EntityKind, id: i32 },
    #[error("Unresolvable reference: {0}")]
    Reference(String),
    #[error("Conflicting write: {0}")]
    Conflict(String),
    #[error("A reconciliation run is already in progress")]
    AlreadyRunning,
    #[error("Invalid request: {0}")]
    Invalid(String),
}

impl From<DbErr> for SyncError {
    fn from(err: DbErr) -> Self {
        if is_unique_violation(&err) {
            SyncError::Conflict(err.to_string())
        } else {
            SyncError::Database(err)
        }
    }
}

impl SyncError {
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Router(e) => e.is_retryable(),
            SyncError::Database(_) | SyncError::Conflict(_) | SyncError::AlreadyRunning => true,
            SyncError::NotFound { .. } | SyncError::Reference(_) | SyncError::Invalid(_) => false,
        }
    }
}
