//! Typed error type for the db crate.

use thiserror::Error;
use uuid::Uuid;

use crate::models::RunStatus;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("row not found")]
    NotFound,

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A referenced row exists but belongs to a different workflow.
    #[error("invalid reference: {0}")]
    InvalidReference(String),

    /// The run is not in the state the requested status may be entered from.
    #[error("run '{run_id}' cannot move from {from} to {to}")]
    InvalidTransition {
        run_id: Uuid,
        from: String,
        to: RunStatus,
    },
}
