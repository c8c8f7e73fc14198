//! Engine-level error types.

use thiserror::Error;
use uuid::Uuid;

/// Faults raised by the engine.
///
/// Graph defects are not errors: the validator reports them as data. Step
/// failures are not errors either: they become persisted run state.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The resolver was asked to order a graph without a START step.
    #[error("workflow has no START step")]
    NoStartStep,

    #[error("workflow '{0}' not found")]
    WorkflowNotFound(Uuid),

    #[error("run '{0}' not found")]
    RunNotFound(Uuid),

    /// A stored step carries a role outside START/NORMAL/END.
    #[error("step '{step_id}' has an invalid role: {message}")]
    InvalidRole { step_id: Uuid, message: String },

    /// A stored run carries an unknown status.
    #[error("run '{run_id}' has an invalid status: {message}")]
    InvalidStatus { run_id: Uuid, message: String },

    /// Persistence error from the db crate.
    #[error("database error: {0}")]
    Database(#[from] db::DbError),
}
