//! The `Store` trait: everything the engine and API need from persistence.

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{
    NewStepOutput, NewWorkflow, RunCompletion, RunRow, RunStatus, RunSummaryRow, RunWithOutputs,
    StepInsertion, StepOutputRow, StepPatch, StepRow, WorkflowGraph, WorkflowPatch, WorkflowRow,
};
use crate::repository::{runs, steps, workflows};
use crate::{pool, DbError, DbPool};

/// Persistence collaborator.
///
/// Ownership is a tree: a workflow owns its steps, edges and runs; a run owns
/// its step outputs. Every delete cascades down that tree. Owner-scoped
/// lookups report rows of another owner as [`DbError::NotFound`].
///
/// Implementations must be `Send + Sync` to live in axum state and be shared
/// across concurrently executing runs.
#[async_trait]
pub trait Store: Send + Sync {
    /// Cheap reachability check.
    async fn ping(&self) -> Result<(), DbError>;

    // ── workflows ───────────────────────────────────────────────────────────

    async fn create_workflow(&self, new: NewWorkflow) -> Result<WorkflowGraph, DbError>;

    async fn list_workflows(&self, owner_id: &str) -> Result<Vec<WorkflowRow>, DbError>;

    /// Owner-scoped read of a workflow with its steps and edges.
    async fn get_workflow(&self, id: Uuid, owner_id: &str) -> Result<WorkflowGraph, DbError>;

    /// Unscoped read used by the run orchestrator.
    async fn load_workflow(&self, id: Uuid) -> Result<WorkflowGraph, DbError>;

    async fn update_workflow(
        &self,
        id: Uuid,
        owner_id: &str,
        patch: WorkflowPatch,
    ) -> Result<WorkflowGraph, DbError>;

    async fn delete_workflow(&self, id: Uuid, owner_id: &str) -> Result<(), DbError>;

    // ── steps & edges ───────────────────────────────────────────────────────

    async fn add_step(
        &self,
        workflow_id: Uuid,
        owner_id: &str,
        insertion: StepInsertion,
    ) -> Result<StepRow, DbError>;

    async fn update_step(
        &self,
        workflow_id: Uuid,
        step_id: Uuid,
        owner_id: &str,
        patch: StepPatch,
    ) -> Result<StepRow, DbError>;

    async fn delete_step(&self, workflow_id: Uuid, step_id: Uuid, owner_id: &str)
        -> Result<(), DbError>;

    async fn delete_edge(&self, workflow_id: Uuid, edge_id: Uuid, owner_id: &str)
        -> Result<(), DbError>;

    // ── runs ────────────────────────────────────────────────────────────────

    async fn create_run(
        &self,
        workflow_id: Uuid,
        owner_id: &str,
        input_text: &str,
    ) -> Result<RunRow, DbError>;

    async fn get_run(&self, run_id: Uuid) -> Result<RunRow, DbError>;

    async fn get_run_with_outputs(&self, run_id: Uuid, owner_id: &str)
        -> Result<RunWithOutputs, DbError>;

    async fn list_runs(&self, owner_id: &str, limit: i64) -> Result<Vec<RunSummaryRow>, DbError>;

    /// Move a run forward to `status`. Fails with
    /// [`DbError::InvalidTransition`] unless the run is currently in
    /// [`RunStatus::entered_from`], so a terminal run is never reopened.
    async fn update_run_status(&self, run_id: Uuid, status: RunStatus) -> Result<(), DbError>;

    async fn insert_step_output(&self, output: NewStepOutput) -> Result<StepOutputRow, DbError>;

    /// Terminal write: the optional last step output and the run's final
    /// status land together or not at all. Only a `running` run can be
    /// completed; anything else is [`DbError::InvalidTransition`].
    async fn complete_run(&self, completion: RunCompletion) -> Result<(), DbError>;
}

/// [`Store`] backed by Postgres.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<(), DbError> {
        pool::ping(&self.pool).await
    }

    async fn create_workflow(&self, new: NewWorkflow) -> Result<WorkflowGraph, DbError> {
        workflows::create_workflow(&self.pool, new).await
    }

    async fn list_workflows(&self, owner_id: &str) -> Result<Vec<WorkflowRow>, DbError> {
        workflows::list_workflows(&self.pool, owner_id).await
    }

    async fn get_workflow(&self, id: Uuid, owner_id: &str) -> Result<WorkflowGraph, DbError> {
        workflows::get_workflow(&self.pool, id, Some(owner_id)).await
    }

    async fn load_workflow(&self, id: Uuid) -> Result<WorkflowGraph, DbError> {
        workflows::get_workflow(&self.pool, id, None).await
    }

    async fn update_workflow(
        &self,
        id: Uuid,
        owner_id: &str,
        patch: WorkflowPatch,
    ) -> Result<WorkflowGraph, DbError> {
        workflows::update_workflow(&self.pool, id, owner_id, patch).await
    }

    async fn delete_workflow(&self, id: Uuid, owner_id: &str) -> Result<(), DbError> {
        workflows::delete_workflow(&self.pool, id, owner_id).await
    }

    async fn add_step(
        &self,
        workflow_id: Uuid,
        owner_id: &str,
        insertion: StepInsertion,
    ) -> Result<StepRow, DbError> {
        steps::add_step(&self.pool, workflow_id, owner_id, insertion).await
    }

    async fn update_step(
        &self,
        workflow_id: Uuid,
        step_id: Uuid,
        owner_id: &str,
        patch: StepPatch,
    ) -> Result<StepRow, DbError> {
        steps::update_step(&self.pool, workflow_id, step_id, owner_id, patch).await
    }

    async fn delete_step(
        &self,
        workflow_id: Uuid,
        step_id: Uuid,
        owner_id: &str,
    ) -> Result<(), DbError> {
        steps::delete_step(&self.pool, workflow_id, step_id, owner_id).await
    }

    async fn delete_edge(
        &self,
        workflow_id: Uuid,
        edge_id: Uuid,
        owner_id: &str,
    ) -> Result<(), DbError> {
        steps::delete_edge(&self.pool, workflow_id, edge_id, owner_id).await
    }

    async fn create_run(
        &self,
        workflow_id: Uuid,
        owner_id: &str,
        input_text: &str,
    ) -> Result<RunRow, DbError> {
        runs::create_run(&self.pool, workflow_id, owner_id, input_text).await
    }

    async fn get_run(&self, run_id: Uuid) -> Result<RunRow, DbError> {
        runs::get_run(&self.pool, run_id).await
    }

    async fn get_run_with_outputs(
        &self,
        run_id: Uuid,
        owner_id: &str,
    ) -> Result<RunWithOutputs, DbError> {
        runs::get_run_with_outputs(&self.pool, run_id, owner_id).await
    }

    async fn list_runs(&self, owner_id: &str, limit: i64) -> Result<Vec<RunSummaryRow>, DbError> {
        runs::list_runs(&self.pool, owner_id, limit).await
    }

    async fn update_run_status(&self, run_id: Uuid, status: RunStatus) -> Result<(), DbError> {
        runs::update_run_status(&self.pool, run_id, status).await
    }

    async fn insert_step_output(&self, output: NewStepOutput) -> Result<StepOutputRow, DbError> {
        runs::insert_step_output(&self.pool, &output).await
    }

    async fn complete_run(&self, completion: RunCompletion) -> Result<(), DbError> {
        runs::complete_run(&self.pool, completion).await
    }
}
