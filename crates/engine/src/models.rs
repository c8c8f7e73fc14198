//! Core domain models for the workflow engine.
//!
//! These are built from the db crate's rows once roles and statuses have
//! been parsed, so the rest of the engine never touches raw strings. They
//! are also the JSON shapes the API returns and the cache stores.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use db::models::{
    EdgeRow, RunRow, RunWithOutputs, StepOutputRow, StepRow, WorkflowGraph, WorkflowRow,
};

pub use db::models::RunStatus;
pub use nodes::StepRole;

use crate::EngineError;

// ---------------------------------------------------------------------------
// Workflow graph
// ---------------------------------------------------------------------------

/// One node of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub name: String,
    /// Instruction handed to the transform.
    pub description: String,
    pub role: StepRole,
    /// UI layout, opaque to execution.
    pub position: serde_json::Value,
}

/// Directed connection between two steps of the same workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub source_step_id: Uuid,
    pub target_step_id: Uuid,
}

/// A workflow with its steps (in insertion order) and edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: Uuid,
    pub owner_id: String,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub steps: Vec<Step>,
    pub edges: Vec<Edge>,
}

/// Workflow header as listed for an owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<StepRow> for Step {
    type Error = EngineError;

    fn try_from(row: StepRow) -> Result<Self, Self::Error> {
        let role = row
            .role
            .parse::<StepRole>()
            .map_err(|message| EngineError::InvalidRole { step_id: row.id, message })?;

        Ok(Self {
            id: row.id,
            workflow_id: row.workflow_id,
            name: row.name,
            description: row.description,
            role,
            position: row.position,
        })
    }
}

impl From<EdgeRow> for Edge {
    fn from(row: EdgeRow) -> Self {
        Self {
            id: row.id,
            workflow_id: row.workflow_id,
            source_step_id: row.source_step_id,
            target_step_id: row.target_step_id,
        }
    }
}

impl TryFrom<WorkflowGraph> for Workflow {
    type Error = EngineError;

    fn try_from(graph: WorkflowGraph) -> Result<Self, Self::Error> {
        let steps = graph
            .steps
            .into_iter()
            .map(Step::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            id: graph.workflow.id,
            owner_id: graph.workflow.owner_id,
            name: graph.workflow.name,
            description: graph.workflow.description,
            created_at: graph.workflow.created_at,
            steps,
            edges: graph.edges.into_iter().map(Edge::from).collect(),
        })
    }
}

impl From<WorkflowRow> for WorkflowSummary {
    fn from(row: WorkflowRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            created_at: row.created_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub owner_id: String,
    pub input_text: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

/// Immutable record of one executed step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutput {
    pub id: Uuid,
    pub run_id: Uuid,
    pub step_id: Uuid,
    pub input_text: String,
    /// Produced text, or the error text when the step failed without output.
    pub output_text: String,
    pub duration_ms: f64,
}

/// A run with its step outputs in execution order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunDetail {
    #[serde(flatten)]
    pub run: Run,
    pub step_outputs: Vec<StepOutput>,
}

impl TryFrom<RunRow> for Run {
    type Error = EngineError;

    fn try_from(row: RunRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<RunStatus>()
            .map_err(|message| EngineError::InvalidStatus { run_id: row.id, message })?;

        Ok(Self {
            id: row.id,
            workflow_id: row.workflow_id,
            owner_id: row.owner_id,
            input_text: row.input_text,
            status,
            started_at: row.started_at,
            completed_at: row.completed_at,
            error_message: row.error_message,
        })
    }
}

impl From<StepOutputRow> for StepOutput {
    fn from(row: StepOutputRow) -> Self {
        Self {
            id: row.id,
            run_id: row.run_id,
            step_id: row.step_id,
            input_text: row.input_text,
            output_text: row.output_text,
            duration_ms: row.duration_ms,
        }
    }
}

impl TryFrom<RunWithOutputs> for RunDetail {
    type Error = EngineError;

    fn try_from(value: RunWithOutputs) -> Result<Self, Self::Error> {
        Ok(Self {
            run: Run::try_from(value.run)?,
            step_outputs: value.step_outputs.into_iter().map(StepOutput::from).collect(),
        })
    }
}
