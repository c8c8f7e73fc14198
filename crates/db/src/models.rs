//! Row structs that map 1-to-1 onto database tables, plus the input
//! structs the repository functions accept.
//!
//! These are *persistence* models: they carry no domain behaviour.
//! Domain types live in the `engine` crate. Step roles are stored as their
//! wire names (`START`, `NORMAL`, `END`); the engine parses them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// workflows / steps / edges
// ---------------------------------------------------------------------------

/// A persisted workflow header row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowRow {
    pub id: Uuid,
    /// Opaque client identifier that owns this workflow.
    pub owner_id: String,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// A persisted step row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StepRow {
    pub id: Uuid,
    pub workflow_id: Uuid,
    /// Insertion order within the workflow.
    pub ordinal: i32,
    pub name: String,
    pub description: String,
    pub role: String,
    /// UI layout blob, never interpreted here.
    pub position: serde_json::Value,
}

/// A persisted edge row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EdgeRow {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub source_step_id: Uuid,
    pub target_step_id: Uuid,
}

/// A workflow together with its steps (in ordinal order) and edges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowGraph {
    pub workflow: WorkflowRow,
    pub steps: Vec<StepRow>,
    pub edges: Vec<EdgeRow>,
}

/// Step fields supplied when authoring a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStep {
    pub name: String,
    pub description: String,
    pub role: String,
    pub position: serde_json::Value,
}

/// Edge expressed as 0-based indices into the accompanying step list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEdge {
    pub source_index: usize,
    pub target_index: usize,
}

/// A full graph to write in one go. Edges with out-of-range indices are dropped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphDraft {
    pub steps: Vec<NewStep>,
    pub edges: Vec<IndexEdge>,
}

impl GraphDraft {
    /// Edges whose indices both fall inside `steps`.
    pub fn resolved_edges(&self) -> impl Iterator<Item = IndexEdge> + '_ {
        let len = self.steps.len();
        self.edges
            .iter()
            .copied()
            .filter(move |e| e.source_index < len && e.target_index < len)
    }
}

#[derive(Debug, Clone)]
pub struct NewWorkflow {
    pub owner_id: String,
    pub name: String,
    pub description: String,
    pub graph: GraphDraft,
}

/// Partial update of a workflow; `graph` replaces every step and edge.
#[derive(Debug, Clone, Default)]
pub struct WorkflowPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub graph: Option<GraphDraft>,
}

/// A step added to an existing workflow, optionally wired into the chain.
#[derive(Debug, Clone)]
pub struct StepInsertion {
    pub step: NewStep,
    /// Adds the edge `insert_after → new step`.
    pub insert_after: Option<Uuid>,
    /// Adds the edge `new step → insert_before`.
    pub insert_before: Option<Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct StepPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub role: Option<String>,
    pub position: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// runs
// ---------------------------------------------------------------------------

/// Lifecycle of a run: `pending → running → completed | failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending   => "pending",
            Self::Running   => "running",
            Self::Completed => "completed",
            Self::Failed    => "failed",
        }
    }

    /// Terminal states are never left once entered.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// The only state a run may enter `self` from; `None` for the initial state.
    pub fn entered_from(&self) -> Option<RunStatus> {
        match self {
            Self::Pending => None,
            Self::Running => Some(Self::Pending),
            Self::Completed | Self::Failed => Some(Self::Running),
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending"   => Ok(Self::Pending),
            "running"   => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed"    => Ok(Self::Failed),
            other       => Err(format!("unknown run status: {other}")),
        }
    }
}

/// A persisted run row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RunRow {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub owner_id: String,
    pub input_text: String,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

/// One line of run history, joined with the workflow name.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RunSummaryRow {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub workflow_name: String,
    pub input_text: String,
    pub status: String,
    pub started_at: DateTime<Utc>,
}

/// A run with its step outputs in execution order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunWithOutputs {
    pub run: RunRow,
    pub step_outputs: Vec<StepOutputRow>,
}

// ---------------------------------------------------------------------------
// step_outputs
// ---------------------------------------------------------------------------

/// A persisted step output row. Never updated after insert.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StepOutputRow {
    pub id: Uuid,
    pub run_id: Uuid,
    pub step_id: Uuid,
    /// 1-based execution position within the run.
    pub seq: i32,
    pub input_text: String,
    pub output_text: String,
    pub duration_ms: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewStepOutput {
    pub run_id: Uuid,
    pub step_id: Uuid,
    pub input_text: String,
    pub output_text: String,
    pub duration_ms: f64,
}

/// Terminal write for a run: status, error and completion stamp, together
/// with the last step output when there is one.
#[derive(Debug, Clone)]
pub struct RunCompletion {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub error_message: Option<String>,
    pub completed_at: DateTime<Utc>,
    pub final_output: Option<NewStepOutput>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(name: &str) -> NewStep {
        NewStep {
            name: name.into(),
            description: String::new(),
            role: "NORMAL".into(),
            position: serde_json::json!({}),
        }
    }

    #[test]
    fn out_of_range_edges_are_dropped() {
        let draft = GraphDraft {
            steps: vec![step("a"), step("b")],
            edges: vec![
                IndexEdge { source_index: 0, target_index: 1 },
                IndexEdge { source_index: 1, target_index: 2 },
                IndexEdge { source_index: 7, target_index: 0 },
            ],
        };
        let edges: Vec<_> = draft.resolved_edges().collect();
        assert_eq!(edges, vec![IndexEdge { source_index: 0, target_index: 1 }]);
    }

    #[test]
    fn run_status_parses_and_knows_terminal_states() {
        assert_eq!("running".parse::<RunStatus>(), Ok(RunStatus::Running));
        assert!("done".parse::<RunStatus>().is_err());
        assert!(!RunStatus::Pending.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
    }

    #[test]
    fn runs_only_move_forward() {
        assert_eq!(RunStatus::Pending.entered_from(), None);
        assert_eq!(RunStatus::Running.entered_from(), Some(RunStatus::Pending));
        assert_eq!(RunStatus::Completed.entered_from(), Some(RunStatus::Running));
        assert_eq!(RunStatus::Failed.entered_from(), Some(RunStatus::Running));
    }
}
