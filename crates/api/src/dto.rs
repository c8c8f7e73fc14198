//! Request and response bodies, and the checks applied to incoming payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use db::models::{
    GraphDraft, IndexEdge, NewStep, NewWorkflow, RunSummaryRow, StepInsertion, StepPatch,
    WorkflowPatch,
};
use engine::StepRole;

use crate::ApiError;

const MAX_NAME_CHARS: usize = 255;
const PREVIEW_CHARS: usize = 200;
pub const DEFAULT_RUN_LIMIT: i64 = 5;
pub const MAX_RUN_LIMIT: i64 = 50;

fn check_name(field: &str, value: &str) -> Result<(), ApiError> {
    let len = value.chars().count();
    if len == 0 || len > MAX_NAME_CHARS {
        return Err(ApiError::bad_request(format!(
            "{field} must be between 1 and {MAX_NAME_CHARS} characters"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Workflows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct StepInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub role: StepRole,
    #[serde(default)]
    pub position: Option<Value>,
}

impl StepInput {
    fn into_new_step(self) -> Result<NewStep, ApiError> {
        check_name("step name", &self.name)?;
        Ok(NewStep {
            name: self.name,
            description: self.description,
            role: self.role.as_str().to_string(),
            position: self.position.unwrap_or_else(|| json!({})),
        })
    }
}

fn draft(steps: Vec<StepInput>, edges: Vec<IndexEdge>) -> Result<GraphDraft, ApiError> {
    let steps = steps
        .into_iter()
        .map(StepInput::into_new_step)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(GraphDraft { steps, edges })
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateWorkflowRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub steps: Vec<StepInput>,
    /// Indices into `steps`.
    #[serde(default)]
    pub edges: Vec<IndexEdge>,
}

impl CreateWorkflowRequest {
    pub fn into_new_workflow(self, owner_id: String) -> Result<NewWorkflow, ApiError> {
        check_name("name", &self.name)?;
        Ok(NewWorkflow {
            owner_id,
            name: self.name,
            description: self.description,
            graph: draft(self.steps, self.edges)?,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateWorkflowRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub steps: Option<Vec<StepInput>>,
    pub edges: Option<Vec<IndexEdge>>,
}

impl UpdateWorkflowRequest {
    /// Steps and edges replace the graph together or not at all.
    pub fn into_patch(self) -> Result<WorkflowPatch, ApiError> {
        if let Some(name) = &self.name {
            check_name("name", name)?;
        }
        let graph = match (self.steps, self.edges) {
            (Some(steps), Some(edges)) => Some(draft(steps, edges)?),
            (None, None) => None,
            _ => {
                return Err(ApiError::bad_request(
                    "Provide both steps and edges when updating graph",
                ))
            }
        };
        Ok(WorkflowPatch {
            name: self.name,
            description: self.description,
            graph,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateResponse {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl From<Vec<String>> for ValidateResponse {
    fn from(errors: Vec<String>) -> Self {
        Self { valid: errors.is_empty(), errors }
    }
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct AddStepRequest {
    #[serde(flatten)]
    pub step: StepInput,
    /// Adds the edge `insert_after_step_id → new step`.
    pub insert_after_step_id: Option<Uuid>,
    /// Adds the edge `new step → insert_before_step_id`.
    pub insert_before_step_id: Option<Uuid>,
}

impl AddStepRequest {
    pub fn into_insertion(self) -> Result<StepInsertion, ApiError> {
        Ok(StepInsertion {
            step: self.step.into_new_step()?,
            insert_after: self.insert_after_step_id,
            insert_before: self.insert_before_step_id,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateStepRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub role: Option<StepRole>,
    pub position: Option<Value>,
}

impl UpdateStepRequest {
    pub fn into_patch(self) -> Result<StepPatch, ApiError> {
        if let Some(name) = &self.name {
            check_name("step name", name)?;
        }
        Ok(StepPatch {
            name: self.name,
            description: self.description,
            role: self.role.map(|r| r.as_str().to_string()),
            position: self.position,
        })
    }
}

// ---------------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct RunRequest {
    pub input_text: String,
}

impl RunRequest {
    pub fn check(&self) -> Result<(), ApiError> {
        if self.input_text.is_empty() {
            return Err(ApiError::bad_request("input_text must not be empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunsQuery {
    pub limit: Option<i64>,
}

impl RunsQuery {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_RUN_LIMIT).clamp(0, MAX_RUN_LIMIT)
    }
}

/// One line of run history. `input_text` is a preview.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunListItem {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub workflow_name: String,
    pub input_text: String,
    pub status: String,
    pub started_at: DateTime<Utc>,
}

impl From<RunSummaryRow> for RunListItem {
    fn from(row: RunSummaryRow) -> Self {
        Self {
            id: row.id,
            workflow_id: row.workflow_id,
            workflow_name: row.workflow_name,
            input_text: preview(&row.input_text),
            status: row.status,
            started_at: row.started_at,
        }
    }
}

fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
