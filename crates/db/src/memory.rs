//! In-process [`Store`] used by tests and by `storage.backend = "memory"`.
//!
//! All tables sit behind one `RwLock`, so every method is a single atomic
//! write from the point of view of concurrent readers. Cascades that
//! Postgres gets from `ON DELETE CASCADE` are spelled out here.

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{
    EdgeRow, GraphDraft, NewStepOutput, NewWorkflow, RunCompletion, RunRow, RunStatus,
    RunSummaryRow, RunWithOutputs, StepInsertion, StepOutputRow, StepPatch, StepRow,
    WorkflowGraph, WorkflowPatch, WorkflowRow,
};
use crate::{DbError, Store};

#[derive(Debug, Default)]
struct Tables {
    workflows: Vec<WorkflowRow>,
    steps: Vec<StepRow>,
    edges: Vec<EdgeRow>,
    runs: Vec<RunRow>,
    step_outputs: Vec<StepOutputRow>,
}

impl Tables {
    fn workflow(&self, id: Uuid, owner_id: Option<&str>) -> Result<&WorkflowRow, DbError> {
        self.workflows
            .iter()
            .find(|w| w.id == id && owner_id.map_or(true, |o| w.owner_id == o))
            .ok_or(DbError::NotFound)
    }

    fn graph(&self, id: Uuid, owner_id: Option<&str>) -> Result<WorkflowGraph, DbError> {
        let workflow = self.workflow(id, owner_id)?.clone();
        let mut steps: Vec<StepRow> =
            self.steps.iter().filter(|s| s.workflow_id == id).cloned().collect();
        steps.sort_by_key(|s| s.ordinal);
        let edges = self.edges.iter().filter(|e| e.workflow_id == id).cloned().collect();
        Ok(WorkflowGraph { workflow, steps, edges })
    }

    fn insert_graph(&mut self, workflow_id: Uuid, graph: &GraphDraft) {
        let mut step_ids = Vec::with_capacity(graph.steps.len());
        for (ordinal, step) in graph.steps.iter().enumerate() {
            let id = Uuid::new_v4();
            self.steps.push(StepRow {
                id,
                workflow_id,
                ordinal: ordinal as i32,
                name: step.name.clone(),
                description: step.description.clone(),
                role: step.role.clone(),
                position: step.position.clone(),
            });
            step_ids.push(id);
        }
        for edge in graph.resolved_edges() {
            self.insert_edge(workflow_id, step_ids[edge.source_index], step_ids[edge.target_index]);
        }
    }

    fn insert_edge(&mut self, workflow_id: Uuid, source_step_id: Uuid, target_step_id: Uuid) {
        self.edges.push(EdgeRow {
            id: Uuid::new_v4(),
            workflow_id,
            source_step_id,
            target_step_id,
        });
    }

    /// Remove steps matching `doomed`, with their edges and step outputs.
    fn delete_steps_where(&mut self, doomed: impl Fn(&StepRow) -> bool) {
        let ids: Vec<Uuid> = self.steps.iter().filter(|s| doomed(s)).map(|s| s.id).collect();
        self.steps.retain(|s| !ids.contains(&s.id));
        self.edges
            .retain(|e| !ids.contains(&e.source_step_id) && !ids.contains(&e.target_step_id));
        self.step_outputs.retain(|o| !ids.contains(&o.step_id));
    }

    fn run_mut(&mut self, run_id: Uuid) -> Result<&mut RunRow, DbError> {
        self.runs.iter_mut().find(|r| r.id == run_id).ok_or(DbError::NotFound)
    }

    /// The run, if it may move to `to` from its current status.
    fn run_entering(&mut self, run_id: Uuid, to: RunStatus) -> Result<&mut RunRow, DbError> {
        let run = self.run_mut(run_id)?;
        match to.entered_from() {
            Some(from) if run.status != from.as_str() => Err(DbError::InvalidTransition {
                run_id,
                from: run.status.clone(),
                to,
            }),
            _ => Ok(run),
        }
    }

    fn push_output(&mut self, output: &NewStepOutput) -> StepOutputRow {
        let seq = self.step_outputs.iter().filter(|o| o.run_id == output.run_id).count() as i32 + 1;
        let row = StepOutputRow {
            id: Uuid::new_v4(),
            run_id: output.run_id,
            step_id: output.step_id,
            seq,
            input_text: output.input_text.clone(),
            output_text: output.output_text.clone(),
            duration_ms: output.duration_ms,
        };
        self.step_outputs.push(row.clone());
        row
    }
}

/// A [`Store`] that keeps every table in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<(), DbError> {
        Ok(())
    }

    async fn create_workflow(&self, new: NewWorkflow) -> Result<WorkflowGraph, DbError> {
        let mut tables = self.tables.write().await;
        let id = Uuid::new_v4();
        tables.workflows.push(WorkflowRow {
            id,
            owner_id: new.owner_id,
            name: new.name,
            description: new.description,
            created_at: Utc::now(),
        });
        tables.insert_graph(id, &new.graph);
        tables.graph(id, None)
    }

    async fn list_workflows(&self, owner_id: &str) -> Result<Vec<WorkflowRow>, DbError> {
        let tables = self.tables.read().await;
        let mut rows: Vec<WorkflowRow> = tables
            .workflows
            .iter()
            .rev()
            .filter(|w| w.owner_id == owner_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn get_workflow(&self, id: Uuid, owner_id: &str) -> Result<WorkflowGraph, DbError> {
        self.tables.read().await.graph(id, Some(owner_id))
    }

    async fn load_workflow(&self, id: Uuid) -> Result<WorkflowGraph, DbError> {
        self.tables.read().await.graph(id, None)
    }

    async fn update_workflow(
        &self,
        id: Uuid,
        owner_id: &str,
        patch: WorkflowPatch,
    ) -> Result<WorkflowGraph, DbError> {
        let mut tables = self.tables.write().await;
        tables.workflow(id, Some(owner_id))?;

        if let Some(workflow) = tables.workflows.iter_mut().find(|w| w.id == id) {
            if let Some(name) = patch.name {
                workflow.name = name;
            }
            if let Some(description) = patch.description {
                workflow.description = description;
            }
        }

        if let Some(graph) = patch.graph {
            tables.delete_steps_where(|s| s.workflow_id == id);
            tables.edges.retain(|e| e.workflow_id != id);
            tables.insert_graph(id, &graph);
        }

        tables.graph(id, None)
    }

    async fn delete_workflow(&self, id: Uuid, owner_id: &str) -> Result<(), DbError> {
        let mut tables = self.tables.write().await;
        tables.workflow(id, Some(owner_id))?;

        tables.delete_steps_where(|s| s.workflow_id == id);
        tables.edges.retain(|e| e.workflow_id != id);
        let run_ids: Vec<Uuid> =
            tables.runs.iter().filter(|r| r.workflow_id == id).map(|r| r.id).collect();
        tables.step_outputs.retain(|o| !run_ids.contains(&o.run_id));
        tables.runs.retain(|r| r.workflow_id != id);
        tables.workflows.retain(|w| w.id != id);
        Ok(())
    }

    async fn add_step(
        &self,
        workflow_id: Uuid,
        owner_id: &str,
        insertion: StepInsertion,
    ) -> Result<StepRow, DbError> {
        let mut tables = self.tables.write().await;
        tables.workflow(workflow_id, Some(owner_id))?;

        let in_workflow =
            |tables: &Tables, id: Uuid| tables.steps.iter().any(|s| s.id == id && s.workflow_id == workflow_id);
        for (field, neighbour) in [
            ("insert_after_step_id", insertion.insert_after),
            ("insert_before_step_id", insertion.insert_before),
        ] {
            if let Some(id) = neighbour {
                if !in_workflow(&*tables, id) {
                    return Err(DbError::InvalidReference(format!(
                        "{field} must be a step ID in this workflow"
                    )));
                }
            }
        }

        let ordinal = tables
            .steps
            .iter()
            .filter(|s| s.workflow_id == workflow_id)
            .map(|s| s.ordinal + 1)
            .max()
            .unwrap_or(0);
        let step = StepRow {
            id: Uuid::new_v4(),
            workflow_id,
            ordinal,
            name: insertion.step.name,
            description: insertion.step.description,
            role: insertion.step.role,
            position: insertion.step.position,
        };
        tables.steps.push(step.clone());

        if let Some(after) = insertion.insert_after {
            tables.insert_edge(workflow_id, after, step.id);
        }
        if let Some(before) = insertion.insert_before {
            tables.insert_edge(workflow_id, step.id, before);
        }

        Ok(step)
    }

    async fn update_step(
        &self,
        workflow_id: Uuid,
        step_id: Uuid,
        owner_id: &str,
        patch: StepPatch,
    ) -> Result<StepRow, DbError> {
        let mut tables = self.tables.write().await;
        tables.workflow(workflow_id, Some(owner_id))?;

        let step = tables
            .steps
            .iter_mut()
            .find(|s| s.id == step_id && s.workflow_id == workflow_id)
            .ok_or(DbError::NotFound)?;

        if let Some(name) = patch.name {
            step.name = name;
        }
        if let Some(description) = patch.description {
            step.description = description;
        }
        if let Some(role) = patch.role {
            step.role = role;
        }
        if let Some(position) = patch.position {
            step.position = position;
        }

        Ok(step.clone())
    }

    async fn delete_step(
        &self,
        workflow_id: Uuid,
        step_id: Uuid,
        owner_id: &str,
    ) -> Result<(), DbError> {
        let mut tables = self.tables.write().await;
        tables.workflow(workflow_id, Some(owner_id))?;

        if !tables.steps.iter().any(|s| s.id == step_id && s.workflow_id == workflow_id) {
            return Err(DbError::NotFound);
        }
        tables.delete_steps_where(|s| s.id == step_id);
        Ok(())
    }

    async fn delete_edge(
        &self,
        workflow_id: Uuid,
        edge_id: Uuid,
        owner_id: &str,
    ) -> Result<(), DbError> {
        let mut tables = self.tables.write().await;
        tables.workflow(workflow_id, Some(owner_id))?;

        let before = tables.edges.len();
        tables.edges.retain(|e| !(e.id == edge_id && e.workflow_id == workflow_id));
        if tables.edges.len() == before {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    async fn create_run(
        &self,
        workflow_id: Uuid,
        owner_id: &str,
        input_text: &str,
    ) -> Result<RunRow, DbError> {
        let mut tables = self.tables.write().await;
        tables.workflow(workflow_id, None)?;

        let run = RunRow {
            id: Uuid::new_v4(),
            workflow_id,
            owner_id: owner_id.to_string(),
            input_text: input_text.to_string(),
            status: RunStatus::Pending.to_string(),
            started_at: Utc::now(),
            completed_at: None,
            error_message: None,
        };
        tables.runs.push(run.clone());
        Ok(run)
    }

    async fn get_run(&self, run_id: Uuid) -> Result<RunRow, DbError> {
        let tables = self.tables.read().await;
        tables.runs.iter().find(|r| r.id == run_id).cloned().ok_or(DbError::NotFound)
    }

    async fn get_run_with_outputs(
        &self,
        run_id: Uuid,
        owner_id: &str,
    ) -> Result<RunWithOutputs, DbError> {
        let tables = self.tables.read().await;
        let run = tables
            .runs
            .iter()
            .find(|r| r.id == run_id && r.owner_id == owner_id)
            .cloned()
            .ok_or(DbError::NotFound)?;

        let mut step_outputs: Vec<StepOutputRow> =
            tables.step_outputs.iter().filter(|o| o.run_id == run_id).cloned().collect();
        step_outputs.sort_by_key(|o| o.seq);

        Ok(RunWithOutputs { run, step_outputs })
    }

    async fn list_runs(&self, owner_id: &str, limit: i64) -> Result<Vec<RunSummaryRow>, DbError> {
        let tables = self.tables.read().await;
        let mut rows: Vec<RunSummaryRow> = tables
            .runs
            .iter()
            .rev()
            .filter(|r| r.owner_id == owner_id)
            .filter_map(|r| {
                let workflow = tables.workflows.iter().find(|w| w.id == r.workflow_id)?;
                Some(RunSummaryRow {
                    id: r.id,
                    workflow_id: r.workflow_id,
                    workflow_name: workflow.name.clone(),
                    input_text: r.input_text.clone(),
                    status: r.status.clone(),
                    started_at: r.started_at,
                })
            })
            .collect();
        rows.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn update_run_status(&self, run_id: Uuid, status: RunStatus) -> Result<(), DbError> {
        let mut tables = self.tables.write().await;
        tables.run_entering(run_id, status)?.status = status.to_string();
        Ok(())
    }

    async fn insert_step_output(&self, output: NewStepOutput) -> Result<StepOutputRow, DbError> {
        let mut tables = self.tables.write().await;
        tables.run_mut(output.run_id)?;
        Ok(tables.push_output(&output))
    }

    async fn complete_run(&self, completion: RunCompletion) -> Result<(), DbError> {
        let mut tables = self.tables.write().await;
        tables.run_entering(completion.run_id, completion.status)?;

        if let Some(output) = &completion.final_output {
            tables.push_output(output);
        }

        let run = tables.run_mut(completion.run_id)?;
        run.status = completion.status.to_string();
        run.error_message = completion.error_message;
        run.completed_at = Some(completion.completed_at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IndexEdge, NewStep};
    use serde_json::json;

    const OWNER: &str = "owner-a";

    fn step(name: &str, role: &str) -> NewStep {
        NewStep {
            name: name.into(),
            description: format!("{name} description"),
            role: role.into(),
            position: json!({ "x": 0.0, "y": 0.0 }),
        }
    }

    fn chain() -> NewWorkflow {
        NewWorkflow {
            owner_id: OWNER.into(),
            name: "chain".into(),
            description: String::new(),
            graph: GraphDraft {
                steps: vec![step("s1", "START"), step("s2", "NORMAL"), step("s3", "END")],
                edges: vec![
                    IndexEdge { source_index: 0, target_index: 1 },
                    IndexEdge { source_index: 1, target_index: 2 },
                ],
            },
        }
    }

    fn output(run_id: Uuid, step_id: Uuid, text: &str) -> NewStepOutput {
        NewStepOutput {
            run_id,
            step_id,
            input_text: "in".into(),
            output_text: text.into(),
            duration_ms: 1.5,
        }
    }

    #[tokio::test]
    async fn create_resolves_index_edges_to_step_ids() {
        let store = MemoryStore::new();
        let graph = store.create_workflow(chain()).await.unwrap();

        assert_eq!(graph.steps.len(), 3);
        assert_eq!(graph.edges.len(), 2);
        assert_eq!(graph.edges[0].source_step_id, graph.steps[0].id);
        assert_eq!(graph.edges[0].target_step_id, graph.steps[1].id);
        assert_eq!(graph.edges[1].target_step_id, graph.steps[2].id);
    }

    #[tokio::test]
    async fn reads_are_scoped_to_the_owner() {
        let store = MemoryStore::new();
        let graph = store.create_workflow(chain()).await.unwrap();
        let id = graph.workflow.id;

        assert!(store.get_workflow(id, OWNER).await.is_ok());
        assert!(matches!(store.get_workflow(id, "intruder").await, Err(DbError::NotFound)));
        assert!(store.list_workflows("intruder").await.unwrap().is_empty());
        assert!(matches!(store.delete_workflow(id, "intruder").await, Err(DbError::NotFound)));
        assert!(store.load_workflow(id).await.is_ok());
    }

    #[tokio::test]
    async fn deleting_a_workflow_cascades_to_runs_and_outputs() {
        let store = MemoryStore::new();
        let graph = store.create_workflow(chain()).await.unwrap();
        let id = graph.workflow.id;
        let run = store.create_run(id, OWNER, "hello").await.unwrap();
        store.insert_step_output(output(run.id, graph.steps[0].id, "x")).await.unwrap();

        store.delete_workflow(id, OWNER).await.unwrap();

        assert!(matches!(store.get_run(run.id).await, Err(DbError::NotFound)));
        assert!(store.tables.read().await.step_outputs.is_empty());
        assert!(store.tables.read().await.steps.is_empty());
    }

    #[tokio::test]
    async fn deleting_a_step_removes_its_edges_and_outputs() {
        let store = MemoryStore::new();
        let graph = store.create_workflow(chain()).await.unwrap();
        let id = graph.workflow.id;
        let middle = graph.steps[1].id;
        let run = store.create_run(id, OWNER, "hello").await.unwrap();
        store.insert_step_output(output(run.id, graph.steps[0].id, "a")).await.unwrap();
        store.insert_step_output(output(run.id, middle, "b")).await.unwrap();

        store.delete_step(id, middle, OWNER).await.unwrap();

        let graph = store.get_workflow(id, OWNER).await.unwrap();
        assert_eq!(graph.steps.len(), 2);
        assert!(graph.edges.is_empty());
        let run = store.get_run_with_outputs(run.id, OWNER).await.unwrap();
        assert_eq!(run.step_outputs.len(), 1);
        assert_eq!(run.step_outputs[0].output_text, "a");
    }

    #[tokio::test]
    async fn replacing_the_graph_swaps_every_step() {
        let store = MemoryStore::new();
        let graph = store.create_workflow(chain()).await.unwrap();
        let id = graph.workflow.id;

        let patched = store
            .update_workflow(
                id,
                OWNER,
                WorkflowPatch {
                    name: Some("renamed".into()),
                    description: None,
                    graph: Some(GraphDraft { steps: vec![step("solo", "START")], edges: vec![] }),
                },
            )
            .await
            .unwrap();

        assert_eq!(patched.workflow.name, "renamed");
        assert_eq!(patched.steps.len(), 1);
        assert_eq!(patched.steps[0].name, "solo");
        assert!(patched.edges.is_empty());
    }

    #[tokio::test]
    async fn add_step_wires_neighbours_and_rejects_foreign_ids() {
        let store = MemoryStore::new();
        let graph = store.create_workflow(chain()).await.unwrap();
        let id = graph.workflow.id;

        let added = store
            .add_step(
                id,
                OWNER,
                StepInsertion {
                    step: step("s4", "NORMAL"),
                    insert_after: Some(graph.steps[2].id),
                    insert_before: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(added.ordinal, 3);

        let graph = store.get_workflow(id, OWNER).await.unwrap();
        assert!(graph
            .edges
            .iter()
            .any(|e| e.source_step_id == graph.steps[2].id && e.target_step_id == added.id));

        let err = store
            .add_step(
                id,
                OWNER,
                StepInsertion {
                    step: step("s5", "NORMAL"),
                    insert_after: None,
                    insert_before: Some(Uuid::new_v4()),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidReference(msg) if msg.contains("insert_before_step_id")));
    }

    #[tokio::test]
    async fn complete_run_appends_output_and_stamps_status() {
        let store = MemoryStore::new();
        let graph = store.create_workflow(chain()).await.unwrap();
        let run = store.create_run(graph.workflow.id, OWNER, "hello").await.unwrap();
        assert_eq!(run.status, "pending");

        store.update_run_status(run.id, RunStatus::Running).await.unwrap();
        store.insert_step_output(output(run.id, graph.steps[0].id, "one")).await.unwrap();
        store
            .complete_run(RunCompletion {
                run_id: run.id,
                status: RunStatus::Failed,
                error_message: Some("Step 's2': boom".into()),
                completed_at: Utc::now(),
                final_output: Some(output(run.id, graph.steps[1].id, "boom")),
            })
            .await
            .unwrap();

        let detail = store.get_run_with_outputs(run.id, OWNER).await.unwrap();
        assert_eq!(detail.run.status, "failed");
        assert!(detail.run.completed_at.is_some());
        assert_eq!(detail.run.error_message.as_deref(), Some("Step 's2': boom"));
        let seqs: Vec<i32> = detail.step_outputs.iter().map(|o| o.seq).collect();
        assert_eq!(seqs, vec![1, 2]);
    }

    fn finish(run_id: Uuid) -> RunCompletion {
        RunCompletion {
            run_id,
            status: RunStatus::Completed,
            error_message: None,
            completed_at: Utc::now(),
            final_output: None,
        }
    }

    #[tokio::test]
    async fn finished_runs_are_never_reopened() {
        let store = MemoryStore::new();
        let graph = store.create_workflow(chain()).await.unwrap();
        let run = store.create_run(graph.workflow.id, OWNER, "hello").await.unwrap();
        store.update_run_status(run.id, RunStatus::Running).await.unwrap();
        store.complete_run(finish(run.id)).await.unwrap();
        let stamped = store.get_run(run.id).await.unwrap().completed_at;

        let err = store.update_run_status(run.id, RunStatus::Running).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::InvalidTransition { from, to: RunStatus::Running, .. } if from == "completed"
        ));

        let err = store
            .complete_run(RunCompletion {
                final_output: Some(output(run.id, graph.steps[0].id, "again")),
                ..finish(run.id)
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidTransition { .. }));

        let detail = store.get_run_with_outputs(run.id, OWNER).await.unwrap();
        assert_eq!(detail.run.status, "completed");
        assert_eq!(detail.run.completed_at, stamped);
        assert!(detail.step_outputs.is_empty());
    }

    #[tokio::test]
    async fn pending_runs_cannot_skip_running() {
        let store = MemoryStore::new();
        let graph = store.create_workflow(chain()).await.unwrap();
        let run = store.create_run(graph.workflow.id, OWNER, "hello").await.unwrap();

        let err = store.complete_run(finish(run.id)).await.unwrap_err();
        assert!(matches!(err, DbError::InvalidTransition { from, .. } if from == "pending"));

        let err = store.update_run_status(Uuid::new_v4(), RunStatus::Running).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound));
    }

    #[tokio::test]
    async fn list_runs_is_newest_first_and_limited() {
        let store = MemoryStore::new();
        let graph = store.create_workflow(chain()).await.unwrap();
        for input in ["one", "two", "three"] {
            store.create_run(graph.workflow.id, OWNER, input).await.unwrap();
        }
        store.create_run(graph.workflow.id, "someone-else", "x").await.unwrap();

        let runs = store.list_runs(OWNER, 2).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].input_text, "three");
        assert_eq!(runs[0].workflow_name, "chain");
    }
}
