//! End-to-end tests for the run orchestrator.
//!
//! These run against `MemoryStore` and `MockTransform`, so no Postgres or
//! model access is needed.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use db::models::{GraphDraft, IndexEdge, NewStep, NewWorkflow, WorkflowGraph};
use db::{MemoryStore, Store};
use nodes::mock::MockTransform;
use nodes::{StepTransform, TransformOutcome, TransformRequest};
use serde_json::json;
use uuid::Uuid;

use crate::dag::START_COUNT;
use crate::executor::MISSING_WORKFLOW;
use crate::{EngineError, RunDetail, RunStatus, StepRole, SubmitOutcome, WorkflowExecutor};

const OWNER: &str = "browser-1";

fn step(name: &str, role: &str) -> NewStep {
    NewStep {
        name: name.into(),
        description: format!("do {name}"),
        role: role.into(),
        position: json!({ "x": 0, "y": 0 }),
    }
}

fn edges(pairs: &[(usize, usize)]) -> Vec<IndexEdge> {
    pairs
        .iter()
        .map(|&(source_index, target_index)| IndexEdge { source_index, target_index })
        .collect()
}

async fn create(store: &MemoryStore, steps: Vec<NewStep>, pairs: &[(usize, usize)]) -> WorkflowGraph {
    store
        .create_workflow(NewWorkflow {
            owner_id: OWNER.into(),
            name: "wf".into(),
            description: String::new(),
            graph: GraphDraft { steps, edges: edges(pairs) },
        })
        .await
        .expect("workflow created")
}

/// START "s1" → NORMAL "s2" → END "s3"
async fn three_step_chain(store: &MemoryStore) -> WorkflowGraph {
    create(
        store,
        vec![step("s1", "START"), step("s2", "NORMAL"), step("s3", "END")],
        &[(0, 1), (1, 2)],
    )
    .await
}

fn executor(store: &Arc<MemoryStore>, transform: &MockTransform) -> WorkflowExecutor {
    WorkflowExecutor::new(store.clone(), Arc::new(transform.clone()))
}

fn finished(outcome: SubmitOutcome) -> RunDetail {
    match outcome {
        SubmitOutcome::Finished(detail) => detail,
        SubmitOutcome::Rejected(errors) => panic!("run unexpectedly rejected: {errors:?}"),
    }
}

fn outputs(detail: &RunDetail) -> Vec<&str> {
    detail.step_outputs.iter().map(|o| o.output_text.as_str()).collect()
}

// ============================================================
// Completed runs
// ============================================================

#[tokio::test]
async fn every_step_runs_and_the_run_completes() {
    let store = Arc::new(MemoryStore::new());
    let workflow = three_step_chain(&store).await;
    let transform = MockTransform::uppercase();

    let detail = finished(
        executor(&store, &transform)
            .submit(workflow.workflow.id, OWNER, "hello")
            .await
            .expect("submitted"),
    );

    assert_eq!(detail.run.status, RunStatus::Completed);
    assert_eq!(detail.run.error_message, None);
    assert!(detail.run.completed_at.is_some());
    assert_eq!(outputs(&detail), vec!["HELLO", "HELLO", "HELLO"]);

    let step_ids: Vec<Uuid> = detail.step_outputs.iter().map(|o| o.step_id).collect();
    let expected: Vec<Uuid> = workflow.steps.iter().map(|s| s.id).collect();
    assert_eq!(step_ids, expected);

    let inputs: Vec<&str> = detail.step_outputs.iter().map(|o| o.input_text.as_str()).collect();
    assert_eq!(inputs, vec!["hello", "HELLO", "HELLO"]);
    assert!(detail.step_outputs.iter().all(|o| o.duration_ms >= 0.0));
}

#[tokio::test]
async fn each_step_sees_the_previous_output_and_its_role() {
    let store = Arc::new(MemoryStore::new());
    let workflow = three_step_chain(&store).await;
    let transform = MockTransform::returning("constant");

    let detail = finished(
        executor(&store, &transform)
            .submit(workflow.workflow.id, OWNER, "seed")
            .await
            .expect("submitted"),
    );
    assert_eq!(detail.run.status, RunStatus::Completed);

    let calls = transform.calls();
    let seen: Vec<(&str, &str, StepRole)> = calls
        .iter()
        .map(|c| (c.step_name.as_str(), c.input.as_str(), c.role))
        .collect();
    assert_eq!(
        seen,
        vec![
            ("s1", "seed", StepRole::Start),
            ("s2", "constant", StepRole::Normal),
            ("s3", "constant", StepRole::End),
        ]
    );
}

#[tokio::test]
async fn steps_run_in_chain_order_not_listing_order() {
    let store = Arc::new(MemoryStore::new());
    // Listed END, START, NORMAL; wired START → NORMAL → END.
    let workflow = create(
        &store,
        vec![step("last", "END"), step("first", "START"), step("middle", "NORMAL")],
        &[(1, 2), (2, 0)],
    )
    .await;
    let transform = MockTransform::echo();

    finished(
        executor(&store, &transform)
            .submit(workflow.workflow.id, OWNER, "x")
            .await
            .expect("submitted"),
    );

    let names: Vec<String> = transform.calls().into_iter().map(|c| c.step_name).collect();
    assert_eq!(names, vec!["first", "middle", "last"]);
}

#[tokio::test]
async fn lone_start_step_is_executed_once() {
    let store = Arc::new(MemoryStore::new());
    let workflow = create(&store, vec![step("only", "START")], &[]).await;
    let transform = MockTransform::uppercase();

    let detail = finished(
        executor(&store, &transform)
            .submit(workflow.workflow.id, OWNER, "abc")
            .await
            .expect("submitted"),
    );

    assert_eq!(detail.run.status, RunStatus::Completed);
    assert_eq!(outputs(&detail), vec!["ABC"]);
    assert_eq!(transform.call_count(), 1);
}

// ============================================================
// Failed runs
// ============================================================

#[tokio::test]
async fn failing_step_stops_the_run() {
    let store = Arc::new(MemoryStore::new());
    let workflow = three_step_chain(&store).await;
    let transform = MockTransform::uppercase().failing_on("s2", "rate limited");

    let detail = finished(
        executor(&store, &transform)
            .submit(workflow.workflow.id, OWNER, "hello")
            .await
            .expect("submitted"),
    );

    assert_eq!(detail.run.status, RunStatus::Failed);
    assert_eq!(detail.run.error_message.as_deref(), Some("Step 's2': rate limited"));
    assert!(detail.run.completed_at.is_some());
    assert_eq!(outputs(&detail), vec!["HELLO", "rate limited"]);
    assert_eq!(detail.step_outputs[1].input_text, "HELLO");
    assert_eq!(transform.call_count(), 2);
}

#[tokio::test]
async fn partial_text_is_kept_over_the_error_text() {
    let store = Arc::new(MemoryStore::new());
    let workflow = three_step_chain(&store).await;
    let transform = MockTransform::echo().partial_on("s3", "half an answer", "timed out");

    let detail = finished(
        executor(&store, &transform)
            .submit(workflow.workflow.id, OWNER, "in")
            .await
            .expect("submitted"),
    );

    assert_eq!(detail.run.status, RunStatus::Failed);
    assert_eq!(detail.run.error_message.as_deref(), Some("Step 's3': timed out"));
    assert_eq!(outputs(&detail), vec!["in", "in", "half an answer"]);
}

#[tokio::test]
async fn failing_first_step_records_one_output() {
    let store = Arc::new(MemoryStore::new());
    let workflow = three_step_chain(&store).await;
    let transform = MockTransform::echo().failing_on("s1", "Gemini not configured: set GEMINI_API_KEY");

    let detail = finished(
        executor(&store, &transform)
            .submit(workflow.workflow.id, OWNER, "in")
            .await
            .expect("submitted"),
    );

    assert_eq!(detail.run.status, RunStatus::Failed);
    assert_eq!(detail.step_outputs.len(), 1);
    assert_eq!(detail.step_outputs[0].input_text, "in");
}

// ============================================================
// Submission
// ============================================================

#[tokio::test]
async fn invalid_graph_is_rejected_without_a_run() {
    let store = Arc::new(MemoryStore::new());
    let workflow = create(
        &store,
        vec![step("a", "START"), step("b", "START"), step("c", "END")],
        &[(0, 1), (1, 2)],
    )
    .await;
    let transform = MockTransform::echo();

    let outcome = executor(&store, &transform)
        .submit(workflow.workflow.id, OWNER, "in")
        .await
        .expect("submitted");

    match outcome {
        SubmitOutcome::Rejected(errors) => assert_eq!(errors, vec![START_COUNT]),
        SubmitOutcome::Finished(_) => panic!("expected rejection"),
    }
    assert_eq!(transform.call_count(), 0);
    assert!(store.list_runs(OWNER, 10).await.expect("listed").is_empty());
}

#[tokio::test]
async fn unknown_or_foreign_workflow_is_not_found() {
    let store = Arc::new(MemoryStore::new());
    let workflow = three_step_chain(&store).await;
    let transform = MockTransform::echo();
    let executor = executor(&store, &transform);

    let missing = Uuid::new_v4();
    assert!(matches!(
        executor.submit(missing, OWNER, "in").await,
        Err(EngineError::WorkflowNotFound(id)) if id == missing
    ));
    assert!(matches!(
        executor.submit(workflow.workflow.id, "someone-else", "in").await,
        Err(EngineError::WorkflowNotFound(_))
    ));
}

// ============================================================
// Runs created outside `submit`
// ============================================================

#[tokio::test]
async fn graph_without_start_fails_the_run_with_the_fault_text() {
    let store = Arc::new(MemoryStore::new());
    let workflow = create(&store, vec![step("a", "NORMAL"), step("b", "END")], &[(0, 1)]).await;
    let run = store
        .create_run(workflow.workflow.id, OWNER, "in")
        .await
        .expect("run created");
    let transform = MockTransform::echo();

    executor(&store, &transform).run(run.id).await.expect("recorded");

    let stored = store.get_run_with_outputs(run.id, OWNER).await.expect("run exists");
    assert_eq!(stored.run.status, "failed");
    assert_eq!(stored.run.error_message.as_deref(), Some("workflow has no START step"));
    assert!(stored.run.completed_at.is_some());
    assert!(stored.step_outputs.is_empty());
    assert_eq!(transform.call_count(), 0);
}

#[tokio::test]
async fn empty_workflow_fails_the_run() {
    let store = Arc::new(MemoryStore::new());
    let workflow = create(&store, vec![], &[]).await;
    let run = store
        .create_run(workflow.workflow.id, OWNER, "in")
        .await
        .expect("run created");
    let transform = MockTransform::echo();

    executor(&store, &transform).run(run.id).await.expect("recorded");

    let stored = store.get_run_with_outputs(run.id, OWNER).await.expect("run exists");
    assert_eq!(stored.run.status, "failed");
    assert_eq!(stored.run.error_message.as_deref(), Some(MISSING_WORKFLOW));
}

#[tokio::test]
async fn vanished_run_is_ignored() {
    let store = Arc::new(MemoryStore::new());
    let workflow = three_step_chain(&store).await;
    let run = store
        .create_run(workflow.workflow.id, OWNER, "in")
        .await
        .expect("run created");
    store
        .delete_workflow(workflow.workflow.id, OWNER)
        .await
        .expect("deleted");
    let transform = MockTransform::echo();

    executor(&store, &transform).run(run.id).await.expect("nothing to do");

    assert_eq!(transform.call_count(), 0);
    assert!(store.get_run(run.id).await.is_err());
}

#[tokio::test]
async fn concurrent_runs_keep_separate_traces() {
    let store = Arc::new(MemoryStore::new());
    let workflow = three_step_chain(&store).await;
    let transform = MockTransform::uppercase();
    let executor = executor(&store, &transform);

    let (a, b) = tokio::join!(
        executor.submit(workflow.workflow.id, OWNER, "one"),
        executor.submit(workflow.workflow.id, OWNER, "two"),
    );
    let a = finished(a.expect("submitted"));
    let b = finished(b.expect("submitted"));

    assert_eq!(outputs(&a), vec!["ONE", "ONE", "ONE"]);
    assert_eq!(outputs(&b), vec!["TWO", "TWO", "TWO"]);
    assert_ne!(a.run.id, b.run.id);
}

// ============================================================
// Run lifecycle
// ============================================================

#[tokio::test]
async fn finished_run_is_not_executed_again() {
    let store = Arc::new(MemoryStore::new());
    let workflow = three_step_chain(&store).await;
    let transform = MockTransform::uppercase();
    let executor = executor(&store, &transform);

    let first = finished(
        executor
            .submit(workflow.workflow.id, OWNER, "hello")
            .await
            .expect("submitted"),
    );
    assert_eq!(transform.call_count(), 3);

    executor.run(first.run.id).await.expect("ignored");

    let stored = store.get_run_with_outputs(first.run.id, OWNER).await.expect("run exists");
    assert_eq!(transform.call_count(), 3);
    assert_eq!(stored.step_outputs.len(), 3);
    assert_eq!(stored.run.status, "completed");
    assert_eq!(stored.run.completed_at, first.run.completed_at);
}

#[tokio::test]
async fn failed_run_stays_failed() {
    let store = Arc::new(MemoryStore::new());
    let workflow = three_step_chain(&store).await;
    let transform = MockTransform::uppercase().failing_on("s2", "rate limited");
    let executor = executor(&store, &transform);

    let first = finished(
        executor
            .submit(workflow.workflow.id, OWNER, "hello")
            .await
            .expect("submitted"),
    );
    assert_eq!(first.run.status, RunStatus::Failed);

    executor.run(first.run.id).await.expect("ignored");

    let stored = store.get_run_with_outputs(first.run.id, OWNER).await.expect("run exists");
    assert_eq!(stored.run.status, "failed");
    assert_eq!(stored.step_outputs.len(), 2);
    assert_eq!(transform.call_count(), 2);
}

#[tokio::test]
async fn running_run_is_left_to_its_executor() {
    let store = Arc::new(MemoryStore::new());
    let workflow = three_step_chain(&store).await;
    let run = store
        .create_run(workflow.workflow.id, OWNER, "in")
        .await
        .expect("run created");
    store
        .update_run_status(run.id, RunStatus::Running)
        .await
        .expect("marked running");
    let transform = MockTransform::echo();

    executor(&store, &transform).run(run.id).await.expect("ignored");

    let stored = store.get_run_with_outputs(run.id, OWNER).await.expect("run exists");
    assert_eq!(stored.run.status, "running");
    assert!(stored.step_outputs.is_empty());
    assert_eq!(transform.call_count(), 0);
}

/// Snapshot of the stored run taken while a step executes.
#[derive(Debug, Clone, PartialEq)]
struct Seen {
    step: String,
    status: String,
    outputs: usize,
    completed: bool,
}

/// Transform that reads the run back from the store on every call.
struct Watcher {
    store: Arc<MemoryStore>,
    run_id: Uuid,
    seen: Mutex<Vec<Seen>>,
}

#[async_trait]
impl StepTransform for Watcher {
    async fn transform(&self, request: TransformRequest<'_>) -> TransformOutcome {
        let stored = self
            .store
            .get_run_with_outputs(self.run_id, OWNER)
            .await
            .expect("run readable mid-flight");
        self.seen.lock().unwrap().push(Seen {
            step: request.step_name.to_string(),
            status: stored.run.status,
            outputs: stored.step_outputs.len(),
            completed: stored.run.completed_at.is_some(),
        });
        TransformOutcome::success(request.input.to_uppercase())
    }
}

#[tokio::test]
async fn readers_see_running_before_steps_and_final_output_only_with_completion() {
    let store = Arc::new(MemoryStore::new());
    let workflow = three_step_chain(&store).await;
    let run = store
        .create_run(workflow.workflow.id, OWNER, "hello")
        .await
        .expect("run created");
    let watcher = Arc::new(Watcher {
        store: store.clone(),
        run_id: run.id,
        seen: Mutex::new(Vec::new()),
    });

    WorkflowExecutor::new(store.clone(), watcher.clone())
        .run(run.id)
        .await
        .expect("executed");

    let seen = watcher.seen.lock().unwrap().clone();
    let expected: Vec<Seen> = ["s1", "s2", "s3"]
        .iter()
        .enumerate()
        .map(|(n, step)| Seen {
            step: step.to_string(),
            status: "running".into(),
            outputs: n,
            completed: false,
        })
        .collect();
    assert_eq!(seen, expected);

    let stored = store.get_run_with_outputs(run.id, OWNER).await.expect("run exists");
    assert_eq!(stored.run.status, "completed");
    assert_eq!(stored.step_outputs.len(), 3);
}
