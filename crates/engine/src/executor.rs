//! Workflow execution engine.
//!
//! `WorkflowExecutor` drives a run through `pending → running → completed |
//! failed`:
//! 1. Loads the run and marks it `running` before any step executes.
//! 2. Loads the workflow and resolves the chain order from its START step.
//! 3. Feeds the accumulated text through each step's transform, recording a
//!    step output per executed step.
//! 4. Stops at the first failing step.
//! 5. Writes the last step output together with the terminal status, so a
//!    reader never sees every output but a run still `running`.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use db::models::{NewStepOutput, RunCompletion, RunRow, RunStatus};
use db::{DbError, Store};
use nodes::{StepTransform, TransformRequest};

use crate::dag::{execution_order, validate_workflow};
use crate::models::{RunDetail, Workflow};
use crate::EngineError;

/// Failure text for a run whose workflow disappeared or is empty.
pub const MISSING_WORKFLOW: &str = "Workflow not found or has no steps";

// ---------------------------------------------------------------------------
// Submission result
// ---------------------------------------------------------------------------

/// What happened to a submitted run.
#[derive(Debug)]
pub enum SubmitOutcome {
    /// The workflow graph is not executable; no run was created.
    Rejected(Vec<String>),
    /// The run was created and executed to a terminal state.
    Finished(RunDetail),
}

// ---------------------------------------------------------------------------
// WorkflowExecutor
// ---------------------------------------------------------------------------

/// Orchestrator shared by every run in the process.
///
/// Holds no per-run state; concurrent runs only meet in the store.
#[derive(Clone)]
pub struct WorkflowExecutor {
    store: Arc<dyn Store>,
    transform: Arc<dyn StepTransform>,
}

impl WorkflowExecutor {
    pub fn new(store: Arc<dyn Store>, transform: Arc<dyn StepTransform>) -> Self {
        Self { store, transform }
    }

    /// Validate the owner's workflow, then create a run and execute it.
    ///
    /// # Errors
    /// [`EngineError::WorkflowNotFound`] if the owner has no such workflow;
    /// persistence failures otherwise. A failing step is not an error: it is
    /// reported in the returned run.
    pub async fn submit(
        &self,
        workflow_id: Uuid,
        owner_id: &str,
        input_text: &str,
    ) -> Result<SubmitOutcome, EngineError> {
        let workflow: Workflow = match self.store.get_workflow(workflow_id, owner_id).await {
            Ok(graph) => graph.try_into()?,
            Err(DbError::NotFound) => return Err(EngineError::WorkflowNotFound(workflow_id)),
            Err(e) => return Err(e.into()),
        };

        let errors = validate_workflow(&workflow);
        if !errors.is_empty() {
            info!(%workflow_id, defects = errors.len(), "run rejected: workflow graph is invalid");
            return Ok(SubmitOutcome::Rejected(errors));
        }

        let run = self.store.create_run(workflow_id, owner_id, input_text).await?;
        self.run(run.id).await?;

        let detail = match self.store.get_run_with_outputs(run.id, owner_id).await {
            Ok(detail) => detail,
            Err(DbError::NotFound) => return Err(EngineError::RunNotFound(run.id)),
            Err(e) => return Err(e.into()),
        };
        Ok(SubmitOutcome::Finished(detail.try_into()?))
    }

    /// Execute a previously created run to a terminal state.
    ///
    /// Only a `pending` run is executed; a run that is already running or
    /// finished is left untouched. Internal faults met while executing are
    /// recorded as a failed run with the fault's text; only a persistence
    /// failure while recording that is returned.
    #[instrument(skip_all, fields(run_id = %run_id))]
    pub async fn run(&self, run_id: Uuid) -> Result<(), EngineError> {
        let run = match self.store.get_run(run_id).await {
            Ok(run) => run,
            Err(DbError::NotFound) => {
                warn!("run no longer exists; nothing to execute");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let status = run
            .status
            .parse::<RunStatus>()
            .map_err(|message| EngineError::InvalidStatus { run_id, message })?;
        if status != RunStatus::Pending {
            if status.is_terminal() {
                warn!(%status, "run already finished; not executing again");
            } else {
                warn!(%status, "run already picked up by another executor");
            }
            return Ok(());
        }

        match self.store.update_run_status(run.id, RunStatus::Running).await {
            Ok(()) => {}
            Err(DbError::InvalidTransition { from, .. }) => {
                warn!(%from, "run left pending before it could start");
                return Ok(());
            }
            Err(DbError::NotFound) => {
                warn!("run was deleted before it could start");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        let terminal = match self.execute(&run).await {
            Ok(terminal) => terminal,
            Err(fault) => {
                error!(error = %fault, "run aborted by internal fault");
                completion(run.id, Some(fault.to_string()), None)
            }
        };

        let status = terminal.status;
        match self.store.complete_run(terminal).await {
            Ok(()) => {
                info!(%status, "run finished");
                Ok(())
            }
            Err(DbError::NotFound) => {
                warn!("run was deleted while executing");
                Ok(())
            }
            Err(DbError::InvalidTransition { from, .. }) => {
                warn!(%from, "run changed state while executing; result discarded");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Walk the chain and build the terminal write.
    ///
    /// Every step output but the last is persisted as soon as the next step
    /// starts; the last one travels in the returned completion.
    async fn execute(&self, run: &RunRow) -> Result<RunCompletion, EngineError> {
        let graph = match self.store.load_workflow(run.workflow_id).await {
            Ok(graph) if !graph.steps.is_empty() => graph,
            Ok(_) | Err(DbError::NotFound) => {
                warn!(workflow_id = %run.workflow_id, "workflow missing or empty; failing run");
                return Ok(completion(run.id, Some(MISSING_WORKFLOW.to_string()), None));
            }
            Err(e) => return Err(e.into()),
        };

        let workflow = Workflow::try_from(graph)?;
        let order = execution_order(&workflow.steps, &workflow.edges)?;
        info!(steps = order.len(), "executing workflow '{}'", workflow.name);

        let mut text = run.input_text.clone();
        let mut pending: Option<NewStepOutput> = None;
        let mut failure = None;

        for step in order {
            if let Some(done) = pending.take() {
                self.store.insert_step_output(done).await?;
            }

            let started = Instant::now();
            let outcome = self
                .transform
                .transform(TransformRequest {
                    step_name: &step.name,
                    description: &step.description,
                    input: &text,
                    role: step.role,
                })
                .await;
            let duration_ms = round_ms(started.elapsed().as_secs_f64() * 1000.0);

            let input_text = std::mem::take(&mut text);
            let output_text = match outcome.error {
                None => {
                    info!(step = %step.name, duration_ms, "step succeeded");
                    text = outcome.output.clone();
                    outcome.output
                }
                Some(err) => {
                    warn!(step = %step.name, duration_ms, error = %err, "step failed");
                    failure = Some(format!("Step '{}': {}", step.name, err));
                    if outcome.output.is_empty() { err } else { outcome.output }
                }
            };

            pending = Some(NewStepOutput {
                run_id: run.id,
                step_id: step.id,
                input_text,
                output_text,
                duration_ms,
            });

            if failure.is_some() {
                break;
            }
        }

        Ok(completion(run.id, failure, pending))
    }
}

/// Terminal write for `run_id`: failed when there is an error message.
fn completion(
    run_id: Uuid,
    error_message: Option<String>,
    final_output: Option<NewStepOutput>,
) -> RunCompletion {
    let status = if error_message.is_some() { RunStatus::Failed } else { RunStatus::Completed };
    RunCompletion {
        run_id,
        status,
        error_message,
        completed_at: Utc::now(),
        final_output,
    }
}

fn round_ms(ms: f64) -> f64 {
    (ms * 100.0).round() / 100.0
}
