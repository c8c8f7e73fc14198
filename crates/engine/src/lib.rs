//! `engine` crate: domain models, graph validation, execution ordering and
//! the run orchestrator.

pub mod models;
pub mod error;
pub mod dag;
pub mod executor;

pub use models::{Edge, Run, RunDetail, RunStatus, Step, StepOutput, StepRole, Workflow, WorkflowSummary};
pub use error::EngineError;
pub use dag::{execution_order, resolve_order, validate_graph, validate_workflow};
pub use executor::{SubmitOutcome, WorkflowExecutor};

#[cfg(test)]
mod executor_tests;
