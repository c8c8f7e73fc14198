//! Offline validation of a workflow definition file.
//!
//! The file uses the same shape as the create-workflow request body: a list
//! of steps and edges addressed by index into that list.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use db::models::IndexEdge;
use engine::{resolve_order, validate_graph, StepRole};

#[derive(Debug, Deserialize)]
pub struct DraftStep {
    pub name: String,
    pub role: StepRole,
}

#[derive(Debug, Deserialize)]
pub struct WorkflowFile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub steps: Vec<DraftStep>,
    #[serde(default)]
    pub edges: Vec<IndexEdge>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Step names in execution order.
    Valid(Vec<String>),
    Invalid(Vec<String>),
}

pub fn read(path: &Path) -> anyhow::Result<WorkflowFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("invalid workflow JSON in {}", path.display()))
}

pub fn check(file: &WorkflowFile) -> anyhow::Result<Verdict> {
    let ids: Vec<usize> = (0..file.steps.len()).collect();
    let roles: HashMap<usize, StepRole> =
        file.steps.iter().enumerate().map(|(i, s)| (i, s.role)).collect();
    let edges: Vec<(usize, usize)> = file
        .edges
        .iter()
        .filter(|e| e.source_index < ids.len() && e.target_index < ids.len())
        .map(|e| (e.source_index, e.target_index))
        .collect();

    let errors = validate_graph(&ids, &roles, &edges);
    if !errors.is_empty() {
        return Ok(Verdict::Invalid(errors));
    }

    let order = resolve_order(&ids, &roles, &edges)?;
    Ok(Verdict::Valid(
        order.into_iter().map(|i| file.steps[i].name.clone()).collect(),
    ))
}
