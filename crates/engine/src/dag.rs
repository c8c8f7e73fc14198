//! Graph validation and execution ordering.
//!
//! A workflow is executable when it is a single chain: one START, one END
//! (unless it is a lone START step), every step with at most one incoming and
//! one outgoing edge, no cycles, and every step on the path from START to
//! END. [`validate_graph`] reports every broken rule as a readable message;
//! [`resolve_order`] turns a graph that passed into the visiting order.
//!
//! Both functions are generic over the step identifier so the same rules
//! apply to stored workflows (`Uuid`) and to drafts addressed by index.

use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;

use uuid::Uuid;

use crate::models::{Edge, Step, StepRole, Workflow};
use crate::EngineError;

pub const EMPTY_WORKFLOW: &str = "Workflow must have at least one step.";
pub const SINGLE_STEP_NOT_START: &str = "The single step must be a START step.";
pub const START_COUNT: &str = "Workflow must have exactly one START step.";
pub const END_COUNT: &str = "Workflow must have exactly one END step.";
pub const OUT_DEGREE: &str = "Each step may have only one outgoing connection (one edge from its output). Remove extra edges from the same step.";
pub const IN_DEGREE: &str = "Each step may have only one incoming connection (one edge to its input). Remove extra edges to the same step.";
pub const CYCLE: &str = "Workflow must not contain cycles (DAG required).";
pub const NO_CONNECTIONS: &str = "No connections between steps. Connect each step (drag from one step's output to another's input) and click Save.";
const DISCONNECTED: &str = "All steps must be connected (path from START to END through every step). ";

/// Check a workflow graph and return its defects, in a fixed order.
///
/// An empty result means the graph is executable. Duplicate step ids are
/// collapsed to their first occurrence and edges touching unknown ids are
/// ignored; neither is reported.
pub fn validate_graph<Id>(
    step_ids: &[Id],
    roles: &HashMap<Id, StepRole>,
    edges: &[(Id, Id)],
) -> Vec<String>
where
    Id: Copy + Eq + Hash,
{
    let mut known = HashSet::new();
    let ids: Vec<Id> = step_ids.iter().copied().filter(|id| known.insert(*id)).collect();

    if ids.is_empty() {
        return vec![EMPTY_WORKFLOW.to_string()];
    }

    let mut errors = Vec::new();

    // -----------------------------------------------------------------------
    // 1. Role cardinality
    // -----------------------------------------------------------------------
    let with_role = |role: StepRole| -> Vec<Id> {
        ids.iter().copied().filter(|id| roles.get(id) == Some(&role)).collect()
    };
    let starts = with_role(StepRole::Start);
    let ends = with_role(StepRole::End);

    if ids.len() == 1 {
        if starts.len() != 1 {
            errors.push(SINGLE_STEP_NOT_START.to_string());
        }
    } else {
        if starts.len() != 1 {
            errors.push(START_COUNT.to_string());
        }
        if ends.len() != 1 {
            errors.push(END_COUNT.to_string());
        }
    }

    // -----------------------------------------------------------------------
    // 2. Degree bounds, over edges whose endpoints are both known
    // -----------------------------------------------------------------------
    let in_scope: Vec<(Id, Id)> = edges
        .iter()
        .copied()
        .filter(|(source, target)| known.contains(source) && known.contains(target))
        .collect();

    let mut out_degree: HashMap<Id, usize> = HashMap::new();
    let mut in_degree: HashMap<Id, usize> = HashMap::new();
    let mut forward: HashMap<Id, Vec<Id>> = HashMap::new();
    let mut backward: HashMap<Id, Vec<Id>> = HashMap::new();

    for &(source, target) in &in_scope {
        *out_degree.entry(source).or_insert(0) += 1;
        *in_degree.entry(target).or_insert(0) += 1;
        forward.entry(source).or_default().push(target);
        backward.entry(target).or_default().push(source);
    }

    if out_degree.values().any(|&d| d > 1) {
        errors.push(OUT_DEGREE.to_string());
    }
    if in_degree.values().any(|&d| d > 1) {
        errors.push(IN_DEGREE.to_string());
    }

    // -----------------------------------------------------------------------
    // 3. Acyclicity
    // -----------------------------------------------------------------------
    if has_cycle(&ids, &forward) {
        errors.push(CYCLE.to_string());
    }

    // -----------------------------------------------------------------------
    // 4. Connectivity, only on an otherwise sound graph
    // -----------------------------------------------------------------------
    if let (true, Some(&start), Some(&end)) = (errors.is_empty(), starts.first(), ends.first()) {
        if in_scope.is_empty() {
            if ids.len() > 1 {
                errors.push(NO_CONNECTIONS.to_string());
            }
        } else {
            let from_start = reachable(start, &forward);
            let to_end = reachable(end, &backward);

            let mut parts = Vec::new();
            let unreachable = positions(&ids, roles, |id| !from_start.contains(id));
            if !unreachable.is_empty() {
                parts.push(format!("not reachable from START: {}", unreachable.join(", ")));
            }
            let dead_ends = positions(&ids, roles, |id| !to_end.contains(id));
            if !dead_ends.is_empty() {
                parts.push(format!("do not lead to END: {}", dead_ends.join(", ")));
            }

            if !parts.is_empty() {
                errors.push(format!("{DISCONNECTED}{}.", parts.join("; ")));
            }
        }
    }

    errors
}

/// Validate a stored workflow.
pub fn validate_workflow(workflow: &Workflow) -> Vec<String> {
    let (ids, roles, edges) = graph_parts(&workflow.steps, &workflow.edges);
    validate_graph(&ids, &roles, &edges)
}

/// Visiting order of a validated graph: breadth-first from the START step.
///
/// Each step is visited at most once and edges to unknown steps are skipped,
/// so an unvalidated graph still yields an order instead of looping.
///
/// # Errors
/// [`EngineError::NoStartStep`] if no step has the START role.
pub fn resolve_order<Id>(
    step_ids: &[Id],
    roles: &HashMap<Id, StepRole>,
    edges: &[(Id, Id)],
) -> Result<Vec<Id>, EngineError>
where
    Id: Copy + Eq + Hash,
{
    let start = step_ids
        .iter()
        .copied()
        .find(|id| roles.get(id) == Some(&StepRole::Start))
        .ok_or(EngineError::NoStartStep)?;

    let known: HashSet<Id> = step_ids.iter().copied().collect();
    let mut outgoing: HashMap<Id, Vec<Id>> = HashMap::new();
    for &(source, target) in edges {
        if known.contains(&source) && known.contains(&target) {
            outgoing.entry(source).or_default().push(target);
        }
    }

    let mut order = Vec::with_capacity(known.len());
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([start]);

    while let Some(id) = queue.pop_front() {
        if !seen.insert(id) {
            continue;
        }
        order.push(id);
        if let Some(next) = outgoing.get(&id) {
            queue.extend(next.iter().copied().filter(|n| !seen.contains(n)));
        }
    }

    Ok(order)
}

/// [`resolve_order`] over stored steps and edges.
pub fn execution_order<'a>(steps: &'a [Step], edges: &[Edge]) -> Result<Vec<&'a Step>, EngineError> {
    let (ids, roles, pairs) = graph_parts(steps, edges);
    let by_id: HashMap<Uuid, &Step> = steps.iter().map(|s| (s.id, s)).collect();

    Ok(resolve_order(&ids, &roles, &pairs)?
        .into_iter()
        .filter_map(|id| by_id.get(&id).copied())
        .collect())
}

type GraphParts = (Vec<Uuid>, HashMap<Uuid, StepRole>, Vec<(Uuid, Uuid)>);

fn graph_parts(steps: &[Step], edges: &[Edge]) -> GraphParts {
    (
        steps.iter().map(|s| s.id).collect(),
        steps.iter().map(|s| (s.id, s.role)).collect(),
        edges.iter().map(|e| (e.source_step_id, e.target_step_id)).collect(),
    )
}

/// Three-colour depth-first search; meeting a gray node closes a cycle.
fn has_cycle<Id>(ids: &[Id], forward: &HashMap<Id, Vec<Id>>) -> bool
where
    Id: Copy + Eq + Hash,
{
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Colour {
        White,
        Gray,
        Black,
    }

    let mut colour: HashMap<Id, Colour> = ids.iter().map(|&id| (id, Colour::White)).collect();

    for &root in ids {
        if colour.get(&root) != Some(&Colour::White) {
            continue;
        }

        colour.insert(root, Colour::Gray);
        // (node, index of the next child to visit)
        let mut stack = vec![(root, 0usize)];

        while let Some((node, next)) = stack.last_mut() {
            let node = *node;
            let child = forward.get(&node).and_then(|children| children.get(*next)).copied();

            match child {
                Some(child) => {
                    *next += 1;
                    match colour.get(&child).copied().unwrap_or(Colour::White) {
                        Colour::Gray => return true,
                        Colour::White => {
                            colour.insert(child, Colour::Gray);
                            stack.push((child, 0));
                        }
                        Colour::Black => {}
                    }
                }
                None => {
                    colour.insert(node, Colour::Black);
                    stack.pop();
                }
            }
        }
    }

    false
}

fn reachable<Id>(from: Id, adjacency: &HashMap<Id, Vec<Id>>) -> HashSet<Id>
where
    Id: Copy + Eq + Hash,
{
    let mut seen = HashSet::new();
    let mut stack = vec![from];

    while let Some(id) = stack.pop() {
        if !seen.insert(id) {
            continue;
        }
        if let Some(next) = adjacency.get(&id) {
            stack.extend(next.iter().copied().filter(|n| !seen.contains(n)));
        }
    }

    seen
}

/// `step N (ROLE)` labels, 1-based, for the steps matching `pick`.
fn positions<Id>(ids: &[Id], roles: &HashMap<Id, StepRole>, pick: impl Fn(&Id) -> bool) -> Vec<String>
where
    Id: Copy + Eq + Hash,
{
    ids.iter()
        .enumerate()
        .filter(|(_, id)| pick(*id))
        .map(|(i, id)| {
            let role = roles.get(id).map_or("?", |r| r.as_str());
            format!("step {} ({role})", i + 1)
        })
        .collect()
}
