use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::info;
use uuid::Uuid;

use engine::{validate_workflow, Workflow, WorkflowSummary};

use crate::dto::{CreateWorkflowRequest, UpdateWorkflowRequest, ValidateResponse};
use crate::error::or_not_found;
use crate::extract::{ApiJson, OwnerId};
use crate::{ApiError, AppState};

pub(crate) const WORKFLOW_NOT_FOUND: &str = "Workflow not found";

/// Owner-scoped read through the workflow cache.
pub(crate) async fn load(state: &AppState, id: Uuid, owner: &str) -> Result<Workflow, ApiError> {
    if let Some(cached) = state.cache.get::<Workflow>(id, owner).await {
        return Ok(cached);
    }

    let ticket = state.cache.ticket();
    let graph = state
        .store
        .get_workflow(id, owner)
        .await
        .map_err(or_not_found(WORKFLOW_NOT_FOUND))?;
    let workflow = Workflow::try_from(graph)?;

    state.cache.set_fresh(id, owner, &workflow, ticket).await;
    Ok(workflow)
}

pub async fn list(
    State(state): State<AppState>,
    OwnerId(owner): OwnerId,
) -> Result<Json<Vec<WorkflowSummary>>, ApiError> {
    let rows = state.store.list_workflows(&owner).await?;
    Ok(Json(rows.into_iter().map(WorkflowSummary::from).collect()))
}

pub async fn create(
    State(state): State<AppState>,
    OwnerId(owner): OwnerId,
    ApiJson(body): ApiJson<CreateWorkflowRequest>,
) -> Result<(StatusCode, Json<Workflow>), ApiError> {
    let graph = state.store.create_workflow(body.into_new_workflow(owner)?).await?;
    let workflow = Workflow::try_from(graph)?;

    info!(workflow_id = %workflow.id, steps = workflow.steps.len(), "workflow created");
    Ok((StatusCode::CREATED, Json(workflow)))
}

pub async fn get(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    OwnerId(owner): OwnerId,
) -> Result<Json<Workflow>, ApiError> {
    load(&state, id, &owner).await.map(Json)
}

pub async fn validate(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    OwnerId(owner): OwnerId,
) -> Result<Json<ValidateResponse>, ApiError> {
    let workflow = load(&state, id, &owner).await?;
    Ok(Json(validate_workflow(&workflow).into()))
}

pub async fn update(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    OwnerId(owner): OwnerId,
    ApiJson(body): ApiJson<UpdateWorkflowRequest>,
) -> Result<Json<Workflow>, ApiError> {
    let patch = body.into_patch()?;
    let replaces_graph = patch.graph.is_some();

    let graph = state
        .store
        .update_workflow(id, &owner, patch)
        .await
        .map_err(or_not_found(WORKFLOW_NOT_FOUND))?;
    state.cache.invalidate(id).await;

    info!(workflow_id = %id, replaces_graph, "workflow updated");
    Ok(Json(Workflow::try_from(graph)?))
}

pub async fn delete(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    OwnerId(owner): OwnerId,
) -> Result<StatusCode, ApiError> {
    state
        .store
        .delete_workflow(id, &owner)
        .await
        .map_err(or_not_found(WORKFLOW_NOT_FOUND))?;
    state.cache.invalidate(id).await;

    info!(workflow_id = %id, "workflow deleted");
    Ok(StatusCode::NO_CONTENT)
}
