use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use engine::Step;

use super::workflows::WORKFLOW_NOT_FOUND;
use crate::dto::{AddStepRequest, UpdateStepRequest};
use crate::error::or_not_found;
use crate::extract::{ApiJson, OwnerId};
use crate::{ApiError, AppState};

const STEP_NOT_FOUND: &str = "Step not found";
const EDGE_NOT_FOUND: &str = "Edge not found";

pub async fn add(
    Path(workflow_id): Path<Uuid>,
    State(state): State<AppState>,
    OwnerId(owner): OwnerId,
    ApiJson(body): ApiJson<AddStepRequest>,
) -> Result<(StatusCode, Json<Step>), ApiError> {
    let row = state
        .store
        .add_step(workflow_id, &owner, body.into_insertion()?)
        .await
        .map_err(or_not_found(WORKFLOW_NOT_FOUND))?;
    state.cache.invalidate(workflow_id).await;

    Ok((StatusCode::CREATED, Json(Step::try_from(row)?)))
}

pub async fn update(
    Path((workflow_id, step_id)): Path<(Uuid, Uuid)>,
    State(state): State<AppState>,
    OwnerId(owner): OwnerId,
    ApiJson(body): ApiJson<UpdateStepRequest>,
) -> Result<Json<Step>, ApiError> {
    let row = state
        .store
        .update_step(workflow_id, step_id, &owner, body.into_patch()?)
        .await
        .map_err(or_not_found(STEP_NOT_FOUND))?;
    state.cache.invalidate(workflow_id).await;

    Ok(Json(Step::try_from(row)?))
}

pub async fn delete(
    Path((workflow_id, step_id)): Path<(Uuid, Uuid)>,
    State(state): State<AppState>,
    OwnerId(owner): OwnerId,
) -> Result<StatusCode, ApiError> {
    state
        .store
        .delete_step(workflow_id, step_id, &owner)
        .await
        .map_err(or_not_found(STEP_NOT_FOUND))?;
    state.cache.invalidate(workflow_id).await;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_edge(
    Path((workflow_id, edge_id)): Path<(Uuid, Uuid)>,
    State(state): State<AppState>,
    OwnerId(owner): OwnerId,
) -> Result<StatusCode, ApiError> {
    state
        .store
        .delete_edge(workflow_id, edge_id, &owner)
        .await
        .map_err(or_not_found(EDGE_NOT_FOUND))?;
    state.cache.invalidate(workflow_id).await;

    Ok(StatusCode::NO_CONTENT)
}
