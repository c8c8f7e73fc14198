use axum::{
    extract::{Path, Query, State},
    Json,
};
use tracing::info;
use uuid::Uuid;

use engine::{RunDetail, SubmitOutcome};

use crate::dto::{RunListItem, RunRequest, RunsQuery};
use crate::error::or_not_found;
use crate::extract::{ApiJson, OwnerId};
use crate::{ApiError, AppState};

/// Validate the workflow, then execute it to completion before answering.
pub async fn submit(
    Path(workflow_id): Path<Uuid>,
    State(state): State<AppState>,
    OwnerId(owner): OwnerId,
    ApiJson(body): ApiJson<RunRequest>,
) -> Result<Json<RunDetail>, ApiError> {
    body.check()?;

    match state.executor.submit(workflow_id, &owner, &body.input_text).await? {
        SubmitOutcome::Rejected(errors) => Err(ApiError::InvalidGraph(errors)),
        SubmitOutcome::Finished(detail) => {
            info!(run_id = %detail.run.id, status = %detail.run.status, "run submitted");
            Ok(Json(detail))
        }
    }
}

pub async fn list(
    State(state): State<AppState>,
    OwnerId(owner): OwnerId,
    Query(query): Query<RunsQuery>,
) -> Result<Json<Vec<RunListItem>>, ApiError> {
    let rows = state.store.list_runs(&owner, query.limit()).await?;
    Ok(Json(rows.into_iter().map(RunListItem::from).collect()))
}

pub async fn get(
    Path(run_id): Path<Uuid>,
    State(state): State<AppState>,
    OwnerId(owner): OwnerId,
) -> Result<Json<RunDetail>, ApiError> {
    let stored = state
        .store
        .get_run_with_outputs(run_id, &owner)
        .await
        .map_err(or_not_found("Run not found"))?;
    Ok(Json(RunDetail::try_from(stored)?))
}
