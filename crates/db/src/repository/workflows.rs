//! Workflow CRUD operations, including whole-graph writes.

use chrono::Utc;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::{
    DbError,
    models::{EdgeRow, GraphDraft, NewWorkflow, StepRow, WorkflowGraph, WorkflowPatch, WorkflowRow},
};

const WORKFLOW_COLUMNS: &str = "id, owner_id, name, description, created_at";
pub(crate) const STEP_COLUMNS: &str = "id, workflow_id, ordinal, name, description, role, position";
pub(crate) const EDGE_COLUMNS: &str = "id, workflow_id, source_step_id, target_step_id";

/// Insert a workflow and its whole graph in one transaction.
pub async fn create_workflow(pool: &PgPool, new: NewWorkflow) -> Result<WorkflowGraph, DbError> {
    let id = Uuid::new_v4();
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO workflows (id, owner_id, name, description, created_at)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(id)
    .bind(&new.owner_id)
    .bind(&new.name)
    .bind(&new.description)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await?;

    insert_graph(&mut tx, id, &new.graph).await?;
    let graph = load_graph(&mut tx, id, None).await?;
    tx.commit().await?;

    Ok(graph)
}

/// Fetch a workflow with its steps and edges.
///
/// When `owner_id` is given, a workflow owned by someone else is reported as
/// [`DbError::NotFound`].
pub async fn get_workflow(
    pool: &PgPool,
    id: Uuid,
    owner_id: Option<&str>,
) -> Result<WorkflowGraph, DbError> {
    let mut conn = pool.acquire().await?;
    load_graph(&mut conn, id, owner_id).await
}

/// Return the owner's workflows, newest first.
pub async fn list_workflows(pool: &PgPool, owner_id: &str) -> Result<Vec<WorkflowRow>, DbError> {
    let rows = sqlx::query_as::<_, WorkflowRow>(&format!(
        "SELECT {WORKFLOW_COLUMNS} FROM workflows WHERE owner_id = $1 ORDER BY created_at DESC"
    ))
    .bind(owner_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Apply `patch`. A supplied graph replaces every step and edge, which
/// cascades to the step outputs recorded against the old steps.
pub async fn update_workflow(
    pool: &PgPool,
    id: Uuid,
    owner_id: &str,
    patch: WorkflowPatch,
) -> Result<WorkflowGraph, DbError> {
    let mut tx = pool.begin().await?;
    fetch_owned(&mut tx, id, owner_id).await?;

    sqlx::query(
        r#"
        UPDATE workflows
        SET name = COALESCE($1, name), description = COALESCE($2, description)
        WHERE id = $3
        "#,
    )
    .bind(patch.name)
    .bind(patch.description)
    .bind(id)
    .execute(&mut *tx)
    .await?;

    if let Some(graph) = patch.graph {
        sqlx::query("DELETE FROM edges WHERE workflow_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM steps WHERE workflow_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        insert_graph(&mut tx, id, &graph).await?;
    }

    let graph = load_graph(&mut tx, id, None).await?;
    tx.commit().await?;
    Ok(graph)
}

/// Permanently delete a workflow; steps, edges and runs go with it.
///
/// Returns `DbError::NotFound` if no row was deleted.
pub async fn delete_workflow(pool: &PgPool, id: Uuid, owner_id: &str) -> Result<(), DbError> {
    let result = sqlx::query("DELETE FROM workflows WHERE id = $1 AND owner_id = $2")
        .bind(id)
        .bind(owner_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// helpers shared with the step repository
// ---------------------------------------------------------------------------

/// Fetch the header row, scoped to `owner_id`.
pub(crate) async fn fetch_owned(
    conn: &mut PgConnection,
    id: Uuid,
    owner_id: &str,
) -> Result<WorkflowRow, DbError> {
    sqlx::query_as::<_, WorkflowRow>(&format!(
        "SELECT {WORKFLOW_COLUMNS} FROM workflows WHERE id = $1 AND owner_id = $2"
    ))
    .bind(id)
    .bind(owner_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(DbError::NotFound)
}

async fn load_graph(
    conn: &mut PgConnection,
    id: Uuid,
    owner_id: Option<&str>,
) -> Result<WorkflowGraph, DbError> {
    let workflow = sqlx::query_as::<_, WorkflowRow>(&format!(
        "SELECT {WORKFLOW_COLUMNS} FROM workflows WHERE id = $1 AND ($2::text IS NULL OR owner_id = $2)"
    ))
    .bind(id)
    .bind(owner_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(DbError::NotFound)?;

    let steps = sqlx::query_as::<_, StepRow>(&format!(
        "SELECT {STEP_COLUMNS} FROM steps WHERE workflow_id = $1 ORDER BY ordinal"
    ))
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    let edges = sqlx::query_as::<_, EdgeRow>(&format!(
        "SELECT {EDGE_COLUMNS} FROM edges WHERE workflow_id = $1"
    ))
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(WorkflowGraph { workflow, steps, edges })
}

async fn insert_graph(
    conn: &mut PgConnection,
    workflow_id: Uuid,
    graph: &GraphDraft,
) -> Result<(), DbError> {
    let mut step_ids = Vec::with_capacity(graph.steps.len());

    for (ordinal, step) in graph.steps.iter().enumerate() {
        let step_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO steps (id, workflow_id, ordinal, name, description, role, position)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(step_id)
        .bind(workflow_id)
        .bind(ordinal as i32)
        .bind(&step.name)
        .bind(&step.description)
        .bind(&step.role)
        .bind(&step.position)
        .execute(&mut *conn)
        .await?;
        step_ids.push(step_id);
    }

    for edge in graph.resolved_edges() {
        insert_edge(
            &mut *conn,
            workflow_id,
            step_ids[edge.source_index],
            step_ids[edge.target_index],
        )
        .await?;
    }

    Ok(())
}

pub(crate) async fn insert_edge(
    conn: &mut PgConnection,
    workflow_id: Uuid,
    source_step_id: Uuid,
    target_step_id: Uuid,
) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO edges (id, workflow_id, source_step_id, target_step_id)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(workflow_id)
    .bind(source_step_id)
    .bind(target_step_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}
