//! Step- and edge-level edits on an existing workflow.

use sqlx::PgPool;
use uuid::Uuid;

use super::workflows::{fetch_owned, insert_edge, STEP_COLUMNS};
use crate::{
    DbError,
    models::{StepInsertion, StepPatch, StepRow},
};

/// Append a step and wire it to its neighbours when requested.
///
/// Both neighbour ids must be steps of the same workflow, otherwise
/// [`DbError::InvalidReference`] is returned and nothing is written.
pub async fn add_step(
    pool: &PgPool,
    workflow_id: Uuid,
    owner_id: &str,
    insertion: StepInsertion,
) -> Result<StepRow, DbError> {
    let mut tx = pool.begin().await?;
    fetch_owned(&mut tx, workflow_id, owner_id).await?;

    let existing: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM steps WHERE workflow_id = $1")
        .bind(workflow_id)
        .fetch_all(&mut *tx)
        .await?;

    for (field, neighbour) in [
        ("insert_after_step_id", insertion.insert_after),
        ("insert_before_step_id", insertion.insert_before),
    ] {
        if let Some(id) = neighbour {
            if !existing.contains(&id) {
                return Err(DbError::InvalidReference(format!(
                    "{field} must be a step ID in this workflow"
                )));
            }
        }
    }

    let step = sqlx::query_as::<_, StepRow>(&format!(
        r#"
        INSERT INTO steps (id, workflow_id, ordinal, name, description, role, position)
        SELECT $1, $2, COALESCE(MAX(ordinal) + 1, 0), $3, $4, $5, $6
        FROM steps WHERE workflow_id = $2
        RETURNING {STEP_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(workflow_id)
    .bind(&insertion.step.name)
    .bind(&insertion.step.description)
    .bind(&insertion.step.role)
    .bind(&insertion.step.position)
    .fetch_one(&mut *tx)
    .await?;

    if let Some(after) = insertion.insert_after {
        insert_edge(&mut tx, workflow_id, after, step.id).await?;
    }
    if let Some(before) = insertion.insert_before {
        insert_edge(&mut tx, workflow_id, step.id, before).await?;
    }

    tx.commit().await?;
    Ok(step)
}

/// Apply a partial update to one step.
pub async fn update_step(
    pool: &PgPool,
    workflow_id: Uuid,
    step_id: Uuid,
    owner_id: &str,
    patch: StepPatch,
) -> Result<StepRow, DbError> {
    let mut tx = pool.begin().await?;
    fetch_owned(&mut tx, workflow_id, owner_id).await?;

    let step = sqlx::query_as::<_, StepRow>(&format!(
        r#"
        UPDATE steps
        SET name        = COALESCE($1, name),
            description = COALESCE($2, description),
            role        = COALESCE($3, role),
            position    = COALESCE($4, position)
        WHERE id = $5 AND workflow_id = $6
        RETURNING {STEP_COLUMNS}
        "#
    ))
    .bind(patch.name)
    .bind(patch.description)
    .bind(patch.role)
    .bind(patch.position)
    .bind(step_id)
    .bind(workflow_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(DbError::NotFound)?;

    tx.commit().await?;
    Ok(step)
}

/// Delete one step. Its edges and step outputs are removed by cascade.
pub async fn delete_step(
    pool: &PgPool,
    workflow_id: Uuid,
    step_id: Uuid,
    owner_id: &str,
) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;
    fetch_owned(&mut tx, workflow_id, owner_id).await?;

    let result = sqlx::query("DELETE FROM steps WHERE id = $1 AND workflow_id = $2")
        .bind(step_id)
        .bind(workflow_id)
        .execute(&mut *tx)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    tx.commit().await?;
    Ok(())
}

/// Delete one edge.
pub async fn delete_edge(
    pool: &PgPool,
    workflow_id: Uuid,
    edge_id: Uuid,
    owner_id: &str,
) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;
    fetch_owned(&mut tx, workflow_id, owner_id).await?;

    let result = sqlx::query("DELETE FROM edges WHERE id = $1 AND workflow_id = $2")
        .bind(edge_id)
        .bind(workflow_id)
        .execute(&mut *tx)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    tx.commit().await?;
    Ok(())
}
