//! Run and step-output repository functions.

use chrono::Utc;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::{
    DbError,
    models::{NewStepOutput, RunCompletion, RunRow, RunStatus, RunSummaryRow, RunWithOutputs, StepOutputRow},
};

const RUN_COLUMNS: &str =
    "id, workflow_id, owner_id, input_text, status, started_at, completed_at, error_message";
const OUTPUT_COLUMNS: &str = "id, run_id, step_id, seq, input_text, output_text, duration_ms";

// ---------------------------------------------------------------------------
// runs
// ---------------------------------------------------------------------------

/// Create a new run record in `pending` status.
pub async fn create_run(
    pool: &PgPool,
    workflow_id: Uuid,
    owner_id: &str,
    input_text: &str,
) -> Result<RunRow, DbError> {
    let row = sqlx::query_as::<_, RunRow>(&format!(
        r#"
        INSERT INTO runs (id, workflow_id, owner_id, input_text, status, started_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {RUN_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(workflow_id)
    .bind(owner_id)
    .bind(input_text)
    .bind(RunStatus::Pending.as_str())
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Fetch a run by id, regardless of owner.
pub async fn get_run(pool: &PgPool, run_id: Uuid) -> Result<RunRow, DbError> {
    sqlx::query_as::<_, RunRow>(&format!("SELECT {RUN_COLUMNS} FROM runs WHERE id = $1"))
        .bind(run_id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)
}

/// Fetch an owner's run together with its step outputs in execution order.
pub async fn get_run_with_outputs(
    pool: &PgPool,
    run_id: Uuid,
    owner_id: &str,
) -> Result<RunWithOutputs, DbError> {
    let run = sqlx::query_as::<_, RunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM runs WHERE id = $1 AND owner_id = $2"
    ))
    .bind(run_id)
    .bind(owner_id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    let step_outputs = sqlx::query_as::<_, StepOutputRow>(&format!(
        "SELECT {OUTPUT_COLUMNS} FROM step_outputs WHERE run_id = $1 ORDER BY seq"
    ))
    .bind(run_id)
    .fetch_all(pool)
    .await?;

    Ok(RunWithOutputs { run, step_outputs })
}

/// The owner's most recent runs, newest first, with their workflow names.
pub async fn list_runs(
    pool: &PgPool,
    owner_id: &str,
    limit: i64,
) -> Result<Vec<RunSummaryRow>, DbError> {
    let rows = sqlx::query_as::<_, RunSummaryRow>(
        r#"
        SELECT r.id, r.workflow_id, w.name AS workflow_name, r.input_text, r.status, r.started_at
        FROM runs r
        JOIN workflows w ON w.id = r.workflow_id
        WHERE r.owner_id = $1
        ORDER BY r.started_at DESC
        LIMIT $2
        "#,
    )
    .bind(owner_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Move a run forward to `status`, guarded on the state it must come from.
pub async fn update_run_status(
    pool: &PgPool,
    run_id: Uuid,
    status: RunStatus,
) -> Result<(), DbError> {
    let mut conn = pool.acquire().await?;

    let result = sqlx::query(
        "UPDATE runs SET status = $1 WHERE id = $2 AND ($3::text IS NULL OR status = $3)",
    )
    .bind(status.as_str())
    .bind(run_id)
    .bind(status.entered_from().map(|s| s.as_str()))
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(rejected_transition(&mut conn, run_id, status).await);
    }
    Ok(())
}

/// Write the run's terminal state and its last step output atomically.
///
/// The run must still be `running`; otherwise nothing is written.
pub async fn complete_run(pool: &PgPool, completion: RunCompletion) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        r#"
        UPDATE runs
        SET status = $1, error_message = $2, completed_at = $3
        WHERE id = $4 AND ($5::text IS NULL OR status = $5)
        "#,
    )
    .bind(completion.status.as_str())
    .bind(&completion.error_message)
    .bind(completion.completed_at)
    .bind(completion.run_id)
    .bind(completion.status.entered_from().map(|s| s.as_str()))
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(rejected_transition(&mut tx, completion.run_id, completion.status).await);
    }

    if let Some(output) = &completion.final_output {
        insert_output(&mut tx, output).await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Explain why a guarded status update matched no row.
async fn rejected_transition(conn: &mut PgConnection, run_id: Uuid, to: RunStatus) -> DbError {
    let current = sqlx::query_scalar::<_, String>("SELECT status FROM runs WHERE id = $1")
        .bind(run_id)
        .fetch_optional(&mut *conn)
        .await;

    match current {
        Ok(Some(from)) => DbError::InvalidTransition { run_id, from, to },
        Ok(None) => DbError::NotFound,
        Err(e) => e.into(),
    }
}

// ---------------------------------------------------------------------------
// step_outputs
// ---------------------------------------------------------------------------

/// Append one step output to its run.
pub async fn insert_step_output(
    pool: &PgPool,
    output: &NewStepOutput,
) -> Result<StepOutputRow, DbError> {
    let mut conn = pool.acquire().await?;
    insert_output(&mut conn, output).await
}

async fn insert_output(
    conn: &mut PgConnection,
    output: &NewStepOutput,
) -> Result<StepOutputRow, DbError> {
    let row = sqlx::query_as::<_, StepOutputRow>(&format!(
        r#"
        INSERT INTO step_outputs (id, run_id, step_id, seq, input_text, output_text, duration_ms)
        SELECT $1, $2, $3, COALESCE(MAX(seq), 0) + 1, $4, $5, $6
        FROM step_outputs WHERE run_id = $2
        RETURNING {OUTPUT_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(output.run_id)
    .bind(output.step_id)
    .bind(&output.input_text)
    .bind(&output.output_text)
    .bind(output.duration_ms)
    .fetch_one(&mut *conn)
    .await?;

    Ok(row)
}
