use serde_json::Value;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};
use time::PrimitiveDateTime;

use crate::db::types::SubmissionStatus;

use super::types::CompletionUpdate;

/// Conditional `pending|failed -> processing`. `None` when nothing matched.
pub(crate) async fn begin_processing(
    pool: &PgPool,
    submission_id: &str,
    started_at: PrimitiveDateTime,
) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "UPDATE submissions
         SET status = $1,
             evaluation_started_at = $2,
             evaluation_completed_at = NULL,
             error_details = NULL,
             updated_at = $2
         WHERE id = $3 AND status IN ($4, $5)
         RETURNING id",
    )
    .bind(SubmissionStatus::Processing)
    .bind(started_at)
    .bind(submission_id)
    .bind(SubmissionStatus::Pending)
    .bind(SubmissionStatus::Failed)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn mark_failed(
    pool: &PgPool,
    submission_id: &str,
    error_details: Value,
    failed_at: PrimitiveDateTime,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE submissions
         SET status = $1,
             error_details = $2,
             evaluation_completed_at = $3,
             updated_at = $3
         WHERE id = $4 AND status = $5",
    )
    .bind(SubmissionStatus::Failed)
    .bind(Json(error_details))
    .bind(failed_at)
    .bind(submission_id)
    .bind(SubmissionStatus::Processing)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Runs inside the completion transaction.
pub(crate) async fn mark_completed(
    conn: &mut PgConnection,
    submission_id: &str,
    params: CompletionUpdate<'_>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE submissions
         SET status = $1,
             detected_variant = $2,
             student_name = $3,
             error_details = NULL,
             evaluation_completed_at = $4,
             updated_at = $4
         WHERE id = $5 AND status = $6",
    )
    .bind(SubmissionStatus::Completed)
    .bind(params.detected_variant)
    .bind(params.student_name)
    .bind(params.completed_at)
    .bind(submission_id)
    .bind(SubmissionStatus::Processing)
    .execute(conn)
    .await?;

    Ok(result.rows_affected())
}

pub(crate) async fn fail_stale_processing(
    pool: &PgPool,
    started_before: PrimitiveDateTime,
    error_details: Value,
    failed_at: PrimitiveDateTime,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "UPDATE submissions
         SET status = $1,
             error_details = $2,
             evaluation_completed_at = $3,
             updated_at = $3
         WHERE status = $4
           AND evaluation_started_at < $5
         RETURNING id",
    )
    .bind(SubmissionStatus::Failed)
    .bind(Json(error_details))
    .bind(failed_at)
    .bind(SubmissionStatus::Processing)
    .bind(started_before)
    .fetch_all(pool)
    .await
}
