use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};
use time::PrimitiveDateTime;

use crate::db::models::EvaluationResultRow;
use crate::grading::types::EvaluationResult;

const COLUMNS: &str = "\
    id, submission_id, total_questions, correct_answers, incorrect_answers, percentage_score, \
    final_grade, variant_used, detailed_answers, confidence_score, essay_analysis, created_at";

/// Insert-only: results are never updated. The unique `submission_id`
/// constraint rejects a second result for the same submission.
pub(crate) async fn insert(
    conn: &mut PgConnection,
    result: &EvaluationResult,
    created_at: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO evaluation_results (
            id, submission_id, total_questions, correct_answers, incorrect_answers,
            percentage_score, final_grade, variant_used, detailed_answers, confidence_score,
            essay_analysis, created_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
    )
    .bind(&result.id)
    .bind(&result.submission_id)
    .bind(int_column("total_questions", result.total_questions)?)
    .bind(int_column("correct_answers", result.correct_answers)?)
    .bind(int_column("incorrect_answers", result.incorrect_answers)?)
    .bind(i32::from(result.percentage_score))
    .bind(i32::from(result.final_grade))
    .bind(int_column("variant_used", result.variant_used)?)
    .bind(Json(&result.detailed_answers))
    .bind(result.confidence_score)
    .bind(result.essay_analysis.as_ref().map(Json))
    .bind(created_at)
    .execute(conn)
    .await?;

    Ok(())
}

pub(crate) async fn find_by_submission(
    pool: &PgPool,
    submission_id: &str,
) -> Result<Option<EvaluationResultRow>, sqlx::Error> {
    sqlx::query_as::<_, EvaluationResultRow>(&format!(
        "SELECT {COLUMNS}
         FROM evaluation_results
         WHERE submission_id = $1"
    ))
    .bind(submission_id)
    .fetch_optional(pool)
    .await
}

/// Counters are `INTEGER` columns; a value past `i32::MAX` is refused, not wrapped.
fn int_column(column: &str, value: u32) -> Result<i32, sqlx::Error> {
    i32::try_from(value)
        .map_err(|_| sqlx::Error::Encode(format!("{column} out of range: {value}").into()))
}
