use anyhow::{Context, Result};

use crate::services::evaluation::{EvaluationError, EvaluationPipeline};

/// Evaluates the oldest pending submission this worker manages to claim.
///
/// Up to `batch` candidates are tried in order. Losing a claim to another
/// worker or an API caller moves on to the next candidate. Returns the id
/// that was evaluated, whatever its outcome, or `None` when nothing was
/// claimed.
pub(crate) async fn evaluate_next_pending(
    pipeline: &EvaluationPipeline,
    batch: i64,
) -> Result<Option<String>> {
    let candidates = pipeline
        .submissions()
        .list_pending(batch)
        .await
        .context("Failed to list pending submissions")?;

    for submission_id in candidates {
        match pipeline.evaluate(&submission_id).await {
            Ok(result) => {
                tracing::debug!(
                    submission_id,
                    final_grade = result.final_grade,
                    "Worker evaluation completed"
                );
            }
            Err(EvaluationError::Conflict | EvaluationError::NotFound) => {
                tracing::debug!(submission_id, "Submission claimed elsewhere; skipping");
                continue;
            }
            Err(err) => {
                tracing::warn!(
                    submission_id,
                    error_type = err.error_type(),
                    retryable = err.retryable(),
                    error = %err,
                    "Worker evaluation ended without a result"
                );
            }
        }
        return Ok(Some(submission_id));
    }

    Ok(None)
}
