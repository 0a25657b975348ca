use anyhow::{Context, Result};
use serde_json::json;

use crate::core::time::{format_primitive, minutes_ago, primitive_now_utc};
use crate::services::evaluation::EvaluationPipeline;

/// Fails submissions left in `processing` longer than `stale_after_minutes`,
/// typically by a worker that died mid-evaluation. They become claimable
/// again.
pub(crate) async fn recover_stale_processing(
    pipeline: &EvaluationPipeline,
    stale_after_minutes: u64,
) -> Result<usize> {
    let now = primitive_now_utc();
    let details = json!({
        "error_type": "stale_processing",
        "message": format!("Evaluation did not finish within {stale_after_minutes} minutes"),
        "retryable": true,
        "occurred_at": format_primitive(now),
    });

    let recovered = pipeline
        .submissions()
        .fail_stale(minutes_ago(now, stale_after_minutes), details, now)
        .await
        .context("Failed to recover stale submissions")?;

    if !recovered.is_empty() {
        tracing::warn!(
            count = recovered.len(),
            submission_ids = ?recovered,
            "Recovered stale processing submissions"
        );
    }

    Ok(recovered.len())
}
