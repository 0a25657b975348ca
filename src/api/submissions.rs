use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};

use crate::api::errors::ApiError;
use crate::core::state::AppState;
use crate::grading::types::EvaluationResult;
use crate::schemas::evaluation::EvaluationStatusResponse;
use crate::services::evaluation::EvaluationError;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/:submission_id/evaluate", post(evaluate_submission))
        .route("/:submission_id/status", get(evaluation_status))
        .route("/:submission_id/result", get(evaluation_result))
}

async fn evaluate_submission(
    Path(submission_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<EvaluationResult>, ApiError> {
    tracing::info!(submission_id, "Evaluation requested");
    let result = state.pipeline().evaluate(&submission_id).await?;
    Ok(Json(result))
}

async fn evaluation_status(
    Path(submission_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<EvaluationStatusResponse>, ApiError> {
    let status = state.pipeline().status(&submission_id).await?;
    Ok(Json(status.into()))
}

async fn evaluation_result(
    Path(submission_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<EvaluationResult>, ApiError> {
    let result = state.pipeline().result(&submission_id).await.map_err(|err| match err {
        EvaluationError::NotFound => {
            ApiError::NotFound("Evaluation result not found".to_string())
        }
        other => other.into(),
    })?;
    Ok(Json(result))
}

#[cfg(test)]
mod tests;
