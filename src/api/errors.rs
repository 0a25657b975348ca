use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::services::evaluation::EvaluationError;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: u16,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retryable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detected_content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    required: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    available: Option<u32>,
}

impl ErrorResponse {
    fn new(status: StatusCode, detail: String) -> Self {
        Self {
            status: status.as_u16(),
            detail,
            error_type: None,
            retryable: None,
            detected_content_type: None,
            required: None,
            available: None,
        }
    }
}

#[derive(Debug)]
pub(crate) enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    PaymentRequired { required: u32, available: u32 },
    /// The AI refused the images; resubmitting the same pages will not help.
    Unprocessable {
        error_type: &'static str,
        message: String,
        detected_content_type: Option<String>,
    },
    BadGateway { error_type: &'static str, message: String },
}

impl From<EvaluationError> for ApiError {
    fn from(err: EvaluationError) -> Self {
        match err {
            EvaluationError::Validation(message) => ApiError::BadRequest(message),
            EvaluationError::NotFound => ApiError::NotFound("Submission not found".to_string()),
            EvaluationError::Conflict => ApiError::Conflict(
                "Submission is already being processed or completed".to_string(),
            ),
            EvaluationError::InsufficientCredits { required, available } => {
                ApiError::PaymentRequired { required, available }
            }
            EvaluationError::InappropriateContent { message, detected_content_type } => {
                ApiError::Unprocessable {
                    error_type: "inappropriate_content",
                    message,
                    detected_content_type,
                }
            }
            EvaluationError::UnsupportedFormat { message, detected_content_type } => {
                ApiError::Unprocessable {
                    error_type: "unsupported_test_format",
                    message,
                    detected_content_type,
                }
            }
            EvaluationError::TechnicalFailure { error_type, message } => {
                ApiError::BadGateway { error_type, message }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(message) => {
                let status = StatusCode::BAD_REQUEST;
                (status, ErrorResponse::new(status, message))
            }
            ApiError::NotFound(message) => {
                let status = StatusCode::NOT_FOUND;
                (status, ErrorResponse::new(status, message))
            }
            ApiError::Conflict(message) => {
                let status = StatusCode::CONFLICT;
                (status, ErrorResponse::new(status, message))
            }
            ApiError::PaymentRequired { required, available } => {
                let status = StatusCode::PAYMENT_REQUIRED;
                let detail =
                    format!("Insufficient credits: required {required}, available {available}");
                let body = ErrorResponse {
                    error_type: Some("insufficient_credits"),
                    retryable: Some(true),
                    required: Some(required),
                    available: Some(available),
                    ..ErrorResponse::new(status, detail)
                };
                (status, body)
            }
            ApiError::Unprocessable { error_type, message, detected_content_type } => {
                let status = StatusCode::UNPROCESSABLE_ENTITY;
                let body = ErrorResponse {
                    error_type: Some(error_type),
                    retryable: Some(false),
                    detected_content_type,
                    ..ErrorResponse::new(status, message)
                };
                (status, body)
            }
            ApiError::BadGateway { error_type, message } => {
                tracing::error!(error_type, error = %message, "Evaluation failed upstream");
                let status = StatusCode::BAD_GATEWAY;
                let body = ErrorResponse {
                    error_type: Some(error_type),
                    retryable: Some(true),
                    ..ErrorResponse::new(status, message)
                };
                (status, body)
            }
        };

        (status, Json(body)).into_response()
    }
}
