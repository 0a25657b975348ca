use serde::Serialize;
use serde_json::Value;

use crate::core::time::format_primitive;
use crate::db::types::SubmissionStatus;
use crate::services::evaluation::EvaluationStatus;

#[derive(Debug, Serialize)]
pub(crate) struct EvaluationStatusResponse {
    pub(crate) submission_id: String,
    pub(crate) status: SubmissionStatus,
    pub(crate) started_at: Option<String>,
    pub(crate) completed_at: Option<String>,
    pub(crate) error_details: Option<Value>,
}

impl From<EvaluationStatus> for EvaluationStatusResponse {
    fn from(status: EvaluationStatus) -> Self {
        Self {
            submission_id: status.submission_id,
            status: status.status,
            started_at: status.started_at.map(format_primitive),
            completed_at: status.completed_at.map(format_primitive),
            error_details: status.error_details,
        }
    }
}
