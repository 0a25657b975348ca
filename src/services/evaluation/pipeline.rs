use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use serde_json::{json, Value};
use thiserror::Error;
use time::PrimitiveDateTime;
use uuid::Uuid;

use super::ports::{
    Completed, CreditLedger, LedgerError, ReferenceResolver, StoreError, SubmissionStore,
};
use crate::core::time::{format_primitive, primitive_now_utc};
use crate::db::types::SubmissionStatus;
use crate::db::models::Submission;
use crate::grading::calculator::{summarize_essay, GradeCalculator};
use crate::grading::errors::{AnalysisError, ValidationError};
use crate::grading::retry::AnalysisRetryExecutor;
use crate::grading::types::{
    AiAnalysisResult, AnalysisPayload, CheckConfig, CheckType, ContentError, ContentErrorKind,
    EvaluationResult, GradeSummary, ReferenceSet,
};
use crate::services::ai_analysis;

/// Outcome of `evaluate` other than a fresh result.
#[derive(Debug, Error)]
pub(crate) enum EvaluationError {
    #[error("{0}")]
    Validation(String),
    #[error("submission not found")]
    NotFound,
    #[error("submission is already being processed or completed")]
    Conflict,
    #[error("insufficient credits: required {required}, available {available}")]
    InsufficientCredits { required: u32, available: u32 },
    #[error("{message}")]
    InappropriateContent { message: String, detected_content_type: Option<String> },
    #[error("{message}")]
    UnsupportedFormat { message: String, detected_content_type: Option<String> },
    #[error("evaluation failed: {message}")]
    TechnicalFailure { error_type: &'static str, message: String },
}

impl EvaluationError {
    pub(crate) fn error_type(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::InsufficientCredits { .. } => "insufficient_credits",
            Self::InappropriateContent { .. } => ContentErrorKind::InappropriateContent.as_str(),
            Self::UnsupportedFormat { .. } => ContentErrorKind::UnsupportedTestFormat.as_str(),
            Self::TechnicalFailure { error_type, .. } => error_type,
        }
    }

    /// Whether calling `evaluate` again may succeed without changing the input.
    pub(crate) fn retryable(&self) -> bool {
        matches!(self, Self::TechnicalFailure { .. } | Self::InsufficientCredits { .. })
    }

    fn metric_label(&self) -> &'static str {
        match self {
            Self::InappropriateContent { .. } | Self::UnsupportedFormat { .. } => {
                "content_rejected"
            }
            Self::Conflict => "conflict",
            Self::InsufficientCredits { .. } => "insufficient_credits",
            Self::Validation(_) | Self::NotFound => "rejected",
            Self::TechnicalFailure { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct EvaluationStatus {
    pub(crate) submission_id: String,
    pub(crate) status: SubmissionStatus,
    pub(crate) started_at: Option<PrimitiveDateTime>,
    pub(crate) completed_at: Option<PrimitiveDateTime>,
    pub(crate) error_details: Option<Value>,
}

#[derive(Debug, Clone)]
pub(crate) struct PipelineOptions {
    pub(crate) model: String,
    pub(crate) temperature: f64,
    pub(crate) max_tokens: u32,
    pub(crate) credits_per_page: u32,
}

enum Graded {
    Result { result: EvaluationResult, detected_variant: Option<u32>, student_name: Option<String> },
    Rejected(ContentError),
}

#[derive(Clone)]
pub(crate) struct EvaluationPipeline {
    submissions: Arc<dyn SubmissionStore>,
    references: Arc<dyn ReferenceResolver>,
    ledger: Arc<dyn CreditLedger>,
    executor: AnalysisRetryExecutor,
    options: PipelineOptions,
}

impl EvaluationPipeline {
    pub(crate) fn new(
        submissions: Arc<dyn SubmissionStore>,
        references: Arc<dyn ReferenceResolver>,
        ledger: Arc<dyn CreditLedger>,
        executor: AnalysisRetryExecutor,
        options: PipelineOptions,
    ) -> Self {
        Self { submissions, references, ledger, executor, options }
    }

    pub(crate) fn submissions(&self) -> &Arc<dyn SubmissionStore> {
        &self.submissions
    }

    /// Drives one submission through `processing` to `completed` or `failed`.
    pub(crate) async fn evaluate(
        &self,
        submission_id: &str,
    ) -> Result<EvaluationResult, EvaluationError> {
        let timer = Instant::now();
        let outcome = self.run(submission_id).await;

        let status = match &outcome {
            Ok(_) => "completed",
            Err(err) => err.metric_label(),
        };
        metrics::counter!("evaluations_total", "status" => status).increment(1);
        metrics::histogram!("evaluation_duration_seconds").record(timer.elapsed().as_secs_f64());

        outcome
    }

    pub(crate) async fn status(&self, submission_id: &str) -> Result<EvaluationStatus, EvaluationError> {
        let submission = self.find_submission(submission_id).await?;

        Ok(EvaluationStatus {
            submission_id: submission.id,
            status: submission.status,
            started_at: submission.evaluation_started_at,
            completed_at: submission.evaluation_completed_at,
            error_details: submission.error_details.map(|details| details.0),
        })
    }

    pub(crate) async fn result(&self, submission_id: &str) -> Result<EvaluationResult, EvaluationError> {
        self.submissions
            .find_result(submission_id)
            .await
            .map_err(|err| store_failure(err, "Failed to load evaluation result"))?
            .ok_or(EvaluationError::NotFound)
    }

    async fn run(&self, submission_id: &str) -> Result<EvaluationResult, EvaluationError> {
        let submission = self.find_submission(submission_id).await?;

        self.submissions.begin_processing(submission_id, primitive_now_utc()).await.map_err(
            |err| match err {
                StoreError::Conflict => EvaluationError::Conflict,
                StoreError::NotFound => EvaluationError::NotFound,
                other => store_failure(other, "Failed to claim submission"),
            },
        )?;
        tracing::info!(submission_id, check_id = %submission.check_id, "Submission claimed for evaluation");

        // Claimed first so a pending row without pages cannot block the queue.
        if submission.image_urls.0.is_empty() {
            let message = "submission has no images".to_string();
            tracing::warn!(submission_id, "Submission has no images");
            let details = json!({
                "error_type": "validation_error",
                "message": message,
                "retryable": false,
                "occurred_at": format_primitive(primitive_now_utc()),
            });
            self.record_failure(submission_id, details).await;
            return Err(EvaluationError::Validation(message));
        }

        self.deduct_credits(&submission).await?;

        match self.grade(&submission).await {
            Ok(Graded::Result { result, detected_variant, student_name }) => {
                let completed = Completed {
                    result: &result,
                    detected_variant,
                    student_name: student_name.as_deref(),
                    completed_at: primitive_now_utc(),
                };
                if let Err(err) = self.submissions.complete(submission_id, completed).await {
                    let err = anyhow::Error::new(err).context("Failed to persist evaluation result");
                    return Err(self.fail_technical(submission_id, &err).await);
                }

                tracing::info!(
                    submission_id,
                    final_grade = result.final_grade,
                    percentage_score = result.percentage_score,
                    variant_used = result.variant_used,
                    "Evaluation completed"
                );
                Ok(result)
            }
            Ok(Graded::Rejected(content_error)) => {
                Err(self.reject_content(submission_id, content_error).await)
            }
            Err(err) => Err(self.fail_technical(submission_id, &err).await),
        }
    }

    async fn find_submission(&self, submission_id: &str) -> Result<Submission, EvaluationError> {
        if submission_id.trim().is_empty() {
            return Err(EvaluationError::Validation("submission id is empty".to_string()));
        }

        self.submissions
            .find(submission_id)
            .await
            .map_err(|err| store_failure(err, "Failed to load submission"))?
            .ok_or(EvaluationError::NotFound)
    }

    async fn deduct_credits(&self, submission: &Submission) -> Result<(), EvaluationError> {
        let pages = u32::try_from(submission.image_urls.0.len()).unwrap_or(u32::MAX);
        let required = pages.saturating_mul(self.options.credits_per_page);

        match self.ledger.deduct(&submission.user_id, required, &submission.id).await {
            Ok(()) => {
                tracing::debug!(submission_id = %submission.id, credits = required, "Credits deducted");
                Ok(())
            }
            Err(LedgerError::InsufficientCredits { required, available }) => {
                tracing::warn!(
                    submission_id = %submission.id,
                    required,
                    available,
                    "Insufficient credits for evaluation"
                );
                let details = json!({
                    "error_type": "insufficient_credits",
                    "message": format!("Недостаточно кредитов: требуется {required}, доступно {available}"),
                    "required": required,
                    "available": available,
                    "retryable": true,
                    "occurred_at": format_primitive(primitive_now_utc()),
                });
                self.record_failure(&submission.id, details).await;
                Err(EvaluationError::InsufficientCredits { required, available })
            }
            Err(err @ LedgerError::Unavailable(_)) => {
                let err = anyhow::Error::new(err);
                Err(self.fail_technical(&submission.id, &err).await)
            }
        }
    }

    async fn grade(&self, submission: &Submission) -> anyhow::Result<Graded> {
        let check = self
            .references
            .load_check(&submission.check_id)
            .await
            .context("Failed to load check")?
            .ok_or_else(|| {
                ValidationError::InvalidCheck(format!("check {} not found", submission.check_id))
            })?
            .validated()?;

        let request = ai_analysis::build_request(
            &check,
            &submission.id,
            &submission.image_urls.0,
            &self.options.model,
            self.options.temperature,
            self.options.max_tokens,
        );

        let payload = match self.executor.run(&request).await? {
            AiAnalysisResult::ContentError(content_error) => {
                return Ok(Graded::Rejected(content_error));
            }
            AiAnalysisResult::Success(payload) => payload,
        };

        let variant_used = check.effective_variant(payload.variant_detected);
        if let Some(detected) = payload.variant_detected {
            if detected != variant_used {
                tracing::warn!(
                    submission_id = %submission.id,
                    detected,
                    variant_count = check.variant_count,
                    "Detected variant out of range, falling back to variant 1"
                );
            }
        }

        let summary = match check.check_type {
            CheckType::Test => self.grade_test(&check, variant_used, &payload).await?,
            CheckType::Essay => grade_essay(&check, &payload)?,
        };

        let result = EvaluationResult {
            id: Uuid::new_v4().to_string(),
            submission_id: submission.id.clone(),
            total_questions: summary.total_questions,
            correct_answers: summary.correct_answers,
            incorrect_answers: summary.incorrect_answers,
            percentage_score: summary.percentage_score,
            final_grade: summary.final_grade,
            variant_used,
            detailed_answers: summary.detailed_answers,
            confidence_score: payload.confidence_score,
            essay_analysis: payload.essay_analysis.as_ref().map(|essay| essay.raw.clone()),
        };

        Ok(Graded::Result {
            result,
            detected_variant: payload.variant_detected,
            student_name: payload.student_name,
        })
    }

    async fn grade_test(
        &self,
        check: &CheckConfig,
        variant: u32,
        payload: &AnalysisPayload,
    ) -> anyhow::Result<GradeSummary> {
        let reference = self.resolve_references(check, variant).await?;
        let calculator = GradeCalculator::new(reference.points_map(), check.grade_criteria.clone())?;

        // The AI's own question count is never trusted as the denominator.
        let total_questions = reference.total_questions();
        if total_questions == 0 {
            return Err(ValidationError::MissingReferences(variant).into());
        }
        tracing::debug!(
            check_id = %check.id,
            variant,
            reference_source = reference.source.as_str(),
            total_questions,
            detected_total_questions = payload.total_questions,
            "References resolved"
        );
        let tally = calculator.aggregate_test(
            total_questions,
            &reference.questions,
            &payload.answers,
            &reference.answers,
        );
        Ok(calculator.summarize_test(tally))
    }

    /// A generated test's question bank wins over the per-variant answer map.
    async fn resolve_references(
        &self,
        check: &CheckConfig,
        variant: u32,
    ) -> anyhow::Result<ReferenceSet> {
        let bank = self
            .references
            .question_bank(&check.id, variant)
            .await
            .context("Failed to load question bank")?;
        if let Some(bank) = bank.filter(|bank| !bank.is_empty()) {
            return Ok(ReferenceSet::from_question_bank(variant, &bank));
        }

        let answers = self
            .references
            .variant_answers(&check.id, variant)
            .await
            .context("Failed to load variant answers")?;
        match answers.filter(|answers| !answers.is_empty()) {
            Some(answers) => {
                Ok(ReferenceSet::from_variant_answers(variant, &answers, &check.questions))
            }
            None => Err(ValidationError::MissingReferences(variant).into()),
        }
    }

    async fn reject_content(&self, submission_id: &str, content_error: ContentError) -> EvaluationError {
        tracing::warn!(
            submission_id,
            error_type = content_error.kind.as_str(),
            detected_content_type = content_error.detected_content_type.as_deref().unwrap_or("-"),
            "AI rejected submission content"
        );

        let details = json!({
            "error_type": content_error.kind.as_str(),
            "message": content_error.message,
            "detected_content_type": content_error.detected_content_type,
            "retryable": false,
            "occurred_at": format_primitive(primitive_now_utc()),
        });
        self.record_failure(submission_id, details).await;

        let ContentError { kind, message, detected_content_type } = content_error;
        match kind {
            ContentErrorKind::InappropriateContent => {
                EvaluationError::InappropriateContent { message, detected_content_type }
            }
            ContentErrorKind::UnsupportedTestFormat => {
                EvaluationError::UnsupportedFormat { message, detected_content_type }
            }
        }
    }

    async fn fail_technical(&self, submission_id: &str, err: &anyhow::Error) -> EvaluationError {
        let error_type = technical_error_type(err);
        tracing::error!(submission_id, error_type, error = %format!("{err:#}"), "Evaluation failed");

        let details = json!({
            "error_type": error_type,
            "message": format!("{err:#}"),
            "retryable": true,
            "occurred_at": format_primitive(primitive_now_utc()),
        });
        self.record_failure(submission_id, details).await;

        EvaluationError::TechnicalFailure { error_type, message: format!("{err:#}") }
    }

    async fn record_failure(&self, submission_id: &str, details: Value) {
        if let Err(err) = self.submissions.mark_failed(submission_id, details, primitive_now_utc()).await {
            tracing::error!(submission_id, error = %err, "Failed to mark submission as failed");
        }
    }
}

fn technical_error_type(err: &anyhow::Error) -> &'static str {
    if let Some(analysis) = err.downcast_ref::<AnalysisError>() {
        return analysis.kind();
    }
    if err.downcast_ref::<ValidationError>().is_some() {
        return "validation_error";
    }
    if err.downcast_ref::<LedgerError>().is_some() {
        return "ledger_error";
    }
    "persistence_error"
}

fn store_failure(err: StoreError, context: &str) -> EvaluationError {
    tracing::error!(error = %err, "{context}");
    EvaluationError::TechnicalFailure {
        error_type: "persistence_error",
        message: format!("{context}: {err}"),
    }
}

fn grade_essay(check: &CheckConfig, payload: &AnalysisPayload) -> anyhow::Result<GradeSummary> {
    let essay = payload.essay_analysis.as_ref().ok_or(ValidationError::MissingEssayAnalysis)?;

    let given = payload
        .answers
        .get(&1)
        .map(|answer| answer.detected_answer.clone())
        .or_else(|| {
            essay.raw.get("content_quality").and_then(Value::as_str).map(str::to_string)
        })
        .unwrap_or_default();
    let confidence =
        payload.answers.get(&1).and_then(|answer| answer.confidence).or(payload.confidence_score);

    Ok(summarize_essay(essay.final_grade, &check.essay_criteria, given, confidence)?)
}
