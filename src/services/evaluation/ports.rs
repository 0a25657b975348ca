//! Collaborators the pipeline depends on. Postgres implementations live in
//! `repositories`; tests use in-memory fakes.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use time::PrimitiveDateTime;

use crate::db::models::Submission;
use crate::grading::types::{BankQuestion, CheckConfig, EvaluationResult};

#[derive(Debug, Error)]
pub(crate) enum StoreError {
    #[error("submission not found")]
    NotFound,
    #[error("submission status changed concurrently")]
    Conflict,
    #[error("stored data is invalid: {0}")]
    Corrupt(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Everything written at the `processing -> completed` transition.
#[derive(Debug, Clone)]
pub(crate) struct Completed<'a> {
    pub(crate) result: &'a EvaluationResult,
    pub(crate) detected_variant: Option<u32>,
    pub(crate) student_name: Option<&'a str>,
    pub(crate) completed_at: PrimitiveDateTime,
}

#[async_trait]
pub(crate) trait SubmissionStore: Send + Sync {
    async fn find(&self, submission_id: &str) -> Result<Option<Submission>, StoreError>;

    /// Atomically moves `pending`/`failed` to `processing`. Any other current
    /// status is a `Conflict`.
    async fn begin_processing(
        &self,
        submission_id: &str,
        started_at: PrimitiveDateTime,
    ) -> Result<(), StoreError>;

    async fn mark_failed(
        &self,
        submission_id: &str,
        error_details: Value,
        failed_at: PrimitiveDateTime,
    ) -> Result<(), StoreError>;

    /// Inserts the result and flips `processing -> completed` as one unit.
    async fn complete(&self, submission_id: &str, completed: Completed<'_>)
        -> Result<(), StoreError>;

    async fn find_result(&self, submission_id: &str)
        -> Result<Option<EvaluationResult>, StoreError>;

    async fn list_pending(&self, limit: i64) -> Result<Vec<String>, StoreError>;

    /// Fails submissions left in `processing` since before `started_before`.
    async fn fail_stale(
        &self,
        started_before: PrimitiveDateTime,
        error_details: Value,
        failed_at: PrimitiveDateTime,
    ) -> Result<Vec<String>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

#[async_trait]
pub(crate) trait ReferenceResolver: Send + Sync {
    async fn load_check(&self, check_id: &str) -> Result<Option<CheckConfig>, StoreError>;

    async fn question_bank(
        &self,
        check_id: &str,
        variant: u32,
    ) -> Result<Option<Vec<BankQuestion>>, StoreError>;

    async fn variant_answers(
        &self,
        check_id: &str,
        variant: u32,
    ) -> Result<Option<BTreeMap<String, String>>, StoreError>;
}

#[derive(Debug, Error)]
pub(crate) enum LedgerError {
    #[error("insufficient credits: required {required}, available {available}")]
    InsufficientCredits { required: u32, available: u32 },
    #[error("credit ledger unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub(crate) trait CreditLedger: Send + Sync {
    async fn deduct(&self, user_id: &str, amount: u32, reference: &str)
        -> Result<(), LedgerError>;
}
