use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::core::time::primitive_now_utc;
use crate::db::models::{Check, EvaluationResultRow, Submission};
use crate::grading::types::{
    default_essay_criteria, default_grade_criteria, BankQuestion, CheckConfig, CheckType,
    EvaluationResult,
};
use crate::repositories::{checks, credits, evaluation_results, health, submissions};
use crate::services::evaluation::{
    Completed, CreditLedger, LedgerError, ReferenceResolver, StoreError, SubmissionStore,
};

/// Postgres-backed submission store, reference resolver and credit ledger.
#[derive(Debug, Clone)]
pub(crate) struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubmissionStore for PgStore {
    async fn find(&self, submission_id: &str) -> Result<Option<Submission>, StoreError> {
        Ok(submissions::find_by_id(&self.pool, submission_id).await?)
    }

    async fn begin_processing(
        &self,
        submission_id: &str,
        started_at: PrimitiveDateTime,
    ) -> Result<(), StoreError> {
        if submissions::begin_processing(&self.pool, submission_id, started_at).await?.is_some() {
            return Ok(());
        }

        if submissions::exists(&self.pool, submission_id).await? {
            Err(StoreError::Conflict)
        } else {
            Err(StoreError::NotFound)
        }
    }

    async fn mark_failed(
        &self,
        submission_id: &str,
        error_details: Value,
        failed_at: PrimitiveDateTime,
    ) -> Result<(), StoreError> {
        match submissions::mark_failed(&self.pool, submission_id, error_details, failed_at).await? {
            0 => Err(StoreError::Conflict),
            _ => Ok(()),
        }
    }

    async fn complete(
        &self,
        submission_id: &str,
        completed: Completed<'_>,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let updated = submissions::mark_completed(
            &mut tx,
            submission_id,
            submissions::CompletionUpdate {
                detected_variant: completed
                    .detected_variant
                    .and_then(|variant| i32::try_from(variant).ok()),
                student_name: completed.student_name,
                completed_at: completed.completed_at,
            },
        )
        .await?;
        if updated == 0 {
            tx.rollback().await?;
            return Err(StoreError::Conflict);
        }

        match evaluation_results::insert(&mut tx, completed.result, completed.completed_at).await {
            Ok(()) => {}
            Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
                tx.rollback().await?;
                return Err(StoreError::Conflict);
            }
            Err(err) => return Err(err.into()),
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_result(
        &self,
        submission_id: &str,
    ) -> Result<Option<EvaluationResult>, StoreError> {
        evaluation_results::find_by_submission(&self.pool, submission_id)
            .await?
            .map(result_from_row)
            .transpose()
    }

    async fn list_pending(&self, limit: i64) -> Result<Vec<String>, StoreError> {
        Ok(submissions::list_pending_ids(&self.pool, limit).await?)
    }

    async fn fail_stale(
        &self,
        started_before: PrimitiveDateTime,
        error_details: Value,
        failed_at: PrimitiveDateTime,
    ) -> Result<Vec<String>, StoreError> {
        Ok(submissions::fail_stale_processing(&self.pool, started_before, error_details, failed_at)
            .await?)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(health::ping(&self.pool).await?)
    }
}

#[async_trait]
impl ReferenceResolver for PgStore {
    async fn load_check(&self, check_id: &str) -> Result<Option<CheckConfig>, StoreError> {
        checks::find_by_id(&self.pool, check_id).await?.map(check_from_row).transpose()
    }

    async fn question_bank(
        &self,
        check_id: &str,
        variant: u32,
    ) -> Result<Option<Vec<BankQuestion>>, StoreError> {
        let variant = to_i32("variant", variant)?;
        let test = checks::find_generated_test(&self.pool, check_id, variant).await?;
        Ok(test.map(|test| test.questions.0))
    }

    async fn variant_answers(
        &self,
        check_id: &str,
        variant: u32,
    ) -> Result<Option<BTreeMap<String, String>>, StoreError> {
        let variant = to_i32("variant", variant)?;
        Ok(checks::find_variant_answers(&self.pool, check_id, variant).await?)
    }
}

#[async_trait]
impl CreditLedger for PgStore {
    async fn deduct(&self, user_id: &str, amount: u32, reference: &str) -> Result<(), LedgerError> {
        let required = i32::try_from(amount)
            .map_err(|_| LedgerError::Unavailable(format!("amount out of range: {amount}")))?;

        let remaining =
            credits::deduct(&self.pool, user_id, required, reference, primitive_now_utc())
                .await
                .map_err(|err| LedgerError::Unavailable(err.to_string()))?;
        if remaining.is_some() {
            return Ok(());
        }

        let available = credits::balance(&self.pool, user_id)
            .await
            .map_err(|err| LedgerError::Unavailable(err.to_string()))?;
        Err(LedgerError::InsufficientCredits {
            required: amount,
            available: u32::try_from(available).unwrap_or(0),
        })
    }
}

/// Missing criteria fall back to the defaults so a check always grades
/// against a configured scale.
fn check_from_row(row: Check) -> Result<CheckConfig, StoreError> {
    let check_type = CheckType::parse(&row.check_type)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown check type {}", row.check_type)))?;

    let grade_criteria = match row.grade_criteria.0 {
        criteria if criteria.is_empty() => default_grade_criteria(),
        criteria => criteria,
    };
    let essay_criteria = match row.essay_criteria.0 {
        criteria if criteria.is_empty() => default_essay_criteria(),
        criteria => criteria,
    };

    Ok(CheckConfig {
        id: row.id,
        title: row.title,
        check_type,
        variant_count: from_i32("variant_count", row.variant_count)?,
        grade_criteria,
        essay_criteria,
        questions: row.questions.0,
    })
}

fn result_from_row(row: EvaluationResultRow) -> Result<EvaluationResult, StoreError> {
    Ok(EvaluationResult {
        id: row.id,
        submission_id: row.submission_id,
        total_questions: from_i32("total_questions", row.total_questions)?,
        correct_answers: from_i32("correct_answers", row.correct_answers)?,
        incorrect_answers: from_i32("incorrect_answers", row.incorrect_answers)?,
        percentage_score: u8::try_from(row.percentage_score)
            .map_err(|_| corrupt("percentage_score", row.percentage_score))?,
        final_grade: u8::try_from(row.final_grade)
            .map_err(|_| corrupt("final_grade", row.final_grade))?,
        variant_used: from_i32("variant_used", row.variant_used)?,
        detailed_answers: row.detailed_answers.0,
        confidence_score: row.confidence_score,
        essay_analysis: row.essay_analysis.map(|essay| essay.0),
    })
}

fn from_i32(field: &str, value: i32) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| corrupt(field, value))
}

fn to_i32(field: &str, value: u32) -> Result<i32, StoreError> {
    i32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{field} out of range: {value}")))
}

fn corrupt(field: &str, value: i32) -> StoreError {
    StoreError::Corrupt(format!("{field} out of range: {value}"))
}
