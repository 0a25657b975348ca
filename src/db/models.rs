use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::SubmissionStatus;
use crate::grading::types::{BankQuestion, DetailedAnswer, EssayCriterion, GradeCriterion, QuestionMeta};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Submission {
    pub(crate) id: String,
    pub(crate) check_id: String,
    pub(crate) user_id: String,
    pub(crate) status: SubmissionStatus,
    pub(crate) image_urls: Json<Vec<String>>,
    pub(crate) detected_variant: Option<i32>,
    pub(crate) student_name: Option<String>,
    pub(crate) error_details: Option<Json<serde_json::Value>>,
    pub(crate) evaluation_started_at: Option<PrimitiveDateTime>,
    pub(crate) evaluation_completed_at: Option<PrimitiveDateTime>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Check {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) check_type: String,
    pub(crate) variant_count: i32,
    pub(crate) grade_criteria: Json<Vec<GradeCriterion>>,
    pub(crate) essay_criteria: Json<Vec<EssayCriterion>>,
    pub(crate) questions: Json<BTreeMap<u32, QuestionMeta>>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct GeneratedTest {
    pub(crate) id: String,
    pub(crate) check_id: String,
    pub(crate) variant: i32,
    pub(crate) questions: Json<Vec<BankQuestion>>,
    pub(crate) created_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct EvaluationResultRow {
    pub(crate) id: String,
    pub(crate) submission_id: String,
    pub(crate) total_questions: i32,
    pub(crate) correct_answers: i32,
    pub(crate) incorrect_answers: i32,
    pub(crate) percentage_score: i32,
    pub(crate) final_grade: i32,
    pub(crate) variant_used: i32,
    pub(crate) detailed_answers: Json<BTreeMap<String, DetailedAnswer>>,
    pub(crate) confidence_score: Option<f64>,
    pub(crate) essay_analysis: Option<Json<serde_json::Value>>,
    pub(crate) created_at: PrimitiveDateTime,
}
