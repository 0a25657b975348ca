use std::collections::BTreeMap;

use sqlx::types::Json;
use sqlx::PgPool;

use crate::db::models::{Check, GeneratedTest};

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Check>, sqlx::Error> {
    sqlx::query_as::<_, Check>(
        "SELECT id, title, check_type, variant_count, grade_criteria, essay_criteria, questions,
                created_at, updated_at
         FROM checks
         WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn find_generated_test(
    pool: &PgPool,
    check_id: &str,
    variant: i32,
) -> Result<Option<GeneratedTest>, sqlx::Error> {
    sqlx::query_as::<_, GeneratedTest>(
        "SELECT id, check_id, variant, questions, created_at
         FROM generated_tests
         WHERE check_id = $1 AND variant = $2
         ORDER BY created_at DESC
         LIMIT 1",
    )
    .bind(check_id)
    .bind(variant)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn find_variant_answers(
    pool: &PgPool,
    check_id: &str,
    variant: i32,
) -> Result<Option<BTreeMap<String, String>>, sqlx::Error> {
    let answers = sqlx::query_scalar::<_, Json<BTreeMap<String, String>>>(
        "SELECT answers
         FROM check_variant_answers
         WHERE check_id = $1 AND variant = $2",
    )
    .bind(check_id)
    .bind(variant)
    .fetch_optional(pool)
    .await?;

    Ok(answers.map(|answers| answers.0))
}
