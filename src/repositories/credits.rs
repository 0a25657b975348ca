use sqlx::PgPool;
use time::PrimitiveDateTime;
use uuid::Uuid;

/// Deducts `amount` only when the balance covers it. Returns the remaining
/// balance, or `None` when the balance was short or the user has no account.
pub(crate) async fn deduct(
    pool: &PgPool,
    user_id: &str,
    amount: i32,
    reference: &str,
    now: PrimitiveDateTime,
) -> Result<Option<i32>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let remaining = sqlx::query_scalar::<_, i32>(
        "UPDATE credit_balances
         SET balance = balance - $2,
             updated_at = $3
         WHERE user_id = $1 AND balance >= $2
         RETURNING balance",
    )
    .bind(user_id)
    .bind(amount)
    .bind(now)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(remaining) = remaining else {
        tx.rollback().await?;
        return Ok(None);
    };

    sqlx::query(
        "INSERT INTO credit_transactions (id, user_id, amount, reference, created_at)
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(-amount)
    .bind(reference)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(Some(remaining))
}

pub(crate) async fn balance(pool: &PgPool, user_id: &str) -> Result<i32, sqlx::Error> {
    let balance =
        sqlx::query_scalar::<_, i32>("SELECT balance FROM credit_balances WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(pool)
            .await?;

    Ok(balance.unwrap_or(0))
}
