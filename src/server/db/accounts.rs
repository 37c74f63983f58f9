//! Account database operations

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{AccountStore, PgStore, StoreError, StoreResult};
use crate::models::{Account, AccountTrialUpdate, AccountUsageChange};

pub async fn get_by_id(pool: &PgPool, id: &str) -> Result<Option<Account>, sqlx::Error> {
    sqlx::query_as::<_, Account>(
        r#"
        SELECT id, email, is_trial, trial_start_date, trial_end_date,
               trial_minutes_used, trial_minutes_total, plan_type, total_call_time
        FROM accounts
        WHERE id = $1
        "#
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn get_expired_trials(pool: &PgPool, now: DateTime<Utc>) -> Result<Vec<Account>, sqlx::Error> {
    sqlx::query_as::<_, Account>(
        r#"
        SELECT id, email, is_trial, trial_start_date, trial_end_date,
               trial_minutes_used, trial_minutes_total, plan_type, total_call_time
        FROM accounts
        WHERE is_trial = TRUE AND trial_end_date < $1
        ORDER BY trial_end_date ASC
        "#
    )
    .bind(now)
    .fetch_all(pool)
    .await
}

pub async fn update_trial_fields(pool: &PgPool, id: &str, fields: &AccountTrialUpdate) -> StoreResult<()> {
    if fields.is_empty() {
        return Ok(());
    }

    let result = sqlx::query(
        r#"
        UPDATE accounts
        SET is_trial = COALESCE($2, is_trial),
            plan_type = COALESCE($3, plan_type),
            updated_at = NOW()
        WHERE id = $1
        "#
    )
    .bind(id)
    .bind(fields.is_trial)
    .bind(&fields.plan_type)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::AccountNotFound(id.to_string()));
    }
    Ok(())
}

/// The row stays locked from read to write, so concurrent end-of-call
/// reports for one user add up instead of overwriting each other.
pub async fn add_call_usage(pool: &PgPool, id: &str, minutes: f64) -> StoreResult<Option<AccountUsageChange>> {
    let mut tx = pool.begin().await?;

    let before = sqlx::query_as::<_, Account>(
        r#"
        SELECT id, email, is_trial, trial_start_date, trial_end_date,
               trial_minutes_used, trial_minutes_total, plan_type, total_call_time
        FROM accounts
        WHERE id = $1
        FOR UPDATE
        "#
    )
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(before) = before else {
        return Ok(None);
    };

    let mut after = before.clone();
    after.add_call_minutes(minutes);

    sqlx::query(
        r#"
        UPDATE accounts
        SET trial_minutes_used = $2,
            total_call_time = $3,
            updated_at = NOW()
        WHERE id = $1
        "#
    )
    .bind(id)
    .bind(after.trial_minutes_used)
    .bind(&after.total_call_time)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(Some(AccountUsageChange { before, after }))
}

#[async_trait::async_trait]
impl AccountStore for PgStore {
    async fn get_user(&self, id: &str) -> StoreResult<Option<Account>> {
        Ok(get_by_id(&self.pool, id).await?)
    }

    async fn update_user_trial_fields(&self, id: &str, fields: &AccountTrialUpdate) -> StoreResult<()> {
        update_trial_fields(&self.pool, id, fields).await
    }

    async fn add_call_usage(&self, id: &str, minutes: f64) -> StoreResult<Option<AccountUsageChange>> {
        add_call_usage(&self.pool, id, minutes).await
    }

    async fn list_expired_trials(&self, now: DateTime<Utc>) -> StoreResult<Vec<Account>> {
        Ok(get_expired_trials(&self.pool, now).await?)
    }
}
