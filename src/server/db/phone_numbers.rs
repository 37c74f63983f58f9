//! Phone number database operations

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{PgStore, PhoneNumberStore, StoreError, StoreResult};
use crate::models::{PhoneNumber, PhoneNumberStatus};

#[derive(sqlx::FromRow)]
struct PhoneNumberRow {
    phone_number: String,
    owner_user_id: Option<String>,
    provider_id: Option<String>,
    is_trial_number: bool,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<PhoneNumberRow> for PhoneNumber {
    type Error = StoreError;

    fn try_from(row: PhoneNumberRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<PhoneNumberStatus>()
            .map_err(|e| StoreError::InvalidRow(format!("phone number {}: {}", row.phone_number, e)))?;

        Ok(PhoneNumber {
            phone_number: row.phone_number,
            owner_user_id: row.owner_user_id,
            provider_id: row.provider_id,
            is_trial_number: row.is_trial_number,
            status,
            created_at: row.created_at,
        })
    }
}

fn convert_all(rows: Vec<PhoneNumberRow>) -> StoreResult<Vec<PhoneNumber>> {
    rows.into_iter().map(PhoneNumber::try_from).collect()
}

pub async fn get_by_owner(pool: &PgPool, user_id: &str, trial_only: bool) -> StoreResult<Vec<PhoneNumber>> {
    let rows = sqlx::query_as::<_, PhoneNumberRow>(
        r#"
        SELECT phone_number, owner_user_id, provider_id, is_trial_number, status, created_at
        FROM phone_numbers
        WHERE owner_user_id = $1 AND ($2 = FALSE OR is_trial_number = TRUE)
        ORDER BY created_at ASC
        "#
    )
    .bind(user_id)
    .bind(trial_only)
    .fetch_all(pool)
    .await?;

    convert_all(rows)
}

pub async fn get_trial_created_before(pool: &PgPool, cutoff: DateTime<Utc>) -> StoreResult<Vec<PhoneNumber>> {
    let rows = sqlx::query_as::<_, PhoneNumberRow>(
        r#"
        SELECT phone_number, owner_user_id, provider_id, is_trial_number, status, created_at
        FROM phone_numbers
        WHERE is_trial_number = TRUE AND status <> 'released' AND created_at < $1
        ORDER BY created_at ASC
        "#
    )
    .bind(cutoff)
    .fetch_all(pool)
    .await?;

    convert_all(rows)
}

pub async fn get_by_provider_id(pool: &PgPool, provider_id: &str) -> StoreResult<Option<PhoneNumber>> {
    sqlx::query_as::<_, PhoneNumberRow>(
        r#"
        SELECT phone_number, owner_user_id, provider_id, is_trial_number, status, created_at
        FROM phone_numbers
        WHERE provider_id = $1
        "#
    )
    .bind(provider_id)
    .fetch_optional(pool)
    .await?
    .map(PhoneNumber::try_from)
    .transpose()
}

pub async fn release(pool: &PgPool, phone_number: &str) -> StoreResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE phone_numbers
        SET owner_user_id = NULL, status = $2, updated_at = NOW()
        WHERE phone_number = $1
        "#
    )
    .bind(phone_number)
    .bind(PhoneNumberStatus::Released.as_str())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::PhoneNumberNotFound(phone_number.to_string()));
    }
    Ok(())
}

pub async fn clear_trial_flag(pool: &PgPool, phone_number: &str) -> StoreResult<()> {
    let result = sqlx::query(
        "UPDATE phone_numbers SET is_trial_number = FALSE, updated_at = NOW() WHERE phone_number = $1"
    )
    .bind(phone_number)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::PhoneNumberNotFound(phone_number.to_string()));
    }
    Ok(())
}

#[async_trait::async_trait]
impl PhoneNumberStore for PgStore {
    async fn list_numbers_by_owner(&self, user_id: &str, trial_only: bool) -> StoreResult<Vec<PhoneNumber>> {
        get_by_owner(&self.pool, user_id, trial_only).await
    }

    async fn list_trial_numbers_created_before(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<PhoneNumber>> {
        get_trial_created_before(&self.pool, cutoff).await
    }

    async fn find_by_provider_id(&self, provider_id: &str) -> StoreResult<Option<PhoneNumber>> {
        get_by_provider_id(&self.pool, provider_id).await
    }

    async fn release_number(&self, phone_number: &str) -> StoreResult<()> {
        release(&self.pool, phone_number).await
    }

    async fn clear_trial_flag(&self, phone_number: &str) -> StoreResult<()> {
        clear_trial_flag(&self.pool, phone_number).await
    }
}
