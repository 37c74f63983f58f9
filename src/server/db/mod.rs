//! Database access layer using sqlx with PostgreSQL
//!
//! The jobs only see the store traits below. `PgStore` implements all of
//! them against the shared Postgres database; tests use the in-memory
//! store in `memory`.

pub mod accounts;
pub mod campaigns;
pub mod phone_numbers;

#[cfg(test)]
pub mod memory;

use chrono::{DateTime, Utc};
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Account, AccountTrialUpdate, AccountUsageChange, Campaign, CampaignStatus, Client, PhoneNumber};

/// Store-related errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Campaign not found: {0}")]
    CampaignNotFound(Uuid),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Phone number not found: {0}")]
    PhoneNumberNotFound(String),

    #[error("Campaign {id} was modified concurrently (expected version {expected})")]
    VersionConflict { id: Uuid, expected: i64 },

    #[error("Invalid row: {0}")]
    InvalidRow(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait::async_trait]
pub trait CampaignStore: Send + Sync {
    async fn list_campaigns(&self) -> StoreResult<Vec<Campaign>>;

    async fn get_campaign(&self, id: Uuid) -> StoreResult<Option<Campaign>>;

    /// Replace the client list if the stored version still equals
    /// `expected_version`. Returns the new version.
    async fn update_campaign_clients(
        &self,
        id: Uuid,
        clients: &[Client],
        expected_version: i64,
    ) -> StoreResult<i64>;

    async fn update_campaign_status(&self, id: Uuid, status: CampaignStatus) -> StoreResult<()>;
}

#[async_trait::async_trait]
pub trait AccountStore: Send + Sync {
    async fn get_user(&self, id: &str) -> StoreResult<Option<Account>>;

    async fn update_user_trial_fields(&self, id: &str, fields: &AccountTrialUpdate) -> StoreResult<()>;

    /// Add a completed call's minutes in one atomic read-modify-write.
    /// `None` when the account does not exist.
    async fn add_call_usage(&self, id: &str, minutes: f64) -> StoreResult<Option<AccountUsageChange>>;

    /// Trial accounts whose trial ended before `now`
    async fn list_expired_trials(&self, now: DateTime<Utc>) -> StoreResult<Vec<Account>>;
}

#[async_trait::async_trait]
pub trait PhoneNumberStore: Send + Sync {
    async fn list_numbers_by_owner(&self, user_id: &str, trial_only: bool) -> StoreResult<Vec<PhoneNumber>>;

    async fn list_trial_numbers_created_before(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<PhoneNumber>>;

    /// Lookup by the call provider's phone-number id
    async fn find_by_provider_id(&self, provider_id: &str) -> StoreResult<Option<PhoneNumber>>;

    /// Detach the number from its owner and mark it released
    async fn release_number(&self, phone_number: &str) -> StoreResult<()>;

    /// The number stays with its owner as a regular number
    async fn clear_trial_flag(&self, phone_number: &str) -> StoreResult<()>;
}

/// Postgres-backed implementation of every store trait
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Initialize the database connection pool
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
