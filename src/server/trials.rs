//! Trial and trial phone-number lifecycle
//!
//! Two sweeps, each processing accounts or numbers independently:
//! - expired trials are downgraded to the free plan and lose their trial numbers
//! - trial numbers past the hold period are released, or kept as regular
//!   numbers once their owner has left the trial

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::db::{AccountStore, PhoneNumberStore, StoreError, StoreResult};
use crate::models::{Account, AccountTrialUpdate, PhoneNumber, FREE_PLAN};

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct TrialExpirySummary {
    pub processed: usize,
    pub downgraded: usize,
    pub numbers_released: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct NumberHoldSummary {
    pub checked: usize,
    pub released: usize,
    pub graduated: usize,
    pub skipped: usize,
    pub failed: usize,
}

enum HoldOutcome {
    Released,
    Graduated,
    Skipped,
}

pub struct TrialService {
    accounts: Arc<dyn AccountStore>,
    numbers: Arc<dyn PhoneNumberStore>,
    hold_period: Duration,
}

impl TrialService {
    pub fn new(accounts: Arc<dyn AccountStore>, numbers: Arc<dyn PhoneNumberStore>, hold_days: i64) -> Self {
        Self {
            accounts,
            numbers,
            hold_period: Duration::days(hold_days),
        }
    }

    /// Downgrade every trial that ended before `now` and release its numbers.
    pub async fn expire_trials(&self, now: DateTime<Utc>) -> TrialExpirySummary {
        let mut summary = TrialExpirySummary::default();

        let expired = match self.accounts.list_expired_trials(now).await {
            Ok(accounts) => accounts,
            Err(e) => {
                tracing::error!("Failed to list expired trials: {}", e);
                return summary;
            }
        };

        for account in expired {
            summary.processed += 1;
            match self.expire_account(&account).await {
                Ok(released) => {
                    summary.downgraded += 1;
                    summary.numbers_released += released;
                    tracing::info!(user_id = %account.id, released, "Trial expired, downgraded to free plan");
                }
                Err(e) => {
                    summary.failed += 1;
                    tracing::error!(user_id = %account.id, "Failed to expire trial: {}", e);
                }
            }
        }

        summary
    }

    // Numbers go first: an account that keeps a trial number stays on trial,
    // so the next sweep retries it.
    async fn expire_account(&self, account: &Account) -> StoreResult<usize> {
        let released = self.release_trial_numbers(&account.id).await?;

        // Payment method lookup would go here; every expired trial is downgraded for now.
        let update = AccountTrialUpdate {
            is_trial: Some(false),
            plan_type: Some(FREE_PLAN.to_string()),
        };
        self.accounts.update_user_trial_fields(&account.id, &update).await?;
        Ok(released)
    }

    /// Release every trial number the user owns. Returns how many were released.
    pub async fn release_trial_numbers(&self, user_id: &str) -> StoreResult<usize> {
        let numbers = self.numbers.list_numbers_by_owner(user_id, true).await?;

        let mut released = 0;
        let mut first_error: Option<StoreError> = None;
        for number in numbers.iter().filter(|n| !n.is_released()) {
            match self.numbers.release_number(&number.phone_number).await {
                Ok(()) => {
                    released += 1;
                    tracing::info!(user_id, phone_number = %number.phone_number, "Trial number released");
                }
                Err(e) => {
                    tracing::error!(user_id, phone_number = %number.phone_number, "Failed to release trial number: {}", e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(released),
        }
    }

    /// Apply the hold period to trial numbers created before `now - hold`.
    pub async fn enforce_trial_number_hold(&self, now: DateTime<Utc>) -> NumberHoldSummary {
        let mut summary = NumberHoldSummary::default();
        let cutoff = now - self.hold_period;

        let numbers = match self.numbers.list_trial_numbers_created_before(cutoff).await {
            Ok(numbers) => numbers,
            Err(e) => {
                tracing::error!("Failed to list trial numbers: {}", e);
                return summary;
            }
        };

        for number in numbers {
            summary.checked += 1;
            match self.apply_hold(&number).await {
                Ok(HoldOutcome::Released) => summary.released += 1,
                Ok(HoldOutcome::Graduated) => summary.graduated += 1,
                Ok(HoldOutcome::Skipped) => summary.skipped += 1,
                Err(e) => {
                    summary.failed += 1;
                    tracing::error!(phone_number = %number.phone_number, "Trial number hold check failed: {}", e);
                }
            }
        }

        summary
    }

    async fn apply_hold(&self, number: &PhoneNumber) -> StoreResult<HoldOutcome> {
        let Some(owner) = number.owner_user_id.as_deref() else {
            return Ok(HoldOutcome::Skipped);
        };

        let Some(account) = self.accounts.get_user(owner).await? else {
            tracing::warn!(phone_number = %number.phone_number, user_id = owner, "Trial number owner not found");
            return Ok(HoldOutcome::Skipped);
        };

        if account.is_trial {
            self.numbers.release_number(&number.phone_number).await?;
            tracing::info!(phone_number = %number.phone_number, user_id = owner, "Trial number hold exceeded, released");
            Ok(HoldOutcome::Released)
        } else {
            self.numbers.clear_trial_flag(&number.phone_number).await?;
            tracing::info!(phone_number = %number.phone_number, user_id = owner, "Trial number kept as a regular number");
            Ok(HoldOutcome::Graduated)
        }
    }
}
