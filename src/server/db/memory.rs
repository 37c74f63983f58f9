//! In-memory store used by the job tests

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{AccountStore, CampaignStore, PhoneNumberStore, StoreError, StoreResult};
use crate::models::{
    Account, AccountTrialUpdate, AccountUsageChange, Campaign, CampaignStatus, Client, PhoneNumber, PhoneNumberStatus,
};

#[derive(Default)]
pub struct MemoryStore {
    campaigns: Mutex<Vec<Campaign>>,
    accounts: Mutex<HashMap<String, Account>>,
    numbers: Mutex<Vec<PhoneNumber>>,
    /// Campaign ids whose reads fail, to exercise per-campaign isolation
    broken_campaigns: Mutex<Vec<Uuid>>,
    /// Phone numbers whose writes fail
    broken_numbers: Mutex<Vec<String>>,
    client_writes: Mutex<usize>,
    /// Client-list writes fail once this many have succeeded
    client_write_limit: Mutex<Option<usize>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_campaign(&self, campaign: Campaign) {
        self.campaigns.lock().unwrap().push(campaign);
    }

    pub fn insert_account(&self, account: Account) {
        self.accounts.lock().unwrap().insert(account.id.clone(), account);
    }

    pub fn insert_number(&self, number: PhoneNumber) {
        self.numbers.lock().unwrap().push(number);
    }

    pub fn break_campaign(&self, id: Uuid) {
        self.broken_campaigns.lock().unwrap().push(id);
    }

    pub fn break_number(&self, phone_number: &str) {
        self.broken_numbers.lock().unwrap().push(phone_number.to_string());
    }

    pub fn repair_number(&self, phone_number: &str) {
        self.broken_numbers.lock().unwrap().retain(|n| n != phone_number);
    }

    pub fn fail_client_writes_after(&self, successful: usize) {
        *self.client_write_limit.lock().unwrap() = Some(successful);
    }

    pub fn allow_client_writes(&self) {
        *self.client_write_limit.lock().unwrap() = None;
    }

    /// Stands in for a write by another process.
    pub fn bump_version(&self, id: Uuid) {
        let mut campaigns = self.campaigns.lock().unwrap();
        if let Some(campaign) = campaigns.iter_mut().find(|c| c.id == id) {
            campaign.version += 1;
        }
    }

    pub fn campaign(&self, id: Uuid) -> Campaign {
        self.campaigns
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .expect("campaign exists")
    }

    pub fn account(&self, id: &str) -> Account {
        self.accounts.lock().unwrap().get(id).cloned().expect("account exists")
    }

    pub fn number(&self, phone_number: &str) -> PhoneNumber {
        self.numbers
            .lock()
            .unwrap()
            .iter()
            .find(|n| n.phone_number == phone_number)
            .cloned()
            .expect("number exists")
    }

    pub fn client_writes(&self) -> usize {
        *self.client_writes.lock().unwrap()
    }

    fn check_campaign(&self, id: Uuid) -> StoreResult<()> {
        if self.broken_campaigns.lock().unwrap().contains(&id) {
            return Err(StoreError::InvalidRow(format!("campaign {} is unreadable", id)));
        }
        Ok(())
    }

    fn update_number<F>(&self, phone_number: &str, f: F) -> StoreResult<()>
    where
        F: FnOnce(&mut PhoneNumber),
    {
        if self.broken_numbers.lock().unwrap().iter().any(|n| n == phone_number) {
            return Err(StoreError::InvalidRow(format!("number {} is locked", phone_number)));
        }
        let mut numbers = self.numbers.lock().unwrap();
        let number = numbers
            .iter_mut()
            .find(|n| n.phone_number == phone_number)
            .ok_or_else(|| StoreError::PhoneNumberNotFound(phone_number.to_string()))?;
        f(number);
        Ok(())
    }
}

#[async_trait::async_trait]
impl CampaignStore for MemoryStore {
    async fn list_campaigns(&self) -> StoreResult<Vec<Campaign>> {
        Ok(self.campaigns.lock().unwrap().clone())
    }

    async fn get_campaign(&self, id: Uuid) -> StoreResult<Option<Campaign>> {
        self.check_campaign(id)?;
        Ok(self.campaigns.lock().unwrap().iter().find(|c| c.id == id).cloned())
    }

    async fn update_campaign_clients(
        &self,
        id: Uuid,
        clients: &[Client],
        expected_version: i64,
    ) -> StoreResult<i64> {
        let writes = *self.client_writes.lock().unwrap();
        if self.client_write_limit.lock().unwrap().is_some_and(|limit| writes >= limit) {
            return Err(StoreError::InvalidRow(format!("campaign {} is read-only", id)));
        }

        let mut campaigns = self.campaigns.lock().unwrap();
        let campaign = campaigns
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(StoreError::CampaignNotFound(id))?;

        if campaign.version != expected_version {
            return Err(StoreError::VersionConflict { id, expected: expected_version });
        }

        campaign.clients = clients.to_vec();
        campaign.version += 1;
        *self.client_writes.lock().unwrap() += 1;
        Ok(campaign.version)
    }

    async fn update_campaign_status(&self, id: Uuid, status: CampaignStatus) -> StoreResult<()> {
        let mut campaigns = self.campaigns.lock().unwrap();
        let campaign = campaigns
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(StoreError::CampaignNotFound(id))?;
        campaign.status = status;
        Ok(())
    }
}

#[async_trait::async_trait]
impl AccountStore for MemoryStore {
    async fn get_user(&self, id: &str) -> StoreResult<Option<Account>> {
        Ok(self.accounts.lock().unwrap().get(id).cloned())
    }

    async fn update_user_trial_fields(&self, id: &str, fields: &AccountTrialUpdate) -> StoreResult<()> {
        let mut accounts = self.accounts.lock().unwrap();
        let account = accounts
            .get_mut(id)
            .ok_or_else(|| StoreError::AccountNotFound(id.to_string()))?;
        fields.apply_to(account);
        Ok(())
    }

    async fn add_call_usage(&self, id: &str, minutes: f64) -> StoreResult<Option<AccountUsageChange>> {
        let mut accounts = self.accounts.lock().unwrap();
        let Some(account) = accounts.get_mut(id) else {
            return Ok(None);
        };
        let before = account.clone();
        account.add_call_minutes(minutes);
        Ok(Some(AccountUsageChange { before, after: account.clone() }))
    }

    async fn list_expired_trials(&self, now: DateTime<Utc>) -> StoreResult<Vec<Account>> {
        let mut expired: Vec<Account> = self
            .accounts
            .lock()
            .unwrap()
            .values()
            .filter(|a| a.trial_expired(now))
            .cloned()
            .collect();
        expired.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(expired)
    }
}

#[async_trait::async_trait]
impl PhoneNumberStore for MemoryStore {
    async fn list_numbers_by_owner(&self, user_id: &str, trial_only: bool) -> StoreResult<Vec<PhoneNumber>> {
        Ok(self
            .numbers
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.owner_user_id.as_deref() == Some(user_id))
            .filter(|n| !trial_only || n.is_trial_number)
            .cloned()
            .collect())
    }

    async fn list_trial_numbers_created_before(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<PhoneNumber>> {
        Ok(self
            .numbers
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.is_trial_number && n.status != PhoneNumberStatus::Released && n.created_at < cutoff)
            .cloned()
            .collect())
    }

    async fn find_by_provider_id(&self, provider_id: &str) -> StoreResult<Option<PhoneNumber>> {
        Ok(self
            .numbers
            .lock()
            .unwrap()
            .iter()
            .find(|n| n.provider_id.as_deref() == Some(provider_id))
            .cloned())
    }

    async fn release_number(&self, phone_number: &str) -> StoreResult<()> {
        self.update_number(phone_number, |n| {
            n.owner_user_id = None;
            n.status = PhoneNumberStatus::Released;
        })
    }

    async fn clear_trial_flag(&self, phone_number: &str) -> StoreResult<()> {
        self.update_number(phone_number, |n| n.is_trial_number = false)
    }
}
