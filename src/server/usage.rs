//! Call-usage accounting
//!
//! Attributes a completed call's duration to its owner: trial minutes (with
//! quota alerts at 50/80/100%) and the lifetime call-time counter.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use super::db::{AccountStore, StoreError};
use super::email::EmailError;
use crate::models::Account;

/// Quota percentages that trigger a usage alert.
pub const USAGE_THRESHOLDS: [u8; 3] = [50, 80, 100];
const EXHAUSTED_PCT: f64 = 100.0;

#[derive(Error, Debug)]
pub enum UsageError {
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Invalid call duration: {0}")]
    InvalidDuration(f64),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UsageSnapshot {
    pub minutes_used: f64,
    pub minutes_total: f64,
    pub percentage_used: f64,
    pub minutes_exceeded: bool,
    pub total_call_time: f64,
}

/// Sent once per threshold a trial account crosses.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageAlert {
    pub user_id: String,
    pub email: Option<String>,
    pub threshold: u8,
    pub minutes_used: f64,
    pub minutes_total: f64,
    pub percentage_used: f64,
}

#[async_trait::async_trait]
pub trait UsageNotifier: Send + Sync {
    async fn usage_threshold_reached(&self, alert: &UsageAlert) -> Result<(), EmailError>;
}

/// Used when no SMTP server is configured.
pub struct LogNotifier;

#[async_trait::async_trait]
impl UsageNotifier for LogNotifier {
    async fn usage_threshold_reached(&self, alert: &UsageAlert) -> Result<(), EmailError> {
        tracing::info!(
            user_id = %alert.user_id,
            threshold = alert.threshold,
            minutes_used = alert.minutes_used,
            minutes_total = alert.minutes_total,
            "Trial usage threshold reached"
        );
        Ok(())
    }
}

pub struct UsageService {
    accounts: Arc<dyn AccountStore>,
    notifier: Arc<dyn UsageNotifier>,
}

impl UsageService {
    pub fn new(accounts: Arc<dyn AccountStore>, notifier: Arc<dyn UsageNotifier>) -> Self {
        Self { accounts, notifier }
    }

    /// Add `minutes` of completed call time to the user's counters.
    pub async fn record_call_usage(&self, user_id: &str, minutes: f64) -> Result<UsageSnapshot, UsageError> {
        if !minutes.is_finite() || minutes < 0.0 {
            return Err(UsageError::InvalidDuration(minutes));
        }

        let change = self
            .accounts
            .add_call_usage(user_id, minutes)
            .await?
            .ok_or_else(|| UsageError::AccountNotFound(user_id.to_string()))?;
        let account = &change.after;

        let crossed = if account.is_trial {
            crossed_thresholds(
                percentage(change.before.trial_minutes_used, account.trial_minutes_total),
                percentage(account.trial_minutes_used, account.trial_minutes_total),
            )
        } else {
            Vec::new()
        };

        let snapshot = UsageSnapshot {
            minutes_used: account.trial_minutes_used,
            minutes_total: account.trial_minutes_total,
            percentage_used: percentage(account.trial_minutes_used, account.trial_minutes_total),
            minutes_exceeded: account.is_trial && account.trial_minutes_used >= account.trial_minutes_total,
            total_call_time: account.lifetime_minutes(),
        };

        tracing::info!(
            user_id,
            minutes,
            minutes_used = snapshot.minutes_used,
            percentage_used = snapshot.percentage_used,
            "Call usage recorded"
        );

        for threshold in crossed {
            self.notify(account, threshold, &snapshot).await;
        }

        Ok(snapshot)
    }

    async fn notify(&self, account: &Account, threshold: u8, snapshot: &UsageSnapshot) {
        let alert = UsageAlert {
            user_id: account.id.clone(),
            email: account.email.clone(),
            threshold,
            minutes_used: snapshot.minutes_used,
            minutes_total: snapshot.minutes_total,
            percentage_used: snapshot.percentage_used,
        };
        if let Err(e) = self.notifier.usage_threshold_reached(&alert).await {
            tracing::warn!(user_id = %account.id, threshold, "Failed to send usage alert: {}", e);
        }
    }
}

fn percentage(used: f64, total: f64) -> f64 {
    if total <= 0.0 {
        return 0.0;
    }
    used * 100.0 / total
}

/// Thresholds `t` with `previous <= t < current`. The exhaustion threshold
/// fires on reaching the quota: `previous < 100 <= current`.
pub fn crossed_thresholds(previous: f64, current: f64) -> Vec<u8> {
    USAGE_THRESHOLDS
        .iter()
        .copied()
        .filter(|&t| {
            let t = f64::from(t);
            if t >= EXHAUSTED_PCT {
                previous < t && t <= current
            } else {
                previous <= t && t < current
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::server::db::memory::MemoryStore;
    use crate::server::testing::{self, RecordingNotifier};

    fn service(store: &Arc<MemoryStore>, notifier: &Arc<RecordingNotifier>) -> UsageService {
        UsageService::new(store.clone(), notifier.clone())
    }

    #[test]
    fn test_crossed_thresholds() {
        assert_eq!(crossed_thresholds(0.0, 40.0), Vec::<u8>::new());
        assert_eq!(crossed_thresholds(40.0, 60.0), vec![50]);
        assert_eq!(crossed_thresholds(80.0, 104.0), vec![80, 100]);
        assert_eq!(crossed_thresholds(0.0, 100.0), vec![50, 80, 100]);
        assert_eq!(crossed_thresholds(80.0, 100.0), vec![80, 100]);
        assert_eq!(crossed_thresholds(100.0, 120.0), Vec::<u8>::new());
        assert_eq!(crossed_thresholds(104.0, 120.0), Vec::<u8>::new());
    }

    #[tokio::test]
    async fn test_trial_call_past_quota() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        store.insert_account(testing::trial_account("user_a", 20.0, 25.0));

        let snapshot = service(&store, &notifier).record_call_usage("user_a", 6.0).await.unwrap();

        assert_eq!(snapshot.minutes_used, 26.0);
        assert_eq!(snapshot.minutes_total, 25.0);
        assert!(snapshot.minutes_exceeded);
        assert_eq!(snapshot.percentage_used, 104.0);
        assert_eq!(notifier.thresholds().iter().filter(|&&t| t == 80).count(), 1);
        assert_eq!(notifier.thresholds(), vec![80, 100]);
        assert_eq!(store.account("user_a").trial_minutes_used, 26.0);
    }

    #[tokio::test]
    async fn test_landing_exactly_on_the_quota_alerts_exhaustion() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        store.insert_account(testing::trial_account("user_a", 20.0, 25.0));
        let service = service(&store, &notifier);

        let snapshot = service.record_call_usage("user_a", 5.0).await.unwrap();
        assert_eq!(snapshot.minutes_used, 25.0);
        assert_eq!(snapshot.percentage_used, 100.0);
        assert!(snapshot.minutes_exceeded);
        assert_eq!(notifier.thresholds(), vec![80, 100]);

        service.record_call_usage("user_a", 1.0).await.unwrap();
        assert_eq!(notifier.thresholds(), vec![80, 100]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_calls_for_one_user_all_count() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        store.insert_account(testing::trial_account("user_a", 0.0, 20.0));
        let service = Arc::new(service(&store, &notifier));

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let service = service.clone();
                tokio::spawn(async move { service.record_call_usage("user_a", 1.0).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let account = store.account("user_a");
        assert_eq!(account.trial_minutes_used, 20.0);
        assert_eq!(account.total_call_time.as_deref(), Some("20"));
        let mut fired = notifier.thresholds();
        fired.sort();
        assert_eq!(fired, vec![50, 80, 100]);
    }

    #[tokio::test]
    async fn test_each_threshold_fires_once_over_many_calls() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        store.insert_account(testing::trial_account("user_a", 0.0, 10.0));
        let service = service(&store, &notifier);

        for _ in 0..15 {
            service.record_call_usage("user_a", 1.0).await.unwrap();
        }

        assert_eq!(notifier.thresholds(), vec![50, 80, 100]);
    }

    #[tokio::test]
    async fn test_lifetime_total_tolerates_garbage() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let mut account = testing::paid_account("user_paid");
        account.total_call_time = Some("n/a".to_string());
        store.insert_account(account);

        let snapshot = service(&store, &notifier).record_call_usage("user_paid", 2.5).await.unwrap();

        assert_eq!(snapshot.total_call_time, 2.5);
        assert!(!snapshot.minutes_exceeded);
        let stored = store.account("user_paid");
        assert_eq!(stored.total_call_time.as_deref(), Some("2.5"));
        assert_eq!(stored.trial_minutes_used, 0.0);
        assert!(notifier.thresholds().is_empty());
    }

    #[tokio::test]
    async fn test_notifier_failure_does_not_fail_accounting() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier { fail: true, ..Default::default() });
        store.insert_account(testing::trial_account("user_a", 12.0, 25.0));

        let snapshot = service(&store, &notifier).record_call_usage("user_a", 1.0).await.unwrap();

        assert_eq!(snapshot.minutes_used, 13.0);
        assert_eq!(notifier.thresholds(), vec![50]);
    }

    #[tokio::test]
    async fn test_unknown_user_and_bad_duration() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let service = service(&store, &notifier);

        assert!(matches!(
            service.record_call_usage("ghost", 1.0).await,
            Err(UsageError::AccountNotFound(_))
        ));
        assert!(matches!(
            service.record_call_usage("ghost", f64::NAN).await,
            Err(UsageError::InvalidDuration(_))
        ));
    }
}
