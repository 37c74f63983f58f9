//! Fixtures shared by the job tests

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use super::db::memory::MemoryStore;
use super::dispatcher::Dispatcher;
use super::email::EmailError;
use super::usage::{UsageAlert, UsageNotifier, UsageService};
use super::AppState;
use super::vapi::{CallProvider, CallProviderError, CallRequest, PlacedCall};
use crate::models::{
    Account, AgentDetails, BusinessInformation, Campaign, CampaignStatus, Client, PhoneNumber,
    PhoneNumberStatus,
};

pub const OWNER: &str = "user_owner";

/// Records every placement request; fails for configured numbers.
#[derive(Default)]
pub struct ScriptedProvider {
    requests: Mutex<Vec<CallRequest>>,
    failing: Mutex<HashSet<String>>,
    delay: Option<Duration>,
    next_id: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Self::default()
        })
    }

    pub fn fail_for(&self, number: &str) {
        self.failing.lock().unwrap().insert(number.to_string());
    }

    pub fn requests(&self) -> Vec<CallRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn dialed_numbers(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.customer_number).collect()
    }
}

#[async_trait::async_trait]
impl CallProvider for ScriptedProvider {
    async fn place_call(&self, request: &CallRequest) -> Result<PlacedCall, CallProviderError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.requests.lock().unwrap().push(request.clone());

        if self.failing.lock().unwrap().contains(&request.customer_number) {
            return Err(CallProviderError::Api {
                status: 503,
                message: "provider unavailable".to_string(),
            });
        }

        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(PlacedCall {
            call_id: format!("call-{}", n),
            status: Some("queued".to_string()),
        })
    }
}

/// Keeps every alert; optionally reports a send failure after recording it.
#[derive(Default)]
pub struct RecordingNotifier {
    pub alerts: Mutex<Vec<UsageAlert>>,
    pub fail: bool,
}

impl RecordingNotifier {
    pub fn thresholds(&self) -> Vec<u8> {
        self.alerts.lock().unwrap().iter().map(|a| a.threshold).collect()
    }
}

#[async_trait::async_trait]
impl UsageNotifier for RecordingNotifier {
    async fn usage_threshold_reached(&self, alert: &UsageAlert) -> Result<(), EmailError> {
        self.alerts.lock().unwrap().push(alert.clone());
        if self.fail {
            return Err(EmailError::SendFailed("smtp down".to_string()));
        }
        Ok(())
    }
}

/// Monday-Friday 09:00-17:00 New York.
pub fn office_hours() -> BusinessInformation {
    serde_json::from_value(serde_json::json!({
        "timezone": "America/New_York",
        "business_name": "Acme Plumbing",
        "business_hours": {
            "start_day": "monday",
            "end_day": "friday",
            "open": "09:00",
            "close": "17:00"
        }
    }))
    .unwrap()
}

/// Monday 2024-01-15 10:00 New York
pub fn open_instant() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 15, 0, 0).unwrap()
}

/// Monday 2024-01-15 22:00 New York
pub fn closed_instant() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 16, 3, 0, 0).unwrap()
}

pub fn client(n: usize) -> Client {
    Client::new(&format!("Client {}", n), &format!("+1555000{:04}", n))
}

pub fn campaign(status: CampaignStatus, client_count: usize) -> Campaign {
    Campaign {
        id: Uuid::new_v4(),
        user_id: OWNER.to_string(),
        name: "Spring follow-ups".to_string(),
        status,
        business_information: office_hours(),
        clients: (1..=client_count).map(client).collect(),
        message_taking: serde_json::json!({ "ask_for": ["callback_time"] }),
        agent_details: AgentDetails {
            cool_off_seconds: Some(300),
            number_of_retries: Some(2),
        },
        assistant_id: Some("asst-1".to_string()),
        phone_number_id: Some("pn-1".to_string()),
        version: 0,
        created_at: None,
        updated_at: None,
    }
}

pub fn trial_account(id: &str, used: f64, total: f64) -> Account {
    Account {
        id: id.to_string(),
        email: Some(format!("{}@example.com", id)),
        is_trial: true,
        trial_start_date: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
        trial_end_date: Some(Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap()),
        trial_minutes_used: used,
        trial_minutes_total: total,
        plan_type: "trial".to_string(),
        total_call_time: None,
    }
}

pub fn paid_account(id: &str) -> Account {
    Account {
        is_trial: false,
        trial_end_date: None,
        plan_type: "pro".to_string(),
        ..trial_account(id, 0.0, 0.0)
    }
}

pub fn trial_number(number: &str, owner: Option<&str>, created_at: DateTime<Utc>) -> PhoneNumber {
    PhoneNumber {
        phone_number: number.to_string(),
        owner_user_id: owner.map(str::to_string),
        provider_id: Some(format!("pn-{}", number.trim_start_matches('+'))),
        is_trial_number: true,
        status: if owner.is_some() {
            PhoneNumberStatus::Assigned
        } else {
            PhoneNumberStatus::Available
        },
        created_at,
    }
}

/// Router state over one in-memory store.
pub fn app_state(
    store: &Arc<MemoryStore>,
    provider: Arc<ScriptedProvider>,
    notifier: Arc<RecordingNotifier>,
) -> AppState {
    AppState {
        numbers: store.clone(),
        dispatcher: Arc::new(Dispatcher::new(store.clone(), provider, Duration::from_secs(5), 1)),
        usage: Arc::new(UsageService::new(store.clone(), notifier)),
    }
}
