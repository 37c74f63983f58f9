use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

pub const FREE_PLAN: &str = "free";

/// The subset of a user account the dialer jobs read and write.
#[derive(sqlx::FromRow)]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    pub id: String,
    pub email: Option<String>,
    pub is_trial: bool,
    pub trial_start_date: Option<DateTime<Utc>>,
    pub trial_end_date: Option<DateTime<Utc>>,
    pub trial_minutes_used: f64,
    pub trial_minutes_total: f64,
    pub plan_type: String,
    /// Lifetime minutes, historically stored as free text.
    pub total_call_time: Option<String>,
}

impl Account {
    pub fn trial_expired(&self, now: DateTime<Utc>) -> bool {
        self.is_trial && self.trial_end_date.is_some_and(|end| end < now)
    }

    pub fn lifetime_minutes(&self) -> f64 {
        parse_total_call_time(&self.id, self.total_call_time.as_deref())
    }

    /// Add a completed call. Trial accounts also consume trial minutes.
    pub fn add_call_minutes(&mut self, minutes: f64) {
        self.total_call_time = Some(format_minutes(self.lifetime_minutes() + minutes));
        if self.is_trial {
            self.trial_minutes_used += minutes;
        }
    }
}

/// Counters of one account before and after a call was added.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountUsageChange {
    pub before: Account,
    pub after: Account,
}

/// Stored lifetime minutes; anything unparseable counts as zero.
fn parse_total_call_time(user_id: &str, raw: Option<&str>) -> f64 {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return 0.0;
    };
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => value,
        _ => {
            tracing::warn!(user_id, total_call_time = raw, "Non-numeric total_call_time, treating as 0");
            0.0
        }
    }
}

fn format_minutes(minutes: f64) -> String {
    let rounded = (minutes * 100.0).round() / 100.0;
    rounded.to_string()
}

/// Partial update of the plan fields. `None` leaves a column untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountTrialUpdate {
    pub is_trial: Option<bool>,
    pub plan_type: Option<String>,
}

impl AccountTrialUpdate {
    pub fn is_empty(&self) -> bool {
        self.is_trial.is_none() && self.plan_type.is_none()
    }

    pub fn apply_to(&self, account: &mut Account) {
        if let Some(is_trial) = self.is_trial {
            account.is_trial = is_trial;
        }
        if let Some(plan) = &self.plan_type {
            account.plan_type = plan.clone();
        }
    }
}
