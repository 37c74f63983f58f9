use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhoneNumber {
    pub phone_number: String,
    pub owner_user_id: Option<String>,
    /// The call provider's id for this number.
    pub provider_id: Option<String>,
    pub is_trial_number: bool,
    pub status: PhoneNumberStatus,
    pub created_at: DateTime<Utc>,
}

impl PhoneNumber {
    pub fn is_released(&self) -> bool {
        self.status == PhoneNumberStatus::Released && self.owner_user_id.is_none()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PhoneNumberStatus {
    Available,
    Assigned,
    Released,
}

impl PhoneNumberStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhoneNumberStatus::Available => "available",
            PhoneNumberStatus::Assigned => "assigned",
            PhoneNumberStatus::Released => "released",
        }
    }
}

impl std::str::FromStr for PhoneNumberStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "available" => Ok(PhoneNumberStatus::Available),
            "assigned" => Ok(PhoneNumberStatus::Assigned),
            "released" => Ok(PhoneNumberStatus::Released),
            other => Err(format!("unknown phone number status: {}", other)),
        }
    }
}
