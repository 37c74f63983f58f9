use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{BusinessInformation, Client, ClientCallState};

/// An outbound calling campaign, validated at the store boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Campaign {
    pub id: Uuid,
    pub user_id: String,
    pub name: String,
    pub status: CampaignStatus,
    #[serde(default)]
    pub business_information: BusinessInformation,
    #[serde(default)]
    pub clients: Vec<Client>,
    /// Message-taking instructions handed to the assistant as-is.
    #[serde(default)]
    pub message_taking: serde_json::Value,
    #[serde(default)]
    pub agent_details: AgentDetails,
    pub assistant_id: Option<String>,
    pub phone_number_id: Option<String>,
    /// Bumped on every client-list write; used for optimistic concurrency.
    #[serde(default)]
    pub version: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Campaign {
    pub fn is_started(&self) -> bool {
        self.status == CampaignStatus::Started
    }

    pub fn queued_count(&self) -> usize {
        self.clients.iter().filter(|c| c.is_queued()).count()
    }

    /// Index of the client currently holding `call_id`.
    pub fn client_by_call_id(&self, call_id: &str) -> Option<usize> {
        self.clients
            .iter()
            .position(|c| c.status.call_id.as_deref() == Some(call_id))
    }

    /// In-progress client with no recorded call, left behind when a placement
    /// went out but its outcome was never stored.
    pub fn unrecorded_client(&self, phone_number: &str) -> Option<usize> {
        self.clients.iter().position(|c| {
            c.phone_number == phone_number
                && c.status.status == ClientCallState::InProgress
                && c.status.call_id.is_none()
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Created,
    Started,
    Paused,
    Finished,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Created => "created",
            CampaignStatus::Started => "started",
            CampaignStatus::Paused => "paused",
            CampaignStatus::Finished => "finished",
        }
    }
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CampaignStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "created" => Ok(CampaignStatus::Created),
            "started" => Ok(CampaignStatus::Started),
            "paused" => Ok(CampaignStatus::Paused),
            "finished" => Ok(CampaignStatus::Finished),
            other => Err(format!("unknown campaign status: {}", other)),
        }
    }
}

/// Agent call policy. Carried through to the call metadata; the dialer
/// itself does not schedule retries from it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AgentDetails {
    #[serde(default, alias = "cool_off", alias = "coolOff")]
    pub cool_off_seconds: Option<u64>,
    #[serde(default, alias = "max_retries", alias = "numberOfRetries")]
    pub number_of_retries: Option<u32>,
}
