use serde::{Deserialize, Deserializer, Serialize};

/// One call target inside a campaign's client list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Client {
    #[serde(default)]
    pub name: Option<String>,
    pub phone_number: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub personal_details: Option<serde_json::Value>,
    #[serde(default, deserialize_with = "lenient_status")]
    pub status: ClientStatus,
    /// Columns from the CSV import that this service does not interpret.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Client {
    pub fn new(name: &str, phone_number: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            phone_number: phone_number.to_string(),
            language: None,
            personal_details: None,
            status: ClientStatus::default(),
            extra: serde_json::Map::new(),
        }
    }

    pub fn is_queued(&self) -> bool {
        self.status.status == ClientCallState::Queued
    }

    /// Claim the client for a placement attempt.
    pub fn claim(&mut self) {
        self.status.status = ClientCallState::InProgress;
    }

    /// Record a successful placement.
    pub fn mark_placed(&mut self, call_id: String) {
        self.status.status = ClientCallState::InProgress;
        self.status.number_of_calls = self.status.number_of_calls.saturating_add(1);
        self.status.call_id = Some(call_id);
    }

    /// Return a claimed client to the queue after a failed placement.
    pub fn release(&mut self) {
        self.status.status = ClientCallState::Queued;
    }

    pub fn mark_called(&mut self) {
        self.status.status = ClientCallState::Called;
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClientStatus {
    #[serde(default)]
    pub status: ClientCallState,
    #[serde(default)]
    pub number_of_calls: u32,
    #[serde(default)]
    pub call_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClientCallState {
    #[default]
    Queued,
    InProgress,
    Called,
}

/// Malformed status records fall back to a fresh queued status.
fn lenient_status<'de, D>(deserializer: D) -> Result<ClientStatus, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    if raw.is_null() {
        return Ok(ClientStatus::default());
    }
    match serde_json::from_value::<ClientStatus>(raw.clone()) {
        Ok(status) => Ok(status),
        Err(e) => {
            tracing::warn!(status = %raw, "Malformed client status, resetting to queued: {}", e);
            Ok(ClientStatus::default())
        }
    }
}
