//! VAPI call API client and webhook payloads

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CallProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("Missing call ID in provider response")]
    MissingCallId,
    #[error("Call placement timed out after {0:?}")]
    Timeout(Duration),
}

/// Everything the provider needs to place one outbound call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallRequest {
    pub assistant_id: String,
    pub phone_number_id: String,
    pub customer_number: String,
    pub customer_name: Option<String>,
    /// Echoed back by the provider on every webhook for this call
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedCall {
    pub call_id: String,
    pub status: Option<String>,
}

/// Outbound call placement, implemented by `VapiClient` in production.
#[async_trait::async_trait]
pub trait CallProvider: Send + Sync {
    async fn place_call(&self, request: &CallRequest) -> Result<PlacedCall, CallProviderError>;
}

#[derive(Clone)]
pub struct VapiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl VapiClient {
    pub fn new(api_key: String, base_url: String, timeout: Duration) -> Result<Self, CallProviderError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post<T: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<R, CallProviderError> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(CallProviderError::Api {
                status: status.as_u16(),
                message: error_text,
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait::async_trait]
impl CallProvider for VapiClient {
    /// Initiate an outbound call
    async fn place_call(&self, request: &CallRequest) -> Result<PlacedCall, CallProviderError> {
        let body = CreateCallRequest {
            assistant_id: &request.assistant_id,
            phone_number_id: &request.phone_number_id,
            customer: Customer {
                number: &request.customer_number,
                name: request.customer_name.as_deref(),
            },
            assistant_overrides: AssistantOverrides {
                variable_values: &request.metadata,
            },
            metadata: &request.metadata,
        };

        let response: CreateCallResponse = self.post("/call", &body).await?;
        match response.id {
            Some(call_id) if !call_id.is_empty() => Ok(PlacedCall {
                call_id,
                status: response.status,
            }),
            _ => Err(CallProviderError::MissingCallId),
        }
    }
}

// Request/Response types

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateCallRequest<'a> {
    assistant_id: &'a str,
    phone_number_id: &'a str,
    customer: Customer<'a>,
    assistant_overrides: AssistantOverrides<'a>,
    metadata: &'a serde_json::Value,
}

#[derive(Serialize)]
struct Customer<'a> {
    number: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AssistantOverrides<'a> {
    variable_values: &'a serde_json::Value,
}

#[derive(Deserialize)]
struct CreateCallResponse {
    id: Option<String>,
    status: Option<String>,
}

// Webhook event types

/// Server message envelope posted by VAPI.
#[derive(Debug, Deserialize)]
pub struct VapiWebhookEvent {
    pub message: WebhookMessage,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    pub ended_reason: Option<String>,
    pub call: Option<WebhookCall>,
    pub duration_seconds: Option<f64>,
    pub duration_minutes: Option<f64>,
    pub phone_number: Option<WebhookPhoneNumber>,
    pub customer: Option<WebhookCustomer>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookCall {
    pub id: String,
    pub phone_number_id: Option<String>,
    pub customer: Option<WebhookCustomer>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookCustomer {
    pub number: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookPhoneNumber {
    pub id: Option<String>,
    pub number: Option<String>,
}

impl VapiWebhookEvent {
    pub fn event_type(&self) -> &str {
        &self.message.message_type
    }

    pub fn is_end_of_call_report(&self) -> bool {
        self.event_type() == "end-of-call-report"
    }

    pub fn call_id(&self) -> Option<&str> {
        self.message.call.as_ref().map(|c| c.id.as_str())
    }

    /// Call duration in minutes, preferring the provider's own figure.
    pub fn duration_minutes(&self) -> f64 {
        self.message
            .duration_minutes
            .or_else(|| self.message.duration_seconds.map(|s| s / 60.0))
            .filter(|m| m.is_finite() && *m > 0.0)
            .unwrap_or(0.0)
    }

    pub fn customer_number(&self) -> Option<&str> {
        self.message
            .customer
            .as_ref()
            .or_else(|| self.message.call.as_ref().and_then(|c| c.customer.as_ref()))
            .and_then(|c| c.number.as_deref())
    }

    /// The provider's id of the number the call was placed from.
    pub fn phone_number_id(&self) -> Option<&str> {
        self.message
            .call
            .as_ref()
            .and_then(|c| c.phone_number_id.as_deref())
            .or_else(|| self.message.phone_number.as_ref().and_then(|p| p.id.as_deref()))
    }

    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.message
            .call
            .as_ref()
            .and_then(|c| c.metadata.as_ref())
            .and_then(|m| m.get(key))
            .and_then(|v| v.as_str())
    }
}
