//! VAPI server-message webhook
//!
//! End-of-call reports feed usage accounting and close out the campaign
//! client that was dialed. Every parsed message is acknowledged with 200 so
//! the provider does not retry on our internal failures.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use uuid::Uuid;

use super::vapi::VapiWebhookEvent;
use super::AppState;

pub async fn handle_vapi_webhook(
    State(state): State<Arc<AppState>>,
    Json(event): Json<VapiWebhookEvent>,
) -> StatusCode {
    tracing::info!("Received VAPI webhook: {}", event.event_type());

    if event.is_end_of_call_report() {
        process_end_of_call(&state, &event).await;
    }

    StatusCode::OK
}

async fn process_end_of_call(state: &AppState, event: &VapiWebhookEvent) {
    let call_id = event.call_id().unwrap_or_default();
    let minutes = event.duration_minutes();
    tracing::info!(
        call_id,
        minutes,
        ended_reason = event.message.ended_reason.as_deref().unwrap_or("unknown"),
        customer_number = event.customer_number().unwrap_or("unknown"),
        "Call ended"
    );

    // A repeated report for a call that was already completed adds no usage.
    if let Some(campaign_id) = event
        .metadata_str("campaign_id")
        .and_then(|raw| Uuid::parse_str(raw).ok())
        .filter(|_| !call_id.is_empty())
    {
        match state
            .dispatcher
            .complete_call(campaign_id, call_id, event.customer_number())
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                tracing::info!(%campaign_id, call_id, "Call already completed, usage not recorded again");
                return;
            }
            Err(e) => tracing::error!(%campaign_id, call_id, "Failed to mark client called: {}", e),
        }
    }

    match resolve_user(state, event).await {
        Some(user_id) => {
            if let Err(e) = state.usage.record_call_usage(&user_id, minutes).await {
                tracing::error!(%user_id, call_id, "Failed to record call usage: {}", e);
            }
        }
        None => tracing::warn!(call_id, "Could not resolve the user for an ended call"),
    }
}

/// Owner of the number the call was placed from, else the user id the
/// dispatcher attached to the call.
async fn resolve_user(state: &AppState, event: &VapiWebhookEvent) -> Option<String> {
    if let Some(provider_id) = event.phone_number_id() {
        match state.numbers.find_by_provider_id(provider_id).await {
            Ok(Some(number)) => {
                if let Some(owner) = number.owner_user_id {
                    return Some(owner);
                }
            }
            Ok(None) => tracing::debug!(provider_id, "No phone number record for provider id"),
            Err(e) => tracing::error!(provider_id, "Phone number lookup failed: {}", e),
        }
    }

    event
        .metadata_str("user_id")
        .filter(|u| !u.is_empty())
        .map(str::to_string)
}
