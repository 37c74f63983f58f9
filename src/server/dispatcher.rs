//! Outbound call dispatcher
//!
//! Turns queued campaign clients into call-placement requests:
//! - at most `max_calls` clients per invocation, in list order
//! - selected clients are claimed (persisted as `in_progress`) before any
//!   provider request goes out, so a re-triggered poll cannot dial them twice
//! - one failed placement never aborts the rest of the batch
//! - one dispatch per campaign at a time (keyed lock) and version-checked
//!   writes against other processes

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use super::config::MAX_CALLS_CEILING;
use super::db::{CampaignStore, StoreError};
use super::locks::KeyedLocks;
use super::vapi::{CallProvider, CallProviderError, CallRequest, PlacedCall};
use crate::models::{Campaign, Client, ClientCallState};

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchRequest {
    pub campaign_id: Uuid,
    pub user_id: String,
    pub assistant_id: String,
    pub phone_number_id: String,
    pub max_calls: usize,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct DispatchSummary {
    pub success: bool,
    pub calls_initiated: usize,
    pub errors: Vec<DispatchFailure>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DispatchFailure {
    pub phone_number: String,
    pub message: String,
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("max_calls must be between 1 and {max}, got {0}", max = MAX_CALLS_CEILING)]
    InvalidMaxCalls(usize),

    #[error("Campaign not found: {0}")]
    CampaignNotFound(Uuid),

    #[error("Campaign {campaign_id} does not belong to user {user_id}")]
    NotOwner { campaign_id: Uuid, user_id: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

pub struct Dispatcher {
    campaigns: Arc<dyn CampaignStore>,
    provider: Arc<dyn CallProvider>,
    locks: Arc<KeyedLocks<Uuid>>,
    call_timeout: Duration,
    concurrency: usize,
}

impl Dispatcher {
    pub fn new(
        campaigns: Arc<dyn CampaignStore>,
        provider: Arc<dyn CallProvider>,
        call_timeout: Duration,
        concurrency: usize,
    ) -> Self {
        Self {
            campaigns,
            provider,
            locks: KeyedLocks::new(),
            call_timeout,
            concurrency: concurrency.max(1),
        }
    }

    /// Place calls for up to `max_calls` queued clients of one campaign.
    pub async fn dispatch_calls(&self, request: &DispatchRequest) -> Result<DispatchSummary, DispatchError> {
        if request.max_calls == 0 || request.max_calls > MAX_CALLS_CEILING {
            return Err(DispatchError::InvalidMaxCalls(request.max_calls));
        }

        let campaign_id = request.campaign_id;
        let _guard = self.locks.lock(campaign_id).await;

        let campaign = self
            .campaigns
            .get_campaign(campaign_id)
            .await?
            .ok_or(DispatchError::CampaignNotFound(campaign_id))?;

        if campaign.user_id != request.user_id {
            return Err(DispatchError::NotOwner {
                campaign_id,
                user_id: request.user_id.clone(),
            });
        }

        let selected = select_queued(&campaign.clients, request.max_calls);
        if selected.is_empty() {
            tracing::debug!(%campaign_id, "No queued clients");
            return Ok(DispatchSummary {
                success: true,
                ..DispatchSummary::default()
            });
        }

        // Claim before dialing.
        let mut clients = campaign.clients.clone();
        for &i in &selected {
            clients[i].claim();
        }
        let version = self
            .campaigns
            .update_campaign_clients(campaign_id, &clients, campaign.version)
            .await?;

        let requests: Vec<(usize, CallRequest)> = selected
            .iter()
            .map(|&i| (i, build_call_request(&campaign, &clients[i], request)))
            .collect();

        let concurrency = self.concurrency.min(request.max_calls);
        let outcomes: Vec<(usize, Result<PlacedCall, CallProviderError>)> = stream::iter(requests)
            .map(|(i, call)| async move { (i, self.place_with_timeout(&call).await) })
            .buffered(concurrency)
            .collect()
            .await;

        let mut summary = DispatchSummary {
            success: true,
            ..DispatchSummary::default()
        };

        for (i, outcome) in outcomes {
            let client = &mut clients[i];
            match outcome {
                Ok(placed) => {
                    tracing::info!(
                        %campaign_id,
                        phone_number = %client.phone_number,
                        call_id = %placed.call_id,
                        status = placed.status.as_deref().unwrap_or("unknown"),
                        "Call placed"
                    );
                    client.mark_placed(placed.call_id);
                    summary.calls_initiated += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        %campaign_id,
                        phone_number = %client.phone_number,
                        "Call placement failed, client re-queued: {}",
                        e
                    );
                    client.release();
                    summary.errors.push(DispatchFailure {
                        phone_number: client.phone_number.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        let written = match self
            .campaigns
            .update_campaign_clients(campaign_id, &clients, version)
            .await
        {
            Err(StoreError::VersionConflict { .. }) => {
                tracing::warn!(%campaign_id, "Campaign changed during dispatch, re-applying outcomes");
                let batch: Vec<Client> = selected.iter().map(|&i| clients[i].clone()).collect();
                self.rewrite_outcomes(campaign_id, &batch).await
            }
            other => other,
        };

        if let Err(e) = written {
            // Claimed clients stay in_progress in the store, so they are not re-dialed.
            tracing::error!(
                %campaign_id,
                calls_initiated = summary.calls_initiated,
                "Failed to persist call outcomes: {}",
                e
            );
            return Err(e.into());
        }

        Ok(summary)
    }

    /// Apply `batch` onto the current client list, matching by phone number.
    async fn rewrite_outcomes(&self, campaign_id: Uuid, batch: &[Client]) -> Result<i64, StoreError> {
        let campaign = self
            .campaigns
            .get_campaign(campaign_id)
            .await?
            .ok_or(StoreError::CampaignNotFound(campaign_id))?;

        let mut clients = campaign.clients;
        for outcome in batch {
            if let Some(client) = clients.iter_mut().find(|c| {
                c.phone_number == outcome.phone_number && c.status.status == ClientCallState::InProgress
            }) {
                client.status = outcome.status.clone();
            }
        }

        self.campaigns
            .update_campaign_clients(campaign_id, &clients, campaign.version)
            .await
    }

    /// Mark the client holding `call_id` as called. A client whose placement
    /// was never recorded is matched by `customer_number` instead. Returns
    /// false when no in-progress client matches, e.g. for a repeated report.
    pub async fn complete_call(
        &self,
        campaign_id: Uuid,
        call_id: &str,
        customer_number: Option<&str>,
    ) -> Result<bool, DispatchError> {
        let _guard = self.locks.lock(campaign_id).await;

        let campaign = self
            .campaigns
            .get_campaign(campaign_id)
            .await?
            .ok_or(DispatchError::CampaignNotFound(campaign_id))?;

        let index = campaign
            .client_by_call_id(call_id)
            .or_else(|| customer_number.and_then(|n| campaign.unrecorded_client(n)));
        let Some(index) = index else {
            tracing::debug!(%campaign_id, call_id, "No client holds this call");
            return Ok(false);
        };
        if campaign.clients[index].status.status != ClientCallState::InProgress {
            return Ok(false);
        }

        let mut clients = campaign.clients.clone();
        if clients[index].status.call_id.is_none() {
            clients[index].mark_placed(call_id.to_string());
        }
        clients[index].mark_called();
        self.campaigns
            .update_campaign_clients(campaign_id, &clients, campaign.version)
            .await?;

        tracing::info!(%campaign_id, call_id, "Client marked called");
        Ok(true)
    }

    async fn place_with_timeout(&self, call: &CallRequest) -> Result<PlacedCall, CallProviderError> {
        match tokio::time::timeout(self.call_timeout, self.provider.place_call(call)).await {
            Ok(result) => result,
            Err(_) => Err(CallProviderError::Timeout(self.call_timeout)),
        }
    }
}

/// Indexes of the first `max_calls` queued clients, in list order.
pub fn select_queued(clients: &[Client], max_calls: usize) -> Vec<usize> {
    clients
        .iter()
        .enumerate()
        .filter(|(_, c)| c.is_queued())
        .map(|(i, _)| i)
        .take(max_calls)
        .collect()
}

fn build_call_request(campaign: &Campaign, client: &Client, request: &DispatchRequest) -> CallRequest {
    let metadata = serde_json::json!({
        "campaign_id": campaign.id.to_string(),
        "user_id": campaign.user_id,
        "client_name": client.name,
        "language": client.language,
        "personal_details": client.personal_details,
        "message_taking": campaign.message_taking,
        "cool_off_seconds": campaign.agent_details.cool_off_seconds,
        "number_of_retries": campaign.agent_details.number_of_retries,
    });

    CallRequest {
        assistant_id: request.assistant_id.clone(),
        phone_number_id: request.phone_number_id.clone(),
        customer_number: client.phone_number.clone(),
        customer_name: client.name.clone(),
        metadata,
    }
}
