//! Campaign automation
//!
//! This module drives the periodic work of the dialer:
//! - the campaign poll, which dispatches calls for started campaigns that are
//!   inside business hours
//! - the trial expiry and trial-number hold sweeps
//! - the cron scheduler that runs all three

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use super::business_hours::campaign_is_open;
use super::config::AppConfig;
use super::db::CampaignStore;
use super::dispatcher::{DispatchError, DispatchRequest, Dispatcher};
use super::trials::TrialService;
use crate::models::{Campaign, CampaignStatus, ClientCallState};

/// Outcome of one poll pass
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct PollSummary {
    pub campaigns_checked: usize,
    pub campaigns_dispatched: usize,
    pub campaigns_finished: usize,
    pub skipped_closed: usize,
    pub skipped_misconfigured: usize,
    pub failed: usize,
    pub calls_initiated: usize,
}

/// Finds started campaigns that may dial right now and hands them to the
/// dispatcher.
pub struct CampaignPoller {
    campaigns: Arc<dyn CampaignStore>,
    dispatcher: Arc<Dispatcher>,
    max_calls: usize,
}

enum CampaignOutcome {
    Dispatched(usize),
    Finished,
    Closed,
    Misconfigured,
}

impl CampaignPoller {
    pub fn new(campaigns: Arc<dyn CampaignStore>, dispatcher: Arc<Dispatcher>, max_calls: usize) -> Self {
        Self {
            campaigns,
            dispatcher,
            max_calls,
        }
    }

    pub async fn poll_once(&self) -> PollSummary {
        self.poll_at(Utc::now()).await
    }

    /// One pass over all campaigns, evaluated at `now`. A failing campaign is
    /// logged and counted; it never stops the pass.
    pub async fn poll_at(&self, now: DateTime<Utc>) -> PollSummary {
        let mut summary = PollSummary::default();

        let campaigns = match self.campaigns.list_campaigns().await {
            Ok(campaigns) => campaigns,
            Err(e) => {
                tracing::error!("Failed to list campaigns: {}", e);
                return summary;
            }
        };

        for campaign in campaigns.into_iter().filter(Campaign::is_started) {
            summary.campaigns_checked += 1;
            let campaign_id = campaign.id;

            match self.process_campaign(&campaign, now).await {
                Ok(CampaignOutcome::Dispatched(calls)) => {
                    summary.campaigns_dispatched += 1;
                    summary.calls_initiated += calls;
                }
                Ok(CampaignOutcome::Finished) => summary.campaigns_finished += 1,
                Ok(CampaignOutcome::Closed) => summary.skipped_closed += 1,
                Ok(CampaignOutcome::Misconfigured) => summary.skipped_misconfigured += 1,
                Err(e) => {
                    tracing::error!(%campaign_id, user_id = %campaign.user_id, "Campaign poll failed: {}", e);
                    summary.failed += 1;
                }
            }
        }

        if summary.campaigns_checked > 0 {
            tracing::info!(
                checked = summary.campaigns_checked,
                dispatched = summary.campaigns_dispatched,
                calls = summary.calls_initiated,
                failed = summary.failed,
                "Campaign poll complete"
            );
        }
        summary
    }

    async fn process_campaign(
        &self,
        campaign: &Campaign,
        now: DateTime<Utc>,
    ) -> Result<CampaignOutcome, DispatchError> {
        let campaign_id = campaign.id;

        if all_called(campaign) {
            self.campaigns
                .update_campaign_status(campaign_id, CampaignStatus::Finished)
                .await?;
            tracing::info!(%campaign_id, "All clients called, campaign finished");
            return Ok(CampaignOutcome::Finished);
        }

        if !campaign_is_open(campaign, Some(now)) {
            tracing::debug!(%campaign_id, "Outside business hours");
            return Ok(CampaignOutcome::Closed);
        }

        let (Some(assistant_id), Some(phone_number_id)) = (
            non_empty(campaign.assistant_id.as_deref()),
            non_empty(campaign.phone_number_id.as_deref()),
        ) else {
            tracing::warn!(%campaign_id, "Campaign has no assistant or phone number, skipping");
            return Ok(CampaignOutcome::Misconfigured);
        };

        let request = DispatchRequest {
            campaign_id,
            user_id: campaign.user_id.clone(),
            assistant_id: assistant_id.to_string(),
            phone_number_id: phone_number_id.to_string(),
            max_calls: self.max_calls,
        };

        let result = self.dispatcher.dispatch_calls(&request).await?;
        Ok(CampaignOutcome::Dispatched(result.calls_initiated))
    }
}

fn all_called(campaign: &Campaign) -> bool {
    !campaign.clients.is_empty()
        && campaign
            .clients
            .iter()
            .all(|c| c.status.status == ClientCallState::Called)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Register the poll and sweep jobs and start the scheduler.
pub async fn start_scheduler(
    config: &AppConfig,
    poller: Arc<CampaignPoller>,
    trials: Arc<TrialService>,
) -> Result<JobScheduler, JobSchedulerError> {
    let sched = JobScheduler::new().await?;

    sched
        .add(Job::new_async(config.poll_cron.as_str(), move |_uuid, _lock| {
            let poller = poller.clone();
            Box::pin(async move {
                poller.poll_once().await;
            })
        })?)
        .await?;

    let expiry = trials.clone();
    sched
        .add(Job::new_async(config.trial_sweep_cron.as_str(), move |_uuid, _lock| {
            let trials = expiry.clone();
            Box::pin(async move {
                let summary = trials.expire_trials(Utc::now()).await;
                tracing::info!(?summary, "Trial expiry sweep complete");
            })
        })?)
        .await?;

    sched
        .add(Job::new_async(config.number_sweep_cron.as_str(), move |_uuid, _lock| {
            let trials = trials.clone();
            Box::pin(async move {
                let summary = trials.enforce_trial_number_hold(Utc::now()).await;
                tracing::info!(?summary, "Trial number hold sweep complete");
            })
        })?)
        .await?;

    sched.start().await?;
    tracing::info!(
        poll = %config.poll_cron,
        trial_sweep = %config.trial_sweep_cron,
        number_sweep = %config.number_sweep_cron,
        "Scheduler started"
    );
    Ok(sched)
}
