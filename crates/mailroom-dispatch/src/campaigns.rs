use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::info;

use mailroom_db::{CampaignStore, RecipientStore, Store};
use mailroom_types::api::{CampaignErrorLog, CampaignStatusResponse, CampaignSuccessLog};
use mailroom_types::models::{Campaign, CampaignStatus, RecipientStatus};

use crate::batch::BatchSettings;
use crate::dispatcher::{CampaignDispatcher, DispatchSummary};
use crate::error::DispatchError;

/// Size of each log list in a status report.
pub const RECENT_LOG_LIMIT: usize = 50;

/// Admin-facing campaign operations.
#[derive(Clone)]
pub struct CampaignService {
    store: Arc<dyn Store>,
    dispatcher: CampaignDispatcher,
}

impl CampaignService {
    pub fn new(store: Arc<dyn Store>, dispatcher: CampaignDispatcher) -> Self {
        Self { store, dispatcher }
    }

    pub fn create(
        &self,
        title: &str,
        subject: &str,
        html_body: &str,
    ) -> Result<Campaign, DispatchError> {
        let title = title.trim();
        let subject = subject.trim();
        if title.is_empty() {
            return Err(DispatchError::validation("Title is required."));
        }
        if subject.is_empty() {
            return Err(DispatchError::validation("Subject is required."));
        }
        if html_body.trim().is_empty() {
            return Err(DispatchError::validation("HTML body is required."));
        }

        let campaign = self
            .store
            .insert_campaign(title, subject, html_body, Utc::now())?;
        info!(campaign_id = campaign.id, "Campaign created");
        Ok(campaign)
    }

    pub fn schedule(
        &self,
        campaign_id: i64,
        scheduled_at: DateTime<Utc>,
    ) -> Result<Campaign, DispatchError> {
        let campaign = self.find(campaign_id)?;
        let rejected = || {
            DispatchError::validation(format!(
                "Campaign is already {} and cannot be scheduled.",
                campaign.status
            ))
        };

        if !campaign.status.can_transition_to(CampaignStatus::Scheduled) {
            return Err(rejected());
        }
        // Conditional in the store too; a concurrent claim may have won.
        if !self.store.schedule_campaign(campaign_id, scheduled_at)? {
            return Err(rejected());
        }

        info!(campaign_id, %scheduled_at, "Campaign scheduled");
        self.find(campaign_id)
    }

    /// Forces the campaign into SENDING and starts dispatch in the background.
    pub fn send_now(
        &self,
        campaign_id: i64,
    ) -> Result<JoinHandle<Result<DispatchSummary, DispatchError>>, DispatchError> {
        if !self
            .store
            .set_campaign_status(campaign_id, CampaignStatus::Sending)?
        {
            return Err(DispatchError::NotFound("Campaign not found"));
        }

        info!(campaign_id, "Campaign dispatch requested");
        Ok(self.dispatcher.spawn(campaign_id))
    }

    pub fn status(&self, campaign_id: i64) -> Result<CampaignStatusResponse, DispatchError> {
        let campaign = self.find(campaign_id)?;

        let pending = self
            .store
            .count_recipients(campaign_id, RecipientStatus::Pending)?;
        let sent = self.store.count_recipients(campaign_id, RecipientStatus::Sent)?;
        let failed = self
            .store
            .count_recipients(campaign_id, RecipientStatus::Failed)?;

        let recent_successes = self
            .store
            .recent_successes(campaign_id, RECENT_LOG_LIMIT)?
            .into_iter()
            .map(|log| CampaignSuccessLog {
                email: log.email,
                sent_at: log.sent_at,
            })
            .collect();

        let recent_failures = self
            .store
            .recent_failures(campaign_id, RECENT_LOG_LIMIT)?
            .into_iter()
            .map(|log| CampaignErrorLog {
                email: log.email,
                error_message: log.error_message,
                sent_at: log.sent_at,
            })
            .collect();

        Ok(CampaignStatusResponse {
            campaign_id: campaign.id,
            status: campaign.status,
            pending,
            sent,
            failed,
            recent_successes,
            recent_failures,
        })
    }

    pub fn batch_config(&self) -> BatchSettings {
        self.dispatcher.batch_config().get()
    }

    pub fn update_batch_config(
        &self,
        batch_size: i64,
        batch_interval_seconds: i64,
    ) -> Result<BatchSettings, DispatchError> {
        let settings = self
            .dispatcher
            .batch_config()
            .update(batch_size, batch_interval_seconds)?;
        info!(
            batch_size = settings.batch_size,
            batch_interval_seconds = settings.batch_interval_seconds,
            "Batch config updated"
        );
        Ok(settings)
    }

    fn find(&self, campaign_id: i64) -> Result<Campaign, DispatchError> {
        self.store
            .get_campaign(campaign_id)?
            .ok_or(DispatchError::NotFound("Campaign not found"))
    }
}
