use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use mailroom_db::{CampaignStore, ContactStore, RecipientStore, Store};
use mailroom_types::models::{Campaign, CampaignStatus, Contact};

use crate::batch::BatchConfig;
use crate::error::DispatchError;
use crate::tokens::TokenIssuer;
use crate::transport::MailTransport;

/// Counts from one dispatch run. `skipped` covers contacts already recorded
/// for the campaign, including ones claimed by a concurrent run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub processed: usize,
    pub sent: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Runs a campaign's send loop. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct CampaignDispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    store: Arc<dyn Store>,
    transport: Arc<dyn MailTransport>,
    tokens: TokenIssuer,
    batch: Arc<BatchConfig>,
}

impl CampaignDispatcher {
    pub fn new(
        store: Arc<dyn Store>,
        transport: Arc<dyn MailTransport>,
        batch: Arc<BatchConfig>,
    ) -> Self {
        let tokens = TokenIssuer::new(store.clone());
        Self {
            inner: Arc::new(DispatcherInner {
                store,
                transport,
                tokens,
                batch,
            }),
        }
    }

    pub fn tokens(&self) -> &TokenIssuer {
        &self.inner.tokens
    }

    pub fn batch_config(&self) -> &Arc<BatchConfig> {
        &self.inner.batch
    }

    /// Run `dispatch` on its own task. The caller does not wait for it.
    pub fn spawn(&self, campaign_id: i64) -> JoinHandle<Result<DispatchSummary, DispatchError>> {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            let result = dispatcher.dispatch(campaign_id).await;
            if let Err(e) = &result {
                error!(campaign_id, "campaign_dispatch status=aborted reason={}", e);
            }
            result
        })
    }

    /// Send the campaign to every eligible contact not yet recorded for it,
    /// then mark it FINISHED.
    ///
    /// Individual delivery failures are recorded on the recipient row and
    /// never end the loop. The only errors returned are a missing campaign and
    /// a store failure while loading the campaign, its contacts, or writing the
    /// final status.
    pub async fn dispatch(&self, campaign_id: i64) -> Result<DispatchSummary, DispatchError> {
        let store = &self.inner.store;
        let campaign = store
            .get_campaign(campaign_id)?
            .ok_or(DispatchError::NotFound("Campaign not found"))?;

        let contacts = store.eligible_contacts()?;
        info!(
            campaign_id,
            eligible_contacts = contacts.len(),
            "campaign_dispatch status=started"
        );
        if contacts.is_empty() {
            warn!(campaign_id, "campaign_dispatch status=no_eligible_contacts");
        }

        let mut summary = DispatchSummary::default();
        let mut since_pause = 0u32;

        for (idx, contact) in contacts.iter().enumerate() {
            match store.recipient_exists(campaign.id, contact.id) {
                Ok(false) => {}
                Ok(true) => {
                    summary.skipped += 1;
                    continue;
                }
                Err(e) => {
                    error!(campaign_id, contact_id = contact.id, "Recipient lookup failed: {}", e);
                    summary.skipped += 1;
                    continue;
                }
            }

            // Record PENDING before sending so an interrupted run leaves a trace.
            let mut recipient = match store.insert_pending_recipient(campaign.id, contact.id) {
                Ok(Some(recipient)) => recipient,
                Ok(None) => {
                    debug!(campaign_id, contact_id = contact.id, "Recipient claimed by another dispatch");
                    summary.skipped += 1;
                    continue;
                }
                Err(e) => {
                    error!(campaign_id, contact_id = contact.id, "Recipient insert failed: {}", e);
                    summary.skipped += 1;
                    continue;
                }
            };

            match self.deliver(&campaign, contact).await {
                Ok(()) => {
                    recipient.mark_sent(Utc::now());
                    summary.sent += 1;
                }
                Err(reason) => {
                    error!(
                        campaign_id,
                        contact_id = contact.id,
                        email = %contact.email,
                        reason = %reason,
                        "campaign_dispatch status=send_failed"
                    );
                    recipient.mark_failed(reason);
                    summary.failed += 1;
                }
            }

            if let Err(e) = store.update_recipient(&recipient) {
                error!(
                    campaign_id,
                    contact_id = contact.id,
                    status = %recipient.status,
                    "Recipient update failed: {}",
                    e
                );
            }

            summary.processed += 1;
            since_pause += 1;

            // Re-read at every boundary so admin changes apply mid-campaign.
            let settings = self.inner.batch.get();
            if since_pause >= settings.batch_size {
                since_pause = 0;
                let more_remaining = idx + 1 < contacts.len();
                if more_remaining && settings.batch_interval_seconds > 0 {
                    debug!(
                        campaign_id,
                        processed = summary.processed,
                        pause_secs = settings.batch_interval_seconds,
                        "campaign_dispatch status=batch_pause"
                    );
                    tokio::time::sleep(settings.interval()).await;
                }
            }
        }

        store.set_campaign_status(campaign.id, CampaignStatus::Finished)?;
        info!(
            campaign_id,
            processed = summary.processed,
            sent = summary.sent,
            failed = summary.failed,
            skipped = summary.skipped,
            "campaign_dispatch status=finished"
        );

        Ok(summary)
    }

    async fn deliver(&self, campaign: &Campaign, contact: &Contact) -> Result<(), String> {
        let token = self
            .inner
            .tokens
            .get_or_create_token(contact.id)
            .map_err(|e| e.to_string())?;

        self.inner
            .transport
            .send(campaign, contact, &token)
            .await
            .map_err(|e| e.to_string())
    }
}
