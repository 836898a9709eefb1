//! Store wrapper for exercising error paths in unit tests.

use std::collections::HashSet;

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};

use mailroom_db::{CampaignStore, ContactStore, MemoryStore, RecipientStore, TokenStore};
use mailroom_types::models::{
    Campaign, CampaignRecipient, CampaignStatus, Contact, NewContact, RecipientLog,
    RecipientStatus, UnsubscribeToken,
};

/// Delegates to a `MemoryStore`, failing chosen claims and recipient updates.
#[derive(Default)]
pub struct FailingStore {
    pub inner: MemoryStore,
    pub fail_claim_for: HashSet<i64>,
    pub fail_update_for_contact: HashSet<i64>,
}

impl ContactStore for FailingStore {
    fn insert_contact(
        &self,
        contact: &NewContact,
        created_at: DateTime<Utc>,
    ) -> Result<Option<Contact>> {
        self.inner.insert_contact(contact, created_at)
    }

    fn get_contact(&self, id: i64) -> Result<Option<Contact>> {
        self.inner.get_contact(id)
    }

    fn find_contact_by_email(&self, email: &str) -> Result<Option<Contact>> {
        self.inner.find_contact_by_email(email)
    }

    fn list_contacts(&self) -> Result<Vec<Contact>> {
        self.inner.list_contacts()
    }

    fn eligible_contacts(&self) -> Result<Vec<Contact>> {
        self.inner.eligible_contacts()
    }

    fn mark_contact_unsubscribed(&self, id: i64, at: DateTime<Utc>) -> Result<bool> {
        self.inner.mark_contact_unsubscribed(id, at)
    }
}

impl CampaignStore for FailingStore {
    fn insert_campaign(
        &self,
        title: &str,
        subject: &str,
        html_body: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Campaign> {
        self.inner.insert_campaign(title, subject, html_body, created_at)
    }

    fn get_campaign(&self, id: i64) -> Result<Option<Campaign>> {
        self.inner.get_campaign(id)
    }

    fn schedule_campaign(&self, id: i64, at: DateTime<Utc>) -> Result<bool> {
        self.inner.schedule_campaign(id, at)
    }

    fn set_campaign_status(&self, id: i64, status: CampaignStatus) -> Result<bool> {
        self.inner.set_campaign_status(id, status)
    }

    fn claim_due_campaign(&self, id: i64, now: DateTime<Utc>) -> Result<bool> {
        if self.fail_claim_for.contains(&id) {
            bail!("database is locked");
        }
        self.inner.claim_due_campaign(id, now)
    }

    fn due_campaigns(&self, now: DateTime<Utc>) -> Result<Vec<Campaign>> {
        self.inner.due_campaigns(now)
    }
}

impl RecipientStore for FailingStore {
    fn recipient_exists(&self, campaign_id: i64, contact_id: i64) -> Result<bool> {
        self.inner.recipient_exists(campaign_id, contact_id)
    }

    fn insert_pending_recipient(
        &self,
        campaign_id: i64,
        contact_id: i64,
    ) -> Result<Option<CampaignRecipient>> {
        self.inner.insert_pending_recipient(campaign_id, contact_id)
    }

    fn update_recipient(&self, recipient: &CampaignRecipient) -> Result<()> {
        if self.fail_update_for_contact.contains(&recipient.contact_id) {
            bail!("disk I/O error");
        }
        self.inner.update_recipient(recipient)
    }

    fn recipients_for_campaign(&self, campaign_id: i64) -> Result<Vec<CampaignRecipient>> {
        self.inner.recipients_for_campaign(campaign_id)
    }

    fn count_recipients(&self, campaign_id: i64, status: RecipientStatus) -> Result<u64> {
        self.inner.count_recipients(campaign_id, status)
    }

    fn recent_failures(&self, campaign_id: i64, limit: usize) -> Result<Vec<RecipientLog>> {
        self.inner.recent_failures(campaign_id, limit)
    }

    fn recent_successes(&self, campaign_id: i64, limit: usize) -> Result<Vec<RecipientLog>> {
        self.inner.recent_successes(campaign_id, limit)
    }
}

impl TokenStore for FailingStore {
    fn latest_token_for_contact(&self, contact_id: i64) -> Result<Option<UnsubscribeToken>> {
        self.inner.latest_token_for_contact(contact_id)
    }

    fn insert_token(
        &self,
        contact_id: i64,
        token: &str,
        created_at: DateTime<Utc>,
    ) -> Result<UnsubscribeToken> {
        self.inner.insert_token(contact_id, token, created_at)
    }

    fn find_token(&self, token: &str) -> Result<Option<UnsubscribeToken>> {
        self.inner.find_token(token)
    }

    fn mark_token_used(&self, id: i64, at: DateTime<Utc>) -> Result<bool> {
        self.inner.mark_token_used(id, at)
    }
}
