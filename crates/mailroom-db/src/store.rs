//! Persistence contracts used by the dispatch engine.
//!
//! Implementations must be safe to share between concurrently running
//! dispatch tasks. Uniqueness-guarded inserts report a lost race as `Ok(None)`
//! instead of an error, and must be atomic: two callers racing on the same key
//! see exactly one `Some`.

use anyhow::Result;
use chrono::{DateTime, Utc};

use mailroom_types::models::{
    Campaign, CampaignRecipient, CampaignStatus, Contact, NewContact, RecipientLog,
    RecipientStatus, UnsubscribeToken,
};

pub trait ContactStore: Send + Sync {
    /// Returns `None` if a contact with the same email (any case) exists.
    fn insert_contact(&self, contact: &NewContact, created_at: DateTime<Utc>)
    -> Result<Option<Contact>>;

    fn get_contact(&self, id: i64) -> Result<Option<Contact>>;

    fn find_contact_by_email(&self, email: &str) -> Result<Option<Contact>>;

    fn list_contacts(&self) -> Result<Vec<Contact>>;

    /// Contacts with consent, not unsubscribed and on the list, ordered by id.
    fn eligible_contacts(&self) -> Result<Vec<Contact>>;

    /// Sets `unsubscribed_at` only if it is still unset. Returns whether it changed.
    fn mark_contact_unsubscribed(&self, id: i64, at: DateTime<Utc>) -> Result<bool>;
}

pub trait CampaignStore: Send + Sync {
    fn insert_campaign(
        &self,
        title: &str,
        subject: &str,
        html_body: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Campaign>;

    fn get_campaign(&self, id: i64) -> Result<Option<Campaign>>;

    /// Moves the campaign to SCHEDULED with the given send time when
    /// `CampaignStatus::can_transition_to` allows it. Returns false if the
    /// campaign is missing or already past SCHEDULED.
    fn schedule_campaign(&self, id: i64, at: DateTime<Utc>) -> Result<bool>;

    /// Unconditional status write. Returns false if the campaign is missing.
    fn set_campaign_status(&self, id: i64, status: CampaignStatus) -> Result<bool>;

    /// Moves a SCHEDULED campaign whose `scheduled_at` is at or before `now`
    /// to SENDING. Returns false if it is no longer both.
    fn claim_due_campaign(&self, id: i64, now: DateTime<Utc>) -> Result<bool>;

    /// SCHEDULED campaigns whose `scheduled_at` is at or before `now`.
    fn due_campaigns(&self, now: DateTime<Utc>) -> Result<Vec<Campaign>>;
}

pub trait RecipientStore: Send + Sync {
    fn recipient_exists(&self, campaign_id: i64, contact_id: i64) -> Result<bool>;

    /// Inserts a PENDING row. Returns `None` if the pair is already recorded.
    fn insert_pending_recipient(
        &self,
        campaign_id: i64,
        contact_id: i64,
    ) -> Result<Option<CampaignRecipient>>;

    fn update_recipient(&self, recipient: &CampaignRecipient) -> Result<()>;

    fn recipients_for_campaign(&self, campaign_id: i64) -> Result<Vec<CampaignRecipient>>;

    fn count_recipients(&self, campaign_id: i64, status: RecipientStatus) -> Result<u64>;

    /// Most recent FAILED rows, newest row first.
    fn recent_failures(&self, campaign_id: i64, limit: usize) -> Result<Vec<RecipientLog>>;

    /// Most recent SENT rows with a send time, latest send first.
    fn recent_successes(&self, campaign_id: i64, limit: usize) -> Result<Vec<RecipientLog>>;
}

pub trait TokenStore: Send + Sync {
    fn latest_token_for_contact(&self, contact_id: i64) -> Result<Option<UnsubscribeToken>>;

    fn insert_token(
        &self,
        contact_id: i64,
        token: &str,
        created_at: DateTime<Utc>,
    ) -> Result<UnsubscribeToken>;

    fn find_token(&self, token: &str) -> Result<Option<UnsubscribeToken>>;

    /// Sets `used_at` only if it is still unset. Returns whether it changed.
    fn mark_token_used(&self, id: i64, at: DateTime<Utc>) -> Result<bool>;
}

/// Everything the dispatch engine needs from persistence.
pub trait Store: ContactStore + CampaignStore + RecipientStore + TokenStore {}

impl<T> Store for T where T: ContactStore + CampaignStore + RecipientStore + TokenStore {}
