use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::Result;
use chrono::{DateTime, Utc};

use mailroom_types::models::{
    Campaign, CampaignRecipient, CampaignStatus, Contact, NewContact, RecipientLog,
    RecipientStatus, UnsubscribeToken,
};

use crate::store::{CampaignStore, ContactStore, RecipientStore, TokenStore};

/// In-memory store behind a single mutex.
///
/// Every operation holds the lock for its whole duration, which gives the same
/// atomicity as the SQLite writer for conditional inserts and updates. Meant
/// for tests and local runs; nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    next_id: i64,
    campaigns: BTreeMap<i64, Campaign>,
    contacts: BTreeMap<i64, Contact>,
    recipients: BTreeMap<i64, CampaignRecipient>,
    tokens: BTreeMap<i64, UnsubscribeToken>,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn email_for(&self, contact_id: i64) -> String {
        self.contacts
            .get(&contact_id)
            .map(|c| c.email.clone())
            .unwrap_or_default()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|e| anyhow::anyhow!("Memory store lock poisoned: {}", e))
    }
}

impl ContactStore for MemoryStore {
    fn insert_contact(
        &self,
        contact: &NewContact,
        created_at: DateTime<Utc>,
    ) -> Result<Option<Contact>> {
        let mut state = self.lock()?;
        if state
            .contacts
            .values()
            .any(|c| c.email.eq_ignore_ascii_case(&contact.email))
        {
            return Ok(None);
        }

        let id = state.next_id();
        let stored = Contact {
            id,
            name: contact.name.clone(),
            email: contact.email.clone(),
            consent: contact.consent,
            subscribed_to_list: contact.subscribed_to_list,
            unsubscribed_at: None,
            created_at,
        };
        state.contacts.insert(id, stored.clone());
        Ok(Some(stored))
    }

    fn get_contact(&self, id: i64) -> Result<Option<Contact>> {
        Ok(self.lock()?.contacts.get(&id).cloned())
    }

    fn find_contact_by_email(&self, email: &str) -> Result<Option<Contact>> {
        Ok(self
            .lock()?
            .contacts
            .values()
            .find(|c| c.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    fn list_contacts(&self) -> Result<Vec<Contact>> {
        Ok(self.lock()?.contacts.values().cloned().collect())
    }

    fn eligible_contacts(&self) -> Result<Vec<Contact>> {
        Ok(self
            .lock()?
            .contacts
            .values()
            .filter(|c| c.is_eligible())
            .cloned()
            .collect())
    }

    fn mark_contact_unsubscribed(&self, id: i64, at: DateTime<Utc>) -> Result<bool> {
        let mut state = self.lock()?;
        match state.contacts.get_mut(&id) {
            Some(contact) if contact.unsubscribed_at.is_none() => {
                contact.unsubscribed_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

impl CampaignStore for MemoryStore {
    fn insert_campaign(
        &self,
        title: &str,
        subject: &str,
        html_body: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Campaign> {
        let mut state = self.lock()?;
        let id = state.next_id();
        let campaign = Campaign {
            id,
            title: title.to_string(),
            subject: subject.to_string(),
            html_body: html_body.to_string(),
            status: CampaignStatus::Draft,
            scheduled_at: None,
            created_at,
        };
        state.campaigns.insert(id, campaign.clone());
        Ok(campaign)
    }

    fn get_campaign(&self, id: i64) -> Result<Option<Campaign>> {
        Ok(self.lock()?.campaigns.get(&id).cloned())
    }

    fn schedule_campaign(&self, id: i64, at: DateTime<Utc>) -> Result<bool> {
        let mut state = self.lock()?;
        match state.campaigns.get_mut(&id) {
            Some(campaign) if campaign.status.can_transition_to(CampaignStatus::Scheduled) => {
                campaign.status = CampaignStatus::Scheduled;
                campaign.scheduled_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn set_campaign_status(&self, id: i64, status: CampaignStatus) -> Result<bool> {
        let mut state = self.lock()?;
        let Some(campaign) = state.campaigns.get_mut(&id) else {
            return Ok(false);
        };
        campaign.status = status;
        Ok(true)
    }

    fn claim_due_campaign(&self, id: i64, now: DateTime<Utc>) -> Result<bool> {
        let mut state = self.lock()?;
        match state.campaigns.get_mut(&id) {
            Some(campaign)
                if campaign.status == CampaignStatus::Scheduled
                    && campaign.scheduled_at.is_some_and(|at| at <= now) =>
            {
                campaign.status = CampaignStatus::Sending;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn due_campaigns(&self, now: DateTime<Utc>) -> Result<Vec<Campaign>> {
        let mut due: Vec<Campaign> = self
            .lock()?
            .campaigns
            .values()
            .filter(|c| {
                c.status == CampaignStatus::Scheduled && c.scheduled_at.is_some_and(|at| at <= now)
            })
            .cloned()
            .collect();
        due.sort_by_key(|c| (c.scheduled_at, c.id));
        Ok(due)
    }
}

impl RecipientStore for MemoryStore {
    fn recipient_exists(&self, campaign_id: i64, contact_id: i64) -> Result<bool> {
        Ok(self
            .lock()?
            .recipients
            .values()
            .any(|r| r.campaign_id == campaign_id && r.contact_id == contact_id))
    }

    fn insert_pending_recipient(
        &self,
        campaign_id: i64,
        contact_id: i64,
    ) -> Result<Option<CampaignRecipient>> {
        let mut state = self.lock()?;
        if state
            .recipients
            .values()
            .any(|r| r.campaign_id == campaign_id && r.contact_id == contact_id)
        {
            return Ok(None);
        }

        let id = state.next_id();
        let recipient = CampaignRecipient {
            id,
            campaign_id,
            contact_id,
            status: RecipientStatus::Pending,
            error_message: None,
            sent_at: None,
        };
        state.recipients.insert(id, recipient.clone());
        Ok(Some(recipient))
    }

    fn update_recipient(&self, recipient: &CampaignRecipient) -> Result<()> {
        let mut state = self.lock()?;
        if let Some(stored) = state.recipients.get_mut(&recipient.id) {
            stored.status = recipient.status;
            stored.error_message = recipient.error_message.clone();
            stored.sent_at = recipient.sent_at;
        }
        Ok(())
    }

    fn recipients_for_campaign(&self, campaign_id: i64) -> Result<Vec<CampaignRecipient>> {
        Ok(self
            .lock()?
            .recipients
            .values()
            .filter(|r| r.campaign_id == campaign_id)
            .cloned()
            .collect())
    }

    fn count_recipients(&self, campaign_id: i64, status: RecipientStatus) -> Result<u64> {
        Ok(self
            .lock()?
            .recipients
            .values()
            .filter(|r| r.campaign_id == campaign_id && r.status == status)
            .count() as u64)
    }

    fn recent_failures(&self, campaign_id: i64, limit: usize) -> Result<Vec<RecipientLog>> {
        let state = self.lock()?;
        Ok(state
            .recipients
            .values()
            .rev()
            .filter(|r| r.campaign_id == campaign_id && r.status == RecipientStatus::Failed)
            .take(limit)
            .map(|r| RecipientLog {
                email: state.email_for(r.contact_id),
                error_message: r.error_message.clone(),
                sent_at: r.sent_at,
            })
            .collect())
    }

    fn recent_successes(&self, campaign_id: i64, limit: usize) -> Result<Vec<RecipientLog>> {
        let state = self.lock()?;
        let mut sent: Vec<&CampaignRecipient> = state
            .recipients
            .values()
            .filter(|r| {
                r.campaign_id == campaign_id
                    && r.status == RecipientStatus::Sent
                    && r.sent_at.is_some()
            })
            .collect();
        sent.sort_by(|a, b| b.sent_at.cmp(&a.sent_at).then(b.id.cmp(&a.id)));

        Ok(sent
            .into_iter()
            .take(limit)
            .map(|r| RecipientLog {
                email: state.email_for(r.contact_id),
                error_message: r.error_message.clone(),
                sent_at: r.sent_at,
            })
            .collect())
    }
}

impl TokenStore for MemoryStore {
    fn latest_token_for_contact(&self, contact_id: i64) -> Result<Option<UnsubscribeToken>> {
        Ok(self
            .lock()?
            .tokens
            .values()
            .filter(|t| t.contact_id == contact_id)
            .max_by_key(|t| (t.created_at, t.id))
            .cloned())
    }

    fn insert_token(
        &self,
        contact_id: i64,
        token: &str,
        created_at: DateTime<Utc>,
    ) -> Result<UnsubscribeToken> {
        let mut state = self.lock()?;
        if state.tokens.values().any(|t| t.token == token) {
            anyhow::bail!("Unsubscribe token already exists");
        }

        let id = state.next_id();
        let stored = UnsubscribeToken {
            id,
            contact_id,
            token: token.to_string(),
            created_at,
            used_at: None,
        };
        state.tokens.insert(id, stored.clone());
        Ok(stored)
    }

    fn find_token(&self, token: &str) -> Result<Option<UnsubscribeToken>> {
        Ok(self
            .lock()?
            .tokens
            .values()
            .find(|t| t.token == token)
            .cloned())
    }

    fn mark_token_used(&self, id: i64, at: DateTime<Utc>) -> Result<bool> {
        let mut state = self.lock()?;
        match state.tokens.get_mut(&id) {
            Some(token) if token.used_at.is_none() => {
                token.used_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
