use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use mailroom_db::{ContactStore, Store, TokenStore};

use crate::error::DispatchError;

pub const UNSUBSCRIBE_CONFIRMATION: &str = "Unsubscribed successfully.";

/// Issues unsubscribe tokens and redeems them.
#[derive(Clone)]
pub struct TokenIssuer {
    store: Arc<dyn Store>,
}

impl TokenIssuer {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Returns the contact's most recent token, creating one if none exists.
    pub fn get_or_create_token(&self, contact_id: i64) -> Result<String, DispatchError> {
        if let Some(existing) = self.store.latest_token_for_contact(contact_id)? {
            return Ok(existing.token);
        }

        if self.store.get_contact(contact_id)?.is_none() {
            return Err(DispatchError::NotFound("Contact not found for unsubscribe token"));
        }

        let token = Uuid::new_v4().to_string();
        let stored = self.store.insert_token(contact_id, &token, Utc::now())?;
        debug!(contact_id, token_id = stored.id, "Issued unsubscribe token");
        Ok(stored.token)
    }

    /// Redeems a token. Replays succeed without touching stored timestamps.
    pub fn unsubscribe(&self, token: &str) -> Result<String, DispatchError> {
        let found = self
            .store
            .find_token(token)?
            .ok_or(DispatchError::NotFound("Invalid unsubscribe token"))?;

        if found.used_at.is_none() {
            let now = Utc::now();
            // Contact first: if we stop between the two writes, a replay still
            // finds the token unused and completes the unsubscribe.
            if self.store.mark_contact_unsubscribed(found.contact_id, now)? {
                info!(contact_id = found.contact_id, "Contact unsubscribed");
            }
            self.store.mark_token_used(found.id, now)?;
        }

        Ok(UNSUBSCRIBE_CONFIRMATION.to_string())
    }
}
