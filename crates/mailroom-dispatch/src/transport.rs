use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use mailroom_types::models::{Campaign, Contact};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid email address: {0}")]
    InvalidAddress(String),

    #[error("failed to build message: {0}")]
    Build(String),

    #[error("SMTP error: {0}")]
    Smtp(String),

    #[error("invalid SMTP configuration: {0}")]
    Config(String),
}

/// Sends one campaign email to one contact.
///
/// Implementations do their own retrying, if any. Every error is recorded as
/// a failed delivery for that recipient only.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(
        &self,
        campaign: &Campaign,
        contact: &Contact,
        unsubscribe_token: &str,
    ) -> Result<(), TransportError>;
}

pub fn unsubscribe_url(base_url: &str, token: &str) -> String {
    format!("{}/api/unsubscribe/{}", base_url.trim_end_matches('/'), token)
}

/// Campaign HTML with the unsubscribe footer appended.
pub fn compose_html(html_body: &str, base_url: &str, token: &str) -> String {
    format!(
        "{}<hr/><p style='font-size:12px'>Don't want these emails? <a href='{}'>Unsubscribe here</a>.</p>",
        html_body,
        unsubscribe_url(base_url, token)
    )
}

/// Logs each message instead of sending it. Used when no SMTP host is set.
pub struct LogTransport {
    base_url: String,
}

impl LogTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl MailTransport for LogTransport {
    async fn send(
        &self,
        campaign: &Campaign,
        contact: &Contact,
        unsubscribe_token: &str,
    ) -> Result<(), TransportError> {
        info!(
            campaign_id = campaign.id,
            contact_id = contact.id,
            email = %contact.email,
            subject = %campaign.subject,
            unsubscribe = %unsubscribe_url(&self.base_url, unsubscribe_token),
            "mail_send status=logged"
        );
        Ok(())
    }
}
