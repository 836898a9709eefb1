//! SMTP delivery through lettre.
//!
//! Configured from the environment:
//!
//! | Variable | Required | Description |
//! |----------|----------|-------------|
//! | `SMTP_HOST` | Yes | SMTP server hostname; unset disables SMTP |
//! | `SMTP_PORT` | No | Port (default: 587) |
//! | `SMTP_USER` | No | Username for authentication |
//! | `SMTP_PASSWORD` | No | Password for authentication |
//! | `SMTP_FROM` | Yes | Sender address |
//! | `SMTP_TLS` | No | `starttls`, `tls` or `none` (default: `tls` on port 465, else `starttls`) |
//!
//! Values may be wrapped in one pair of single or double quotes, as some
//! `.env` tooling leaves them in place.

use std::str::FromStr;

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{error, info};

use mailroom_types::models::{Campaign, Contact};

use crate::transport::{MailTransport, TransportError, compose_html};

const DEFAULT_PORT: u16 = 587;
const IMPLICIT_TLS_PORT: u16 = 465;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    StartTls,
    Tls,
    Plaintext,
}

impl FromStr for TlsMode {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "starttls" => Ok(Self::StartTls),
            "tls" | "ssl" => Ok(Self::Tls),
            "none" => Ok(Self::Plaintext),
            other => Err(TransportError::Config(format!("unknown SMTP_TLS mode: {}", other))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
    pub tls: TlsMode,
}

impl SmtpConfig {
    /// Returns `Ok(None)` when `SMTP_HOST` is unset.
    pub fn from_env() -> Result<Option<Self>, TransportError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Option<Self>, TransportError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| sanitize(&v)).filter(|v| !v.is_empty());

        let Some(host) = get("SMTP_HOST") else {
            return Ok(None);
        };

        let port = match get("SMTP_PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|_| TransportError::Config(format!("invalid SMTP_PORT: {}", raw)))?,
            None => DEFAULT_PORT,
        };

        let from = get("SMTP_FROM")
            .ok_or_else(|| TransportError::Config("SMTP_FROM is required".into()))?;

        let tls = match get("SMTP_TLS") {
            Some(raw) => raw.parse()?,
            None if port == IMPLICIT_TLS_PORT => TlsMode::Tls,
            None => TlsMode::StartTls,
        };

        Ok(Some(Self {
            host,
            port,
            username: get("SMTP_USER"),
            password: get("SMTP_PASSWORD"),
            from,
            tls,
        }))
    }
}

/// Trims whitespace and strips one pair of matching outer quotes.
pub fn sanitize(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.len() >= 2 {
        let quoted = (trimmed.starts_with('"') && trimmed.ends_with('"'))
            || (trimmed.starts_with('\'') && trimmed.ends_with('\''));
        if quoted {
            return trimmed[1..trimmed.len() - 1].trim().to_string();
        }
    }
    trimmed.to_string()
}

pub struct SmtpTransport {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    base_url: String,
}

impl SmtpTransport {
    pub fn new(config: &SmtpConfig, base_url: impl Into<String>) -> Result<Self, TransportError> {
        let builder = match config.tls {
            TlsMode::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| TransportError::Smtp(e.to_string()))?,
            TlsMode::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| TransportError::Smtp(e.to_string()))?,
            TlsMode::Plaintext => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host),
        };

        let mut builder = builder.port(config.port);
        if let (Some(user), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
        }

        let from = config
            .from
            .parse::<Mailbox>()
            .map_err(|e| TransportError::InvalidAddress(format!("{}: {}", config.from, e)))?;

        info!(
            "SMTP transport configured for {}:{} ({:?})",
            config.host, config.port, config.tls
        );

        Ok(Self {
            mailer: builder.build(),
            from,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl MailTransport for SmtpTransport {
    async fn send(
        &self,
        campaign: &Campaign,
        contact: &Contact,
        unsubscribe_token: &str,
    ) -> Result<(), TransportError> {
        let to = contact
            .email
            .parse::<Mailbox>()
            .map_err(|e| TransportError::InvalidAddress(format!("{}: {}", contact.email, e)))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(campaign.subject.clone())
            .header(ContentType::TEXT_HTML)
            .body(compose_html(&campaign.html_body, &self.base_url, unsubscribe_token))
            .map_err(|e| TransportError::Build(e.to_string()))?;

        match self.mailer.send(message).await {
            Ok(_) => {
                info!(
                    campaign_id = campaign.id,
                    contact_id = contact.id,
                    email = %contact.email,
                    "mail_send status=success"
                );
                Ok(())
            }
            Err(e) => {
                error!(
                    campaign_id = campaign.id,
                    contact_id = contact.id,
                    email = %contact.email,
                    reason = %e,
                    "mail_send status=error"
                );
                Err(TransportError::Smtp(e.to_string()))
            }
        }
    }
}
