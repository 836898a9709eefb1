//! Campaign dispatch engine.
//!
//! A campaign moves DRAFT → SCHEDULED → SENDING → FINISHED. Dispatch runs on a
//! background task per campaign, creating one recipient row per eligible
//! contact before attempting delivery and pausing between batches according
//! to the shared [`BatchConfig`].

mod batch;
mod campaigns;
mod contacts;
mod dispatcher;
mod error;
mod scheduler;
mod smtp;
#[cfg(test)]
mod test_support;
mod tokens;
mod transport;

pub use batch::{BatchConfig, BatchSettings, DEFAULT_BATCH_INTERVAL_SECS, DEFAULT_BATCH_SIZE};
pub use campaigns::{CampaignService, RECENT_LOG_LIMIT};
pub use contacts::{ContactService, is_valid_email};
pub use dispatcher::{CampaignDispatcher, DispatchSummary};
pub use error::DispatchError;
pub use scheduler::{DEFAULT_POLL_INTERVAL, DispatchScheduler};
pub use smtp::{SmtpConfig, SmtpTransport, TlsMode, sanitize};
pub use tokens::{TokenIssuer, UNSUBSCRIBE_CONFIRMATION};
pub use transport::{LogTransport, MailTransport, TransportError, compose_html, unsubscribe_url};
