use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// -- Campaigns --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CampaignStatus {
    Draft,
    Scheduled,
    Sending,
    Finished,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Scheduled => "SCHEDULED",
            Self::Sending => "SENDING",
            Self::Finished => "FINISHED",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Draft => 0,
            Self::Scheduled => 1,
            Self::Sending => 2,
            Self::Finished => 3,
        }
    }

    /// Whether the scheduled path allows moving from `self` to `next`.
    /// Only forward moves are allowed, plus SCHEDULED to itself so a pending
    /// send time can be changed. The send-now override bypasses this.
    pub fn can_transition_to(&self, next: CampaignStatus) -> bool {
        next.rank() > self.rank() || (*self == Self::Scheduled && next == Self::Scheduled)
    }
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CampaignStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(Self::Draft),
            "SCHEDULED" => Ok(Self::Scheduled),
            "SENDING" => Ok(Self::Sending),
            "FINISHED" => Ok(Self::Finished),
            other => Err(format!("unknown campaign status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: i64,
    pub title: String,
    pub subject: String,
    pub html_body: String,
    pub status: CampaignStatus,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// -- Contacts --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub consent: bool,
    pub subscribed_to_list: bool,
    pub unsubscribed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Contact {
    /// Consent given, never unsubscribed, and still on the list.
    pub fn is_eligible(&self) -> bool {
        self.consent && self.unsubscribed_at.is_none() && self.subscribed_to_list
    }
}

/// Fields needed to insert a contact; the store assigns id and created_at.
#[derive(Debug, Clone)]
pub struct NewContact {
    pub name: String,
    pub email: String,
    pub consent: bool,
    pub subscribed_to_list: bool,
}

// -- Recipients --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecipientStatus {
    Pending,
    Sent,
    Failed,
}

impl RecipientStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Sent => "SENT",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for RecipientStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecipientStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "SENT" => Ok(Self::Sent),
            "FAILED" => Ok(Self::Failed),
            other => Err(format!("unknown recipient status: {}", other)),
        }
    }
}

/// One campaign's delivery record for one contact.
/// At most one exists per (campaign_id, contact_id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignRecipient {
    pub id: i64,
    pub campaign_id: i64,
    pub contact_id: i64,
    pub status: RecipientStatus,
    pub error_message: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
}

impl CampaignRecipient {
    pub fn mark_sent(&mut self, at: DateTime<Utc>) {
        self.status = RecipientStatus::Sent;
        self.sent_at = Some(at);
        self.error_message = None;
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.status = RecipientStatus::Failed;
        self.error_message = Some(reason.into());
    }
}

/// A recipient row joined with its contact's email, for status reports.
#[derive(Debug, Clone)]
pub struct RecipientLog {
    pub email: String,
    pub error_message: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
}

// -- Unsubscribe tokens --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnsubscribeToken {
    pub id: i64,
    pub contact_id: i64,
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}
