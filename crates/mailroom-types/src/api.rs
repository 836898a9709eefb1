use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::CampaignStatus;

// -- JWT Claims --

/// Claims carried by admin bearer tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub username: String,
    pub token: String,
}

// -- Campaigns --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateCampaignRequest {
    pub title: String,
    pub subject: String,
    pub html_body: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduleCampaignRequest {
    pub scheduled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendNowResponse {
    pub campaign_id: i64,
    pub status: CampaignStatus,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignSuccessLog {
    pub email: String,
    pub sent_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignErrorLog {
    pub email: String,
    pub error_message: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignStatusResponse {
    pub campaign_id: i64,
    pub status: CampaignStatus,
    pub pending: u64,
    pub sent: u64,
    pub failed: u64,
    pub recent_successes: Vec<CampaignSuccessLog>,
    pub recent_failures: Vec<CampaignErrorLog>,
}

// -- Batch config --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfigResponse {
    pub batch_size: u32,
    pub batch_interval_seconds: u32,
}

/// Signed so negative values reach validation instead of failing to parse.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateBatchConfigRequest {
    pub batch_size: i64,
    pub batch_interval_seconds: i64,
}

// -- Contacts --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateContactRequest {
    pub name: String,
    pub email: String,
    pub consent: bool,
    pub subscribed_to_list: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportContactsResponse {
    pub total_lines: usize,
    pub imported: usize,
    pub skipped_invalid: usize,
    pub skipped_duplicated: usize,
    pub imported_emails: Vec<String>,
    pub invalid_emails: Vec<String>,
    pub duplicated_emails: Vec<String>,
}

// -- Unsubscribe --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnsubscribeResponse {
    pub message: String,
}

// -- Errors --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: u16,
    pub error: String,
    pub message: String,
}
