use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use mailroom_types::api::{
    BatchConfigResponse, CreateCampaignRequest, ScheduleCampaignRequest, SendNowResponse,
    UpdateBatchConfigRequest,
};
use mailroom_types::models::CampaignStatus;

use crate::auth::AppState;
use crate::error::ApiError;

/// POST /api/campaigns
pub async fn create_campaign(
    State(state): State<AppState>,
    Json(req): Json<CreateCampaignRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let campaign = state
        .campaigns
        .create(&req.title, &req.subject, &req.html_body)?;
    Ok((StatusCode::CREATED, Json(campaign)))
}

/// POST /api/campaigns/{id}/schedule
pub async fn schedule_campaign(
    State(state): State<AppState>,
    Path(campaign_id): Path<i64>,
    Json(req): Json<ScheduleCampaignRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let campaign = state.campaigns.schedule(campaign_id, req.scheduled_at)?;
    Ok(Json(campaign))
}

/// POST /api/campaigns/{id}/send-now
///
/// Responds as soon as dispatch has been handed to a background task.
pub async fn send_now(
    State(state): State<AppState>,
    Path(campaign_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    // The handle is dropped; the task keeps running and logs its own outcome.
    let _handle = state.campaigns.send_now(campaign_id)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SendNowResponse {
            campaign_id,
            status: CampaignStatus::Sending,
            message: "Campaign dispatch started.".to_string(),
        }),
    ))
}

/// GET /api/campaigns/{id}/status
pub async fn campaign_status(
    State(state): State<AppState>,
    Path(campaign_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.campaigns.status(campaign_id)?))
}

/// GET /api/campaigns/batch-config
pub async fn get_batch_config(State(state): State<AppState>) -> Json<BatchConfigResponse> {
    Json(state.campaigns.batch_config().into())
}

/// PUT /api/campaigns/batch-config
pub async fn update_batch_config(
    State(state): State<AppState>,
    Json(req): Json<UpdateBatchConfigRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let settings = state
        .campaigns
        .update_batch_config(req.batch_size, req.batch_interval_seconds)?;
    Ok(Json(BatchConfigResponse::from(settings)))
}
