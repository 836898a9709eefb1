use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use tracing::error;

use mailroom_types::api::CreateContactRequest;

use crate::auth::AppState;
use crate::error::ApiError;

/// POST /api/contacts
pub async fn create_contact(
    State(state): State<AppState>,
    Json(req): Json<CreateContactRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let contact = state.contacts.create(
        &req.name,
        &req.email,
        req.consent,
        req.subscribed_to_list,
    )?;
    Ok((StatusCode::CREATED, Json(contact)))
}

/// POST /api/contacts/import-lines with a text/plain body, one email per line.
pub async fn import_lines(
    State(state): State<AppState>,
    body: String,
) -> Result<impl IntoResponse, ApiError> {
    // One insert per line; keep it off the async workers
    let contacts = state.contacts.clone();
    let report = tokio::task::spawn_blocking(move || contacts.import_lines(&body))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            anyhow::anyhow!("import task failed")
        })??;

    Ok(Json(report))
}

/// GET /api/contacts
pub async fn list_contacts(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.contacts.list()?))
}
