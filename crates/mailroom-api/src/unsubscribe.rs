use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};

use mailroom_types::api::UnsubscribeResponse;

use crate::auth::AppState;
use crate::error::ApiError;

/// GET /api/unsubscribe/{token}. Public, and safe to follow more than once.
pub async fn unsubscribe(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let message = state.tokens.unsubscribe(&token)?;
    Ok(Json(UnsubscribeResponse { message }))
}
