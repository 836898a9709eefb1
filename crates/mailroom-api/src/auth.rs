use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::{info, warn};

use mailroom_dispatch::{CampaignService, ContactService, TokenIssuer};
use mailroom_types::api::{Claims, LoginRequest, LoginResponse};

use crate::error::ApiError;

const TOKEN_TTL_HOURS: i64 = 12;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub campaigns: CampaignService,
    pub contacts: ContactService,
    pub tokens: TokenIssuer,
    pub jwt_secret: String,
    pub admin_user: String,
    /// Argon2 PHC string. `None` disables login.
    pub admin_password_hash: Option<String>,
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(stored_hash) = state.admin_password_hash.as_deref() else {
        warn!("Login attempted but MAILROOM_ADMIN_PASSWORD_HASH is not set");
        return Err(ApiError::Unauthorized);
    };

    if req.username != state.admin_user {
        return Err(ApiError::Unauthorized);
    }

    let parsed_hash = PasswordHash::new(stored_hash)
        .map_err(|e| anyhow::anyhow!("Invalid admin password hash: {}", e))?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::Unauthorized)?;

    let token = create_token(&state.jwt_secret, &req.username)?;
    info!(username = %req.username, "Admin logged in");

    Ok(Json(LoginResponse {
        username: req.username,
        token,
    }))
}

/// Hashes a password with Argon2id into a PHC string suitable for
/// `MAILROOM_ADMIN_PASSWORD_HASH`.
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?;
    Ok(hash.to_string())
}

pub fn create_token(secret: &str, username: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: username.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::hours(TOKEN_TTL_HOURS)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
