//! Authentication data models

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// User database model
#[derive(FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    pub is_active: bool,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

/// Link between a user and one provider identity.
/// Provider tokens are never serialized into API responses.
#[derive(FromRow, Serialize, Debug, Clone)]
pub struct OAuthAccount {
    pub id: String,
    pub user_id: String,
    pub provider: String,
    pub provider_id: String,
    pub email: Option<String>,
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    pub expires_at: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

/// Server-side session record; the id is the opaque cookie value
#[derive(FromRow, Serialize, Debug, Clone)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub expires_at: String,
    pub created_at: Option<String>,
}

/// Long-lived refresh token; revoked rows are kept for audit
#[derive(FromRow, Debug, Clone)]
pub struct RefreshToken {
    pub id: String,
    pub user_id: String,
    pub token: String,
    pub expires_at: String,
    pub revoked: bool,
    pub created_at: Option<String>,
}

/// User snapshot cached in Redis under `session:{id}`
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SessionInfo {
    pub user_id: String,
    pub username: String,
    pub email: String,
    pub expires_at: Option<String>,
}

/// Partial profile update; absent fields are left untouched
#[derive(Deserialize, Debug, Default)]
pub struct UserUpdate {
    pub username: Option<String>,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
}

/// Body for POST /api/v1/auth/refresh; the cookie is used when absent
#[derive(Deserialize, Debug, Default)]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

/// Access token response for the refresh endpoint
#[derive(Serialize, Debug)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}
