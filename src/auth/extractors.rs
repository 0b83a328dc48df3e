//! Authentication extractors for Axum
//!
//! Resolution order follows the auth design: a bearer token wins when
//! present and valid; otherwise the session cookie is tried against the
//! database first and the Redis snapshot second.

use async_trait::async_trait;
use axum::{
    extract::{Extension, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use axum_extra::extract::CookieJar;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::handlers::{session_key, SESSION_COOKIE};
use super::jwt::decode_token;
use super::models::SessionInfo;
use crate::common::{safe_email_log, ApiError, AppState};

/// Authenticated user extractor; fails closed with 401
#[derive(Debug)]
pub struct AuthedUser {
    pub id: String,
    pub username: String,
    pub email: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = shared_state(parts, state).await?;

        match resolve_user(parts, &app_state).await? {
            Some(user) => Ok(user),
            None => {
                warn!("Authentication failed: no valid token or session");
                Err(ApiError::Unauthorized("not authenticated".into()))
            }
        }
    }
}

async fn shared_state<S: Send + Sync>(
    parts: &mut Parts,
    state: &S,
) -> Result<AppState, ApiError> {
    let Extension(state_lock): Extension<Arc<RwLock<AppState>>> =
        Extension::from_request_parts(parts, state)
            .await
            .map_err(|_| ApiError::InternalServer("missing app state".to_string()))?;

    let app_state = state_lock.read().await.clone();
    Ok(app_state)
}

/// Resolve the request to a user identity, or None when unauthenticated
async fn resolve_user(
    parts: &Parts,
    app_state: &AppState,
) -> Result<Option<AuthedUser>, ApiError> {
    // Bearer token takes precedence over the session cookie
    if let Some(token) = bearer_token(parts) {
        match decode_token(&token, &app_state.config.jwt_secret) {
            Ok(claims) => match app_state.db_service.get_user(&claims.sub).await? {
                Some(user) if user.is_active => {
                    debug!(
                        user_id = %user.id,
                        email = %safe_email_log(&user.email),
                        "User authenticated via bearer token"
                    );
                    return Ok(Some(AuthedUser {
                        id: user.id,
                        username: user.username,
                        email: user.email,
                    }));
                }
                Some(user) => {
                    warn!(user_id = %user.id, "Rejected token for inactive user");
                    return Ok(None);
                }
                None => {
                    warn!(user_id = %claims.sub, "Token subject not found in database");
                    return Ok(None);
                }
            },
            Err(e) => {
                // invalid token falls through to the session cookie
                warn!(error = %e, "Bearer token rejected, trying session cookie");
            }
        }
    }

    let jar = CookieJar::from_headers(&parts.headers);
    let session_id = match jar.get(SESSION_COOKIE) {
        Some(cookie) => cookie.value().to_string(),
        None => return Ok(None),
    };

    // database is authoritative
    if let Some((_, user)) = app_state.db_service.get_session(&session_id).await? {
        if !user.is_active {
            return Ok(None);
        }
        debug!(user_id = %user.id, "User authenticated via session cookie");
        return Ok(Some(AuthedUser {
            id: user.id,
            username: user.username,
            email: user.email,
        }));
    }

    // Redis snapshot fallback
    if let Ok(Some(raw)) = app_state.cache.get(&session_key(&session_id)).await {
        if let Ok(info) = serde_json::from_str::<SessionInfo>(&raw) {
            debug!(user_id = %info.user_id, "User authenticated via cached session");
            return Ok(Some(AuthedUser {
                id: info.user_id,
                username: info.username,
                email: info.email,
            }));
        }
    }

    Ok(None)
}

fn bearer_token(parts: &Parts) -> Option<String> {
    let header = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    // Handle "Bearer <token>" format or raw token
    let token = header.strip_prefix("Bearer ").unwrap_or(header);
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
