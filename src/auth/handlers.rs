//! Authentication handlers
//!
//! The callback flow mirrors the authorization-code sequence: verify and
//! consume the CSRF state, exchange the code, resolve the profile to a user
//! (linking by email across providers), then issue the JWT, the server-side
//! session and a refresh token.

use axum::extract::{Extension, Path, Query};
use axum::response::{IntoResponse, Redirect};
use axum::Json;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Duration;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::extractors::AuthedUser;
use super::jwt::create_access_token;
use super::models::{RefreshRequest, SessionInfo, TokenResponse, User};
use crate::common::helpers::{safe_token_log, ts_in_past};
use crate::common::{safe_email_log, ApiError, AppState};
use crate::services::cache::{CacheService, OAUTH_STATE_TTL_SECS};
use crate::services::oauth::{OAuthService, Provider};

pub const SESSION_COOKIE: &str = "session_id";
pub const REFRESH_COOKIE: &str = "refresh_token";

pub fn state_key(state: &str) -> String {
    format!("oauth_state:{}", state)
}

pub fn session_key(session_id: &str) -> String {
    format!("session:{}", session_id)
}

#[derive(Deserialize, Debug)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// GET /api/v1/auth/:provider/login
/// Stores a one-time state value and redirects to the provider
pub async fn oauth_login(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Path(provider): Path<String>,
) -> Result<Redirect, ApiError> {
    let state = state_lock.read().await.clone();
    let provider: Provider = provider.parse()?;

    let csrf_state = OAuthService::generate_state();
    let redirect_uri = callback_uri(&state.config.backend_url, provider);

    state
        .cache
        .set_ex(&state_key(&csrf_state), provider.as_str(), OAUTH_STATE_TTL_SECS)
        .await?;

    let auth_url = state
        .oauth_service
        .authorization_url(provider, &redirect_uri, &csrf_state)?;

    info!(provider = %provider, "Starting OAuth login flow");
    Ok(Redirect::temporary(&auth_url))
}

/// GET /api/v1/auth/:provider/callback
/// Completes the authorization-code exchange and establishes the session
pub async fn oauth_callback(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Path(provider): Path<String>,
    Query(params): Query<CallbackParams>,
    jar: CookieJar,
) -> Result<impl IntoResponse, ApiError> {
    let state = state_lock.read().await.clone();
    let provider: Provider = provider.parse()?;

    if let Some(provider_error) = params.error {
        warn!(provider = %provider, error = %provider_error, "Provider returned an OAuth error");
        return Err(ApiError::BadRequest("authentication failed".to_string()));
    }

    let (code, csrf_state) = match (params.code, params.state) {
        (Some(code), Some(csrf_state)) => (code, csrf_state),
        _ => return Err(ApiError::BadRequest("missing code or state".to_string())),
    };

    verify_and_consume_state(&state.cache, provider, &csrf_state).await?;

    let redirect_uri = callback_uri(&state.config.backend_url, provider);
    let (profile, tokens) = state
        .oauth_service
        .exchange_code(provider, &code, &redirect_uri)
        .await?;

    let user = state
        .db_service
        .get_or_create_oauth_user(&profile, &tokens)
        .await?;

    let access_token =
        create_access_token(&user, &state.config.jwt_secret, state.config.jwt_expire_minutes)?;

    let session = state
        .db_service
        .create_session(&user.id, Duration::minutes(state.config.jwt_expire_minutes))
        .await?;

    // the cache snapshot is best-effort, the database row is authoritative
    let snapshot = SessionInfo {
        user_id: user.id.clone(),
        username: user.username.clone(),
        email: user.email.clone(),
        expires_at: Some(session.expires_at.clone()),
    };
    if let Ok(serialized) = serde_json::to_string(&snapshot) {
        if let Err(e) = state
            .cache
            .set_ex(
                &session_key(&session.id),
                &serialized,
                (state.config.jwt_expire_minutes * 60) as u64,
            )
            .await
        {
            warn!(error = %e, "Failed to cache session snapshot");
        }
    }

    let refresh = state
        .db_service
        .create_refresh_token(&user.id, state.config.refresh_token_expire_days)
        .await?;

    info!(
        user_id = %user.id,
        email = %safe_email_log(&user.email),
        provider = %provider,
        "User authenticated via OAuth"
    );

    let jar = jar
        .add(session_cookie(
            &session.id,
            state.config.jwt_expire_minutes * 60,
        ))
        .add(refresh_cookie(
            &refresh.token,
            state.config.refresh_token_expire_days * 86_400,
        ));

    let url = format!(
        "{}/auth/callback?token={}",
        state.config.frontend_url, access_token
    );
    Ok((jar, Redirect::to(&url)))
}

/// Check the callback state against the stored value and consume it.
/// A state value is single-use: the atomic get-and-delete means replay of
/// a consumed value is rejected even under concurrent callbacks.
pub(crate) async fn verify_and_consume_state(
    cache: &CacheService,
    provider: Provider,
    state: &str,
) -> Result<(), ApiError> {
    let stored = cache.take(&state_key(state)).await?;

    match stored {
        Some(stored_provider) if stored_provider == provider.as_str() => Ok(()),
        Some(_) | None => {
            warn!(provider = %provider, "OAuth state mismatch or replay");
            Err(ApiError::BadRequest("invalid state parameter".to_string()))
        }
    }
}

/// GET /api/v1/auth/me
/// Returns the current authenticated user's profile
pub async fn me_handler(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    authed: AuthedUser,
) -> Result<Json<User>, ApiError> {
    let state = state_lock.read().await.clone();

    let user = state
        .db_service
        .get_user(&authed.id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("user not found".to_string()))?;

    Ok(Json(user))
}

/// POST /api/v1/auth/logout
/// Deletes the session everywhere, revokes the refresh token, clears cookies
pub async fn logout_handler(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    jar: CookieJar,
    authed: AuthedUser,
) -> Result<impl IntoResponse, ApiError> {
    let state = state_lock.read().await.clone();

    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        let session_id = cookie.value().to_string();
        state.db_service.delete_session(&session_id).await?;
        if let Err(e) = state.cache.delete(&session_key(&session_id)).await {
            warn!(error = %e, "Failed to evict cached session");
        }
    }

    if let Some(cookie) = jar.get(REFRESH_COOKIE) {
        state.db_service.revoke_refresh_token(cookie.value()).await?;
    }

    let jar = jar
        .remove(Cookie::build(SESSION_COOKIE).path("/").build())
        .remove(Cookie::build(REFRESH_COOKIE).path("/api/v1/auth").build());

    info!(user_id = %authed.id, "User logged out");
    Ok((
        jar,
        Json(serde_json::json!({ "message": "Logged out successfully" })),
    ))
}

/// GET /api/v1/auth/session
/// Session info from the database, Redis fallback, 401 when neither has it
pub async fn session_handler(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    jar: CookieJar,
) -> Result<Json<SessionInfo>, ApiError> {
    let state = state_lock.read().await.clone();

    let session_id = jar
        .get(SESSION_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or_else(|| ApiError::Unauthorized("no active session".to_string()))?;

    if let Some((session, user)) = state.db_service.get_session(&session_id).await? {
        return Ok(Json(SessionInfo {
            user_id: user.id,
            username: user.username,
            email: user.email,
            expires_at: Some(session.expires_at),
        }));
    }

    if let Ok(Some(raw)) = state.cache.get(&session_key(&session_id)).await {
        if let Ok(info) = serde_json::from_str::<SessionInfo>(&raw) {
            return Ok(Json(info));
        }
    }

    Err(ApiError::Unauthorized(
        "session expired or invalid".to_string(),
    ))
}

/// POST /api/v1/auth/refresh
/// Validates the presented refresh token, rotates it and returns a fresh
/// access token. Revoked or expired tokens are rejected uniformly.
pub async fn refresh_handler(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    jar: CookieJar,
    body: Option<Json<RefreshRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let state = state_lock.read().await.clone();

    let presented = body
        .and_then(|Json(req)| req.refresh_token)
        .or_else(|| jar.get(REFRESH_COOKIE).map(|c| c.value().to_string()))
        .ok_or_else(|| ApiError::Unauthorized("missing refresh token".to_string()))?;

    let record = state
        .db_service
        .get_refresh_token(&presented)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("invalid refresh token".to_string()))?;

    if record.revoked || ts_in_past(&record.expires_at) {
        warn!(
            user_id = %record.user_id,
            token = %safe_token_log(&record.token),
            "Rejected revoked or expired refresh token"
        );
        return Err(ApiError::Unauthorized("invalid refresh token".to_string()));
    }

    let user = state
        .db_service
        .get_user(&record.user_id)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| ApiError::Unauthorized("invalid refresh token".to_string()))?;

    let rotated = state
        .db_service
        .rotate_refresh_token(&record, state.config.refresh_token_expire_days)
        .await?;

    let access_token =
        create_access_token(&user, &state.config.jwt_secret, state.config.jwt_expire_minutes)?;

    info!(user_id = %user.id, "Rotated refresh token");

    let jar = jar.add(refresh_cookie(
        &rotated.token,
        state.config.refresh_token_expire_days * 86_400,
    ));

    Ok((
        jar,
        Json(TokenResponse {
            access_token,
            token_type: "bearer".to_string(),
            expires_in: state.config.jwt_expire_minutes * 60,
            refresh_token: Some(rotated.token),
        }),
    ))
}

// ---- Helpers ----

fn callback_uri(backend_url: &str, provider: Provider) -> String {
    format!("{}/api/v1/auth/{}/callback", backend_url, provider)
}

fn session_cookie(value: &str, max_age_secs: i64) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, value.to_string()))
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(max_age_secs))
        .build()
}

fn refresh_cookie(value: &str, max_age_secs: i64) -> Cookie<'static> {
    // scoped down so the browser only sends it to the auth endpoints
    Cookie::build((REFRESH_COOKIE, value.to_string()))
        .path("/api/v1/auth")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(max_age_secs))
        .build()
}
