// src/auth/tests.rs
use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{Extension, FromRequestParts};
use axum::http::Request;
use axum::Json;
use axum_extra::extract::CookieJar;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tokio::sync::RwLock;

use super::extractors::AuthedUser;
use super::handlers::{refresh_handler, session_key, state_key, verify_and_consume_state};
use super::jwt::create_access_token;
use super::models::{RefreshRequest, User};
use crate::common::config::{Config, ProviderCredentials};
use crate::common::{ApiError, AppState};
use crate::services::cache::{CacheService, OAUTH_STATE_TTL_SECS};
use crate::services::oauth::{OAuthProfile, OAuthService, Provider, ProviderTokens};
use crate::services::DatabaseService;

fn test_config() -> Config {
    Config {
        database_url: "sqlite::memory:".to_string(),
        redis_url: "redis://localhost:6379/0".to_string(),
        jwt_secret: "test-secret".to_string(),
        jwt_expire_minutes: 30,
        refresh_token_expire_days: 30,
        backend_url: "http://localhost:8080".to_string(),
        frontend_url: "http://localhost:3000".to_string(),
        google: Some(ProviderCredentials {
            client_id: "google-client".to_string(),
            client_secret: "google-secret".to_string(),
        }),
        github: None,
        cors_origins: String::new(),
        port: 8080,
        rate_limit_enabled: false,
        rate_limit_max_requests: 120,
        rate_limit_window_secs: 60,
    }
}

async fn test_state() -> Arc<RwLock<AppState>> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .foreign_keys(true);
    // one connection so every query sees the same in-memory database
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();
    crate::common::migrations::run_migrations(&pool).await.unwrap();

    let config = test_config();
    let state = AppState {
        db: pool.clone(),
        db_service: Arc::new(DatabaseService::new(pool)),
        oauth_service: Arc::new(OAuthService::new(&config)),
        cache: CacheService::in_memory(),
        config,
    };
    Arc::new(RwLock::new(state))
}

async fn seed_user(shared: &Arc<RwLock<AppState>>, email: &str) -> User {
    let profile = OAuthProfile {
        provider: Provider::Google,
        provider_id: format!("google-{}", email),
        email: email.to_string(),
        full_name: None,
        avatar_url: None,
        username: email.split('@').next().unwrap().to_string(),
    };
    let tokens = ProviderTokens {
        access_token: "provider-access-token".to_string(),
        refresh_token: None,
        expires_in: None,
    };
    let state = shared.read().await.clone();
    state
        .db_service
        .create_user_with_oauth(&profile, &tokens)
        .await
        .unwrap()
}

fn refresh_body(token: String) -> Option<Json<RefreshRequest>> {
    Some(Json(RefreshRequest {
        refresh_token: Some(token),
    }))
}

#[test]
fn test_cache_key_formats() {
    assert_eq!(state_key("abc"), "oauth_state:abc");
    assert_eq!(session_key("SES_X"), "session:SES_X");
}

#[tokio::test]
async fn test_state_verification_accepts_stored_value() {
    let cache = CacheService::in_memory();
    let state = OAuthService::generate_state();
    cache
        .set_ex(&state_key(&state), "google", OAUTH_STATE_TTL_SECS)
        .await
        .unwrap();

    assert!(verify_and_consume_state(&cache, Provider::Google, &state)
        .await
        .is_ok());
}

#[tokio::test]
async fn test_state_verification_rejects_replay() {
    let cache = CacheService::in_memory();
    let state = OAuthService::generate_state();
    cache
        .set_ex(&state_key(&state), "github", OAUTH_STATE_TTL_SECS)
        .await
        .unwrap();

    verify_and_consume_state(&cache, Provider::Github, &state)
        .await
        .unwrap();

    // second presentation of the same state must fail
    assert!(verify_and_consume_state(&cache, Provider::Github, &state)
        .await
        .is_err());
}

#[tokio::test]
async fn test_state_verification_rejects_provider_mismatch() {
    let cache = CacheService::in_memory();
    cache
        .set_ex(&state_key("st"), "google", OAUTH_STATE_TTL_SECS)
        .await
        .unwrap();

    assert!(verify_and_consume_state(&cache, Provider::Github, "st")
        .await
        .is_err());
}

#[tokio::test]
async fn test_state_verification_rejects_unknown_value() {
    let cache = CacheService::in_memory();
    assert!(
        verify_and_consume_state(&cache, Provider::Google, "never-stored")
            .await
            .is_err()
    );
}

#[tokio::test]
async fn test_bearer_token_resolves_authenticated_user() {
    let shared = test_state().await;
    let user = seed_user(&shared, "alice@example.com").await;
    let token = create_access_token(&user, "test-secret", 30).unwrap();

    let request = Request::builder()
        .uri("/api/v1/auth/me")
        .header("authorization", format!("Bearer {}", token))
        .body(())
        .unwrap();
    let (mut parts, _) = request.into_parts();
    parts.extensions.insert(shared.clone());

    let authed = AuthedUser::from_request_parts(&mut parts, &())
        .await
        .unwrap();
    assert_eq!(authed.id, user.id);
    assert_eq!(authed.email, user.email);
}

#[tokio::test]
async fn test_extractor_rejects_unauthenticated_request() {
    let shared = test_state().await;

    let request = Request::builder()
        .uri("/api/v1/auth/me")
        .body(())
        .unwrap();
    let (mut parts, _) = request.into_parts();
    parts.extensions.insert(shared.clone());

    let result = AuthedUser::from_request_parts(&mut parts, &()).await;
    assert!(matches!(result, Err(ApiError::Unauthorized(_))));
}

#[tokio::test]
async fn test_refresh_accepts_valid_token_and_revokes_old() {
    let shared = test_state().await;
    let user = seed_user(&shared, "bob@example.com").await;
    let state = shared.read().await.clone();
    let rt = state
        .db_service
        .create_refresh_token(&user.id, 30)
        .await
        .unwrap();

    let result = refresh_handler(
        Extension(shared.clone()),
        CookieJar::new(),
        refresh_body(rt.token.clone()),
    )
    .await;
    assert!(result.is_ok());

    // rotation marked the presented token revoked
    let old = state
        .db_service
        .get_refresh_token(&rt.token)
        .await
        .unwrap()
        .unwrap();
    assert!(old.revoked);
}

#[tokio::test]
async fn test_refresh_rejects_revoked_token() {
    let shared = test_state().await;
    let user = seed_user(&shared, "carol@example.com").await;
    let state = shared.read().await.clone();
    let rt = state
        .db_service
        .create_refresh_token(&user.id, 30)
        .await
        .unwrap();
    state
        .db_service
        .revoke_refresh_token(&rt.token)
        .await
        .unwrap();

    let result = refresh_handler(
        Extension(shared.clone()),
        CookieJar::new(),
        refresh_body(rt.token),
    )
    .await;
    assert!(matches!(result, Err(ApiError::Unauthorized(_))));
}

#[tokio::test]
async fn test_refresh_rejects_expired_token() {
    let shared = test_state().await;
    let user = seed_user(&shared, "dave@example.com").await;
    let state = shared.read().await.clone();
    // negative ttl puts the expiry in the past
    let rt = state
        .db_service
        .create_refresh_token(&user.id, -1)
        .await
        .unwrap();

    let result = refresh_handler(
        Extension(shared.clone()),
        CookieJar::new(),
        refresh_body(rt.token),
    )
    .await;
    assert!(matches!(result, Err(ApiError::Unauthorized(_))));
}

#[tokio::test]
async fn test_refresh_rejects_deactivated_user() {
    let shared = test_state().await;
    let user = seed_user(&shared, "erin@example.com").await;
    let state = shared.read().await.clone();
    let rt = state
        .db_service
        .create_refresh_token(&user.id, 30)
        .await
        .unwrap();
    state.db_service.deactivate_user(&user.id).await.unwrap();

    let result = refresh_handler(
        Extension(shared.clone()),
        CookieJar::new(),
        refresh_body(rt.token),
    )
    .await;
    assert!(matches!(result, Err(ApiError::Unauthorized(_))));
}

#[tokio::test]
async fn test_refresh_rejects_unknown_token() {
    let shared = test_state().await;

    let result = refresh_handler(
        Extension(shared),
        CookieJar::new(),
        refresh_body("never-issued".to_string()),
    )
    .await;
    assert!(matches!(result, Err(ApiError::Unauthorized(_))));
}
