//! User management handlers

use axum::extract::{Extension, Path, Query};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::auth::extractors::AuthedUser;
use crate::auth::models::{OAuthAccount, User, UserUpdate};
use crate::common::{ApiError, AppState};

fn default_limit() -> i64 {
    10
}

#[derive(Deserialize, Debug)]
pub struct Pagination {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

/// GET /api/v1/users
pub async fn list_users(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    _authed: AuthedUser,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Vec<User>>, ApiError> {
    let state = state_lock.read().await.clone();

    let skip = pagination.skip.max(0);
    let limit = pagination.limit.clamp(1, 100);

    let users = state.db_service.list_users(skip, limit).await?;
    Ok(Json(users))
}

/// GET /api/v1/users/:user_id
pub async fn get_user(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    _authed: AuthedUser,
    Path(user_id): Path<String>,
) -> Result<Json<User>, ApiError> {
    let state = state_lock.read().await.clone();

    let user = state
        .db_service
        .get_user(&user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("user not found".to_string()))?;

    Ok(Json(user))
}

/// PATCH /api/v1/users/me
/// Updates the caller's own profile; absent fields are left unchanged
pub async fn update_me(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    authed: AuthedUser,
    Json(changes): Json<UserUpdate>,
) -> Result<Json<User>, ApiError> {
    let state = state_lock.read().await.clone();

    if let Some(username) = &changes.username {
        if username.trim().is_empty() {
            return Err(ApiError::BadRequest("username cannot be empty".to_string()));
        }
    }

    let user = state
        .db_service
        .update_user(&authed.id, &changes)
        .await?
        .ok_or_else(|| ApiError::NotFound("user not found".to_string()))?;

    info!(user_id = %user.id, "User profile updated");
    Ok(Json(user))
}

/// GET /api/v1/users/me/accounts
/// Lists the caller's linked provider accounts (tokens are not serialized)
pub async fn list_my_accounts(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    authed: AuthedUser,
) -> Result<Json<Vec<OAuthAccount>>, ApiError> {
    let state = state_lock.read().await.clone();

    let accounts = state.db_service.list_oauth_accounts(&authed.id).await?;
    Ok(Json(accounts))
}

/// DELETE /api/v1/users/:user_id
/// Soft-deactivates the account. Users may only deactivate themselves.
pub async fn delete_user(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    authed: AuthedUser,
    Path(user_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let state = state_lock.read().await.clone();

    if authed.id != user_id {
        return Err(ApiError::Forbidden(
            "cannot deactivate another user".to_string(),
        ));
    }

    let deactivated = state.db_service.deactivate_user(&user_id).await?;
    if !deactivated {
        return Err(ApiError::NotFound("user not found".to_string()));
    }

    info!(user_id = %user_id, "User account deactivated");
    Ok(Json(
        serde_json::json!({ "message": "Account deactivated successfully" }),
    ))
}
