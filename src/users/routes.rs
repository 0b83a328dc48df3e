// src/users/routes.rs
use axum::{
    routing::{get, patch},
    Router,
};

use super::handlers::{delete_user, get_user, list_my_accounts, list_users, update_me};

pub fn users_routes() -> Router {
    Router::new()
        .route("/api/v1/users", get(list_users))
        .route("/api/v1/users/me", patch(update_me))
        .route("/api/v1/users/me/accounts", get(list_my_accounts))
        .route(
            "/api/v1/users/:user_id",
            get(get_user).delete(delete_user),
        )
}
