// src/auth/routes.rs
use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{
    logout_handler, me_handler, oauth_callback, oauth_login, refresh_handler, session_handler,
};

pub fn auth_routes() -> Router {
    Router::new()
        .route("/api/v1/auth/:provider/login", get(oauth_login))
        .route("/api/v1/auth/:provider/callback", get(oauth_callback))
        .route("/api/v1/auth/me", get(me_handler))
        .route("/api/v1/auth/logout", post(logout_handler))
        .route("/api/v1/auth/session", get(session_handler))
        .route("/api/v1/auth/refresh", post(refresh_handler))
}
