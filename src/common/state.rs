// Application state shared across all modules

use sqlx::SqlitePool;
use std::sync::Arc;

use crate::common::config::Config;
use crate::services::{CacheService, DatabaseService, OAuthService};

/// Application state containing database pool, services, and configuration
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Config,
    pub db_service: Arc<DatabaseService>,
    pub oauth_service: Arc<OAuthService>,
    pub cache: CacheService,
}
