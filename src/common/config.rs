// src/common/config.rs
//! Environment-backed application configuration
//!
//! All knobs come from environment variables (loaded via dotenv in main).
//! A provider with incomplete credentials is left unconfigured and its
//! login endpoint fails with a configuration error; a missing JWT secret
//! is fatal at startup.

use std::env;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),

    #[error("invalid value for {0}: {1}")]
    InvalidVar(&'static str, String),
}

/// Client id/secret pair for one OAuth provider
#[derive(Debug, Clone)]
pub struct ProviderCredentials {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub jwt_secret: String,
    pub jwt_expire_minutes: i64,
    pub refresh_token_expire_days: i64,
    pub backend_url: String,
    pub frontend_url: String,
    pub google: Option<ProviderCredentials>,
    pub github: Option<ProviderCredentials>,
    pub cors_origins: String,
    pub port: u16,
    pub rate_limit_enabled: bool,
    pub rate_limit_max_requests: i64,
    pub rate_limit_window_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let jwt_secret = env::var("JWT_SECRET").map_err(|_| ConfigError::MissingVar("JWT_SECRET"))?;

        let jwt_expire_minutes = parse_var("JWT_EXPIRE_MINUTES", 30)?;
        let refresh_token_expire_days = parse_var("REFRESH_TOKEN_EXPIRE_DAYS", 30)?;

        let google = provider_credentials("GOOGLE_CLIENT_ID", "GOOGLE_CLIENT_SECRET");
        let github = provider_credentials("GITHUB_CLIENT_ID", "GITHUB_CLIENT_SECRET");

        if google.is_none() && github.is_none() {
            warn!("No OAuth provider configured - all login attempts will fail");
        }

        Ok(Config {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://auth_api.db".to_string()),
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379/0".to_string()),
            jwt_secret,
            jwt_expire_minutes,
            refresh_token_expire_days,
            backend_url: env::var("BACKEND_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            google,
            github,
            cors_origins: env::var("CORS_ORIGINS").unwrap_or_else(|_| {
                "http://localhost:3000,http://localhost:5173".to_string()
            }),
            port: parse_var("PORT", 8080)?,
            rate_limit_enabled: env::var("RATE_LIMIT_ENABLED")
                .map(|v| v != "false")
                .unwrap_or(true),
            rate_limit_max_requests: parse_var("RATE_LIMIT_MAX_REQUESTS", 120)?,
            rate_limit_window_secs: parse_var("RATE_LIMIT_WINDOW_SECS", 60)?,
        })
    }
}

/// Read both halves of a provider credential pair, or neither
fn provider_credentials(id_var: &str, secret_var: &str) -> Option<ProviderCredentials> {
    match (env::var(id_var), env::var(secret_var)) {
        (Ok(client_id), Ok(client_secret)) if !client_id.is_empty() && !client_secret.is_empty() => {
            Some(ProviderCredentials {
                client_id,
                client_secret,
            })
        }
        (Ok(_), Err(_)) | (Err(_), Ok(_)) => {
            warn!(
                id_var = id_var,
                secret_var = secret_var,
                "Partial OAuth credentials in environment, provider disabled"
            );
            None
        }
        _ => None,
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidVar(name, raw)),
        Err(_) => Ok(default),
    }
}
