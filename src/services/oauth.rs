// src/services/oauth.rs
//! OAuth2 authorization-code flow against Google and GitHub
//!
//! Builds provider authorization URLs, exchanges authorization codes for
//! provider tokens and fetches the user profile, normalizing both providers
//! into a single `OAuthProfile` shape for the account layer.

use reqwest::header::USER_AGENT;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::common::config::{Config, ProviderCredentials};
use crate::common::generate_raw_id;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

const GITHUB_AUTH_URL: &str = "https://github.com/login/oauth/authorize";
const GITHUB_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const GITHUB_USER_URL: &str = "https://api.github.com/user";
const GITHUB_EMAILS_URL: &str = "https://api.github.com/user/emails";

// GitHub's API rejects requests without a User-Agent
const API_USER_AGENT: &str = "auth-api";

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("OAuth provider {0} not configured")]
    NotConfigured(&'static str),

    #[error("unsupported OAuth provider: {0}")]
    UnsupportedProvider(String),

    #[error("token exchange failed: {0}")]
    ExchangeFailed(String),

    #[error("userinfo fetch failed: {0}")]
    ProfileFetchFailed(String),

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
}

impl From<OAuthError> for crate::common::ApiError {
    fn from(e: OAuthError) -> Self {
        use crate::common::ApiError;
        match e {
            OAuthError::UnsupportedProvider(p) => {
                ApiError::BadRequest(format!("Unsupported OAuth provider: {}", p))
            }
            OAuthError::NotConfigured(provider) => {
                error!(provider = provider, "OAuth provider not configured");
                ApiError::InternalServer("oauth provider not configured".to_string())
            }
            // provider-side failures are logged with detail server-side and
            // surfaced as a generic authentication failure
            other => {
                error!(error = %other, "OAuth flow failed");
                ApiError::Unauthorized("authentication failed".to_string())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Google,
    Github,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Google => "google",
            Provider::Github => "github",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = OAuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "google" => Ok(Provider::Google),
            "github" => Ok(Provider::Github),
            other => Err(OAuthError::UnsupportedProvider(other.to_string())),
        }
    }
}

/// Provider identity normalized across Google and GitHub
#[derive(Debug, Clone, Serialize)]
pub struct OAuthProfile {
    pub provider: Provider,
    pub provider_id: String,
    pub email: String,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    pub username: String,
}

/// Raw tokens returned by the provider's token endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct OAuthService {
    client: Client,
    google: Option<ProviderCredentials>,
    github: Option<ProviderCredentials>,
}

impl OAuthService {
    pub fn new(config: &Config) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            google: config.google.clone(),
            github: config.github.clone(),
        }
    }

    /// Generate a cryptographically random opaque state value
    pub fn generate_state() -> String {
        generate_raw_id(32)
    }

    fn credentials(&self, provider: Provider) -> Result<&ProviderCredentials, OAuthError> {
        match provider {
            Provider::Google => self
                .google
                .as_ref()
                .ok_or(OAuthError::NotConfigured("google")),
            Provider::Github => self
                .github
                .as_ref()
                .ok_or(OAuthError::NotConfigured("github")),
        }
    }

    /// Build the provider's authorization endpoint URL
    pub fn authorization_url(
        &self,
        provider: Provider,
        redirect_uri: &str,
        state: &str,
    ) -> Result<String, OAuthError> {
        let creds = self.credentials(provider)?;

        let url = match provider {
            Provider::Google => format!(
                "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}&access_type=offline&prompt=select_account",
                GOOGLE_AUTH_URL,
                urlencoding::encode(&creds.client_id),
                urlencoding::encode(redirect_uri),
                urlencoding::encode("openid email profile"),
                urlencoding::encode(state),
            ),
            Provider::Github => format!(
                "{}?client_id={}&redirect_uri={}&scope={}&state={}",
                GITHUB_AUTH_URL,
                urlencoding::encode(&creds.client_id),
                urlencoding::encode(redirect_uri),
                urlencoding::encode("user:email"),
                urlencoding::encode(state),
            ),
        };

        debug!(provider = %provider, "Generated OAuth authorization URL");
        Ok(url)
    }

    /// Exchange an authorization code for tokens and fetch the user profile
    pub async fn exchange_code(
        &self,
        provider: Provider,
        code: &str,
        redirect_uri: &str,
    ) -> Result<(OAuthProfile, ProviderTokens), OAuthError> {
        let tokens = self.fetch_tokens(provider, code, redirect_uri).await?;

        let profile = match provider {
            Provider::Google => self.fetch_google_profile(&tokens.access_token).await?,
            Provider::Github => self.fetch_github_profile(&tokens.access_token).await?,
        };

        Ok((profile, tokens))
    }

    async fn fetch_tokens(
        &self,
        provider: Provider,
        code: &str,
        redirect_uri: &str,
    ) -> Result<ProviderTokens, OAuthError> {
        let creds = self.credentials(provider)?;

        let token_url = match provider {
            Provider::Google => GOOGLE_TOKEN_URL,
            Provider::Github => GITHUB_TOKEN_URL,
        };

        let params = [
            ("code", code),
            ("client_id", creds.client_id.as_str()),
            ("client_secret", creds.client_secret.as_str()),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
        ];

        debug!(provider = %provider, "Exchanging authorization code for tokens");

        let response = self
            .client
            .post(token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&params)
            .send()
            .await
            .map_err(|e| OAuthError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!(provider = %provider, status = %status, error = %error_text, "Token exchange failed");
            return Err(OAuthError::ExchangeFailed(format!(
                "HTTP {}: {}",
                status, error_text
            )));
        }

        response
            .json::<ProviderTokens>()
            .await
            .map_err(|e| OAuthError::MalformedResponse(e.to_string()))
    }

    async fn fetch_google_profile(&self, access_token: &str) -> Result<OAuthProfile, OAuthError> {
        #[derive(Deserialize)]
        struct GoogleUserInfo {
            sub: String,
            email: Option<String>,
            name: Option<String>,
            picture: Option<String>,
        }

        let response = self
            .client
            .get(GOOGLE_USERINFO_URL)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| OAuthError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(OAuthError::ProfileFetchFailed(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let info = response
            .json::<GoogleUserInfo>()
            .await
            .map_err(|e| OAuthError::MalformedResponse(e.to_string()))?;

        // Account linking is keyed on email, so a profile without one is unusable
        let email = info
            .email
            .ok_or_else(|| OAuthError::MalformedResponse("missing email".to_string()))?;
        let username = email.split('@').next().unwrap_or(&email).to_string();

        Ok(OAuthProfile {
            provider: Provider::Google,
            provider_id: info.sub,
            email,
            full_name: info.name,
            avatar_url: info.picture,
            username,
        })
    }

    async fn fetch_github_profile(&self, access_token: &str) -> Result<OAuthProfile, OAuthError> {
        #[derive(Deserialize)]
        struct GithubUser {
            id: i64,
            login: String,
            name: Option<String>,
            email: Option<String>,
            avatar_url: Option<String>,
        }

        #[derive(Deserialize)]
        struct GithubEmail {
            email: String,
            primary: bool,
            verified: bool,
        }

        let response = self
            .client
            .get(GITHUB_USER_URL)
            .bearer_auth(access_token)
            .header(USER_AGENT, API_USER_AGENT)
            .send()
            .await
            .map_err(|e| OAuthError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(OAuthError::ProfileFetchFailed(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let user = response
            .json::<GithubUser>()
            .await
            .map_err(|e| OAuthError::MalformedResponse(e.to_string()))?;

        // The public profile email is often hidden; resolve the primary
        // address from the emails endpoint instead
        let email = match &user.email {
            Some(email) => email.clone(),
            None => {
                let emails_resp = self
                    .client
                    .get(GITHUB_EMAILS_URL)
                    .bearer_auth(access_token)
                    .header(USER_AGENT, API_USER_AGENT)
                    .send()
                    .await
                    .map_err(|e| OAuthError::RequestFailed(e.to_string()))?;

                let emails = if emails_resp.status().is_success() {
                    emails_resp
                        .json::<Vec<GithubEmail>>()
                        .await
                        .map_err(|e| OAuthError::MalformedResponse(e.to_string()))?
                } else {
                    warn!(
                        status = %emails_resp.status(),
                        "GitHub emails endpoint unavailable"
                    );
                    Vec::new()
                };

                emails
                    .iter()
                    .find(|e| e.primary)
                    .or_else(|| emails.iter().find(|e| e.verified))
                    .map(|e| e.email.clone())
                    .ok_or_else(|| OAuthError::MalformedResponse("missing email".to_string()))?
            }
        };

        Ok(OAuthProfile {
            provider: Provider::Github,
            provider_id: user.id.to_string(),
            email,
            full_name: user.name,
            avatar_url: user.avatar_url,
            username: user.login,
        })
    }
}
