//! JWT issuance and validation
//!
//! Tokens are HS256-signed and carry the user id as subject plus username
//! and email claims. Validation distinguishes expiry from every other
//! failure internally; the HTTP boundary collapses both into a uniform
//! 401 so clients learn nothing about which check failed.

use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::models::User;
use crate::common::ApiError;

/// JWT claims structure
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Claims {
    pub sub: String,
    pub username: String,
    pub email: String,
    pub iat: usize,
    pub exp: usize,
}

#[derive(Debug, Error, PartialEq)]
pub enum TokenError {
    #[error("token expired")]
    Expired,

    #[error("invalid token")]
    Invalid,

    #[error("token creation failed")]
    Creation,
}

impl From<TokenError> for ApiError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Creation => ApiError::InternalServer("jwt error".to_string()),
            // expired and malformed look identical to the client
            TokenError::Expired | TokenError::Invalid => {
                ApiError::Unauthorized("invalid token".to_string())
            }
        }
    }
}

/// Build a signed access token for the user
pub fn create_access_token(
    user: &User,
    secret: &str,
    expire_minutes: i64,
) -> Result<String, TokenError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user.id.clone(),
        username: user.username.clone(),
        email: user.email.clone(),
        iat: now.timestamp() as usize,
        exp: (now + Duration::minutes(expire_minutes)).timestamp() as usize,
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|_| TokenError::Creation)
}

/// Verify signature and expiry, returning the claims
pub fn decode_token(token: &str, secret: &str) -> Result<Claims, TokenError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => TokenError::Expired,
        _ => TokenError::Invalid,
    })
}
