pub mod password;

use std::sync::Arc;

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{Environment, SecurityConfig};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("JWT secret not configured")]
    MissingSecret,

    #[error("JWT generation error: {0}")]
    TokenGeneration(String),

    #[error("{0}")]
    InvalidToken(String),

    #[error("Password hashing error: {0}")]
    Hashing(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub id: String,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn new(id: String, email: String, expiry_hours: u64) -> Self {
        let now = Utc::now();
        let exp = (now + Duration::hours(expiry_hours as i64)).timestamp();

        Self {
            id,
            email,
            iat: now.timestamp(),
            exp,
        }
    }
}

/// Issues and verifies HS256 session tokens.
#[derive(Clone)]
pub struct TokenService {
    secret: Option<Arc<str>>,
    expiry_hours: u64,
}

impl TokenService {
    pub fn new(secret: Option<String>, expiry_hours: u64) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()).map(Arc::from),
            expiry_hours,
        }
    }

    /// Development gets a throwaway per-process secret when none is configured;
    /// other environments keep it missing so gated routes fail loudly.
    pub fn from_config(security: &SecurityConfig, environment: Environment) -> Self {
        let mut secret = security.jwt_secret.clone();
        if secret.is_none() {
            if environment == Environment::Development {
                tracing::warn!("JWT_SECRET is not set; using a random secret, tokens will not survive a restart");
                secret = Some(format!(
                    "{}{}",
                    uuid::Uuid::new_v4().simple(),
                    uuid::Uuid::new_v4().simple()
                ));
            } else {
                tracing::error!("JWT_SECRET is not set; authenticated routes will fail");
            }
        }
        Self::new(secret, security.jwt_expiry_hours)
    }

    pub fn expires_in_seconds(&self) -> i64 {
        self.expiry_hours as i64 * 3600
    }

    pub fn issue(&self, id: &str, email: &str) -> Result<String, AuthError> {
        let secret = self.secret.as_deref().ok_or(AuthError::MissingSecret)?;
        let claims = Claims::new(id.to_string(), email.to_string(), self.expiry_hours);

        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
            .map_err(|e| AuthError::TokenGeneration(e.to_string()))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let secret = self.secret.as_deref().ok_or(AuthError::MissingSecret)?;

        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| AuthError::InvalidToken(format!("Invalid JWT token: {}", e)))?;

        Ok(token_data.claims)
    }
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("configured", &self.secret.is_some())
            .field("expiry_hours", &self.expiry_hours)
            .finish()
    }
}
