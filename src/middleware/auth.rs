use std::collections::HashMap;

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use crate::auth::{Claims, TokenService};
use crate::error::ApiError;

/// Identity of the authenticated caller, attached to request extensions by
/// [`require_auth`]. Attributes are looked up by name, so a model's ownership
/// property (`userId` by default) resolves directly against it.
#[derive(Clone, Debug, Default)]
pub struct CallerContext {
    attributes: HashMap<String, String>,
}

impl CallerContext {
    pub const USER_ID: &'static str = "userId";
    pub const EMAIL: &'static str = "email";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn user_id(&self) -> Option<&str> {
        self.get(Self::USER_ID)
    }
}

impl From<Claims> for CallerContext {
    fn from(claims: Claims) -> Self {
        CallerContext::new()
            .with(Self::USER_ID, claims.id)
            .with(Self::EMAIL, claims.email)
    }
}

/// JWT authentication middleware that validates tokens and attaches the caller context
pub async fn require_auth(
    State(tokens): State<TokenService>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_jwt_from_headers(request.headers()).map_err(ApiError::unauthorized)?;
    let claims = tokens.verify(token)?;

    request.extensions_mut().insert(CallerContext::from(claims));

    Ok(next.run(request).await)
}

/// Extract JWT token from Authorization header
fn extract_jwt_from_headers(headers: &HeaderMap) -> Result<&str, String> {
    let auth_header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or_else(|| "Missing Authorization header".to_string())?;

    let auth_str = auth_header
        .to_str()
        .map_err(|_| "Invalid Authorization header format".to_string())?;

    match auth_str.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Ok(token.trim()),
        Some(_) => Err("Empty JWT token".to_string()),
        None => Err("Authorization header must use Bearer token format".to_string()),
    }
}
