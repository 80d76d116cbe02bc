// handlers/public/session.rs - POST /session/{signup,login,logout}

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::Json,
    routing::post,
    Router,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::auth::password::{hash_password_blocking, verify_password_blocking};
use crate::auth::TokenService;
use crate::database::{Collection, Document, Resource, StoreError};
use crate::error::ApiError;
use crate::models::{Role, User};

const MIN_PASSWORD_LENGTH: usize = 6;
const LOGIN_FAILED: &str = "That username and password combination does not exist";
const EMAIL_TAKEN: &str = "Email address already exists";

static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("static regex should not panic"));

#[derive(Clone)]
pub struct SessionState {
    pub users: Arc<dyn Collection>,
    pub tokens: TokenService,
}

#[derive(Debug, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

impl Credentials {
    fn normalized(self) -> (String, String) {
        (self.email.trim().to_lowercase(), self.password.trim().to_string())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionToken {
    pub token: String,
    pub user_id: String,
    pub expires_in: i64,
}

pub fn routes(state: SessionState) -> Router {
    Router::new()
        .route("/session/signup", post(signup))
        .route("/session/login", post(login))
        .route("/session/logout", post(logout))
        .with_state(state)
}

/// POST /session/signup - Register a new account
///
/// Input `{ "email", "password" }`; answers 201 `{ "_id": "<user id>" }`.
pub async fn signup(
    State(state): State<SessionState>,
    body: Result<Json<Credentials>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(credentials) = body?;
    let (email, password) = credentials.normalized();

    let mut field_errors = HashMap::new();
    if !EMAIL.is_match(&email) {
        field_errors.insert("email".to_string(), "Please enter a valid email address".to_string());
    } else if state.users.find_one_by("email", &json!(email)).await?.is_some() {
        field_errors.insert("email".to_string(), EMAIL_TAKEN.to_string());
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        field_errors.insert(
            "password".to_string(),
            format!("Password must be at least {} characters", MIN_PASSWORD_LENGTH),
        );
    }
    if !field_errors.is_empty() {
        return Err(ApiError::validation_error("Validation failed", Some(field_errors)));
    }

    let user = User {
        email,
        password: hash_password_blocking(password).await?,
        role: Role::User,
    };
    // The unique email index decides concurrent signups that all passed the check above
    let id = match state.users.insert(to_document(&user)?).await {
        Ok(id) => id,
        Err(StoreError::Duplicate { .. }) => return Err(ApiError::field_error("email", EMAIL_TAKEN)),
        Err(e) => return Err(e.into()),
    };

    tracing::info!("Registered user {}", id);
    Ok((StatusCode::CREATED, Json(json!({ "_id": id }))))
}

/// POST /session/login - Exchange credentials for a bearer token
pub async fn login(
    State(state): State<SessionState>,
    body: Result<Json<Credentials>, JsonRejection>,
) -> Result<Json<SessionToken>, ApiError> {
    let Json(credentials) = body?;
    let (email, password) = credentials.normalized();

    let Some(doc) = state.users.find_one_by("email", &json!(email)).await? else {
        tracing::warn!("Login attempt for unknown account");
        return Err(ApiError::unauthorized(LOGIN_FAILED));
    };

    let hash = doc.get("password").and_then(Value::as_str).unwrap_or_default().to_string();
    if !verify_password_blocking(password, hash).await? {
        tracing::warn!("Login attempt with wrong password");
        return Err(ApiError::unauthorized(LOGIN_FAILED));
    }

    let user_id = doc
        .get(User::PRIMARY_KEY)
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::internal("Stored user has no id"))?
        .to_string();

    Ok(Json(SessionToken {
        token: state.tokens.issue(&user_id, &email)?,
        user_id,
        expires_in: state.tokens.expires_in_seconds(),
    }))
}

/// POST /session/logout - Tokens are stateless, nothing to revoke
pub async fn logout() -> StatusCode {
    StatusCode::NO_CONTENT
}

fn to_document(user: &User) -> Result<Document, ApiError> {
    match serde_json::to_value(user) {
        Ok(Value::Object(doc)) => Ok(doc),
        Ok(_) => Err(ApiError::internal("User did not serialize to an object")),
        Err(e) => Err(ApiError::internal(format!("User serialization error: {}", e))),
    }
}
