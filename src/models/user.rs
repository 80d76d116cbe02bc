use serde::{Deserialize, Serialize};

use crate::database::Resource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

/// Registered account. `password` holds the Argon2 hash, never the plain text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub email: String,
    pub password: String,
    pub role: Role,
}

impl Resource for User {
    const COLLECTION: &'static str = "users";
    const UNIQUE: &'static [&'static str] = &["email"];
}
