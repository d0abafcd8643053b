// User registration and lookup payloads

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::auth::Identity;

/// Usernames are short ASCII handles; they also appear in URLs and Basic auth
static USERNAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.-]{1,15}$").unwrap());

/// POST /api/users body
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterUserRequest {
    pub username: Option<String>,
    pub password: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
}

/// Public view of an identity; never includes the password hash
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserResponse {
    pub username: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

impl From<Identity> for UserResponse {
    fn from(identity: Identity) -> Self {
        Self {
            username: identity.username,
            email: identity.email,
            name: identity.name,
        }
    }
}

/// GET /api/token response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
    /// Lifetime in seconds
    pub duration: u64,
}

/// Whether `username` is acceptable for registration
pub fn is_valid_username(username: &str) -> bool {
    USERNAME_PATTERN.is_match(username)
}
