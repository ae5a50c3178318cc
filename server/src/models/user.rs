//! On-disk representation of interactive user accounts and the payloads of
//! the session-issuing endpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single user account as stored in the user file. `password_hash` is a
/// bcrypt hash (cost >= 12); the plaintext password is never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Unique, case-sensitive login name.
    pub username: String,
    pub password_hash: String,
    #[serde(default)]
    pub note: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login_at: Option<DateTime<Utc>>,
    /// Disabled users can never authenticate.
    pub enabled: bool,
    #[serde(default)]
    pub failed_attempts: u32,
}

/// Root document of the user file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserFile {
    #[serde(default)]
    pub users: Vec<UserRecord>,
}

/// Credentials submitted to the session-issuing endpoint.
#[derive(Debug, Deserialize)]
pub struct AuthenticateRequest {
    pub username: String,
    pub password: String,
}

/// Successful response of the session-issuing endpoint. The `session_token`
/// is the only time the secret leaves the server.
#[derive(Debug, Serialize)]
pub struct AuthenticateResponse {
    pub session_token: String,
    pub expires_at: DateTime<Utc>,
}
