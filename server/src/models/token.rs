//! On-disk representation of long-lived API tokens.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single API token as stored in the token file. The plaintext secret is
/// never persisted; `hash` is the lowercase hex SHA-256 of the secret.
///
/// Unknown keys are ignored on load so older and newer file layouts (with or
/// without the `database` binding) both parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Opaque stable identifier, unique within the file.
    pub id: String,
    /// Lowercase hex SHA-256 of the token secret, unique within the file.
    pub hash: String,
    #[serde(default)]
    pub note: String,
    pub created_at: DateTime<Utc>,
    /// Absent means the token never expires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Optional database binding; unbound tokens use the default database.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
}

impl TokenRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

/// Root document of the token file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenFile {
    #[serde(default)]
    pub tokens: Vec<TokenRecord>,
}
