//! Memory-resident session records issued after a successful password
//! authentication. Sessions do not survive a restart.

use chrono::{DateTime, Duration, Utc};

/// Lifetime of an interactive session.
pub fn session_ttl() -> Duration {
    Duration::hours(24)
}

/// One live session. Only the SHA-256 of the session token is retained; the
/// plaintext secret is returned to the caller exactly once.
#[derive(Debug, Clone)]
pub struct Session {
    /// Lowercase hex SHA-256 of the session token.
    pub hash: String,
    pub username: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
