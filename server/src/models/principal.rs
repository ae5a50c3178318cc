//! The authenticated identity handed to downstream code.

use chrono::{DateTime, Utc};

use crate::models::token::TokenRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrincipalKind {
    ApiToken,
    UserSession,
    /// Development mode only: authentication is disabled and every request
    /// shares one synthetic identity.
    Anonymous,
}

/// The output of the authenticator. Carries a hash-derived identity key and
/// never a secret.
#[derive(Debug, Clone)]
pub struct Principal {
    pub kind: PrincipalKind,
    /// Token hash or session hash; the connection broker keys pools on this.
    pub identity_key: String,
    /// Database the principal is pinned to, if any.
    pub database_binding: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Principal {
    pub fn from_token(token: &TokenRecord) -> Self {
        Self {
            kind: PrincipalKind::ApiToken,
            identity_key: token.hash.clone(),
            database_binding: token.database.clone(),
            expires_at: token.expires_at,
        }
    }

    pub fn user_session(session_hash: String, expires_at: DateTime<Utc>) -> Self {
        Self {
            kind: PrincipalKind::UserSession,
            identity_key: session_hash,
            database_binding: None,
            expires_at: Some(expires_at),
        }
    }

    /// The identity used when authentication is disabled.
    pub fn synthetic() -> Self {
        Self {
            kind: PrincipalKind::Anonymous,
            identity_key: "anonymous".into(),
            database_binding: None,
            expires_at: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}
