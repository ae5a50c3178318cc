//! Error taxonomy. Authentication failures carry an internal kind that is
//! logged but collapses to a single opaque 401 on the wire.

use std::path::PathBuf;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Why an authentication attempt failed. Only the server log ever sees the
/// distinction; clients get `Unauthorized` for every variant.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing Authorization header")]
    MissingAuthorization,
    #[error("malformed Authorization header")]
    MalformedAuthorization,
    #[error("unknown token")]
    UnknownToken,
    #[error("expired token")]
    ExpiredToken,
    #[error("unknown user")]
    UnknownUser,
    #[error("wrong password")]
    WrongPassword,
    #[error("user is disabled")]
    UserDisabled,
    #[error("session expired")]
    SessionExpired,
    #[error("too many failed attempts from this address")]
    RateLimited,
    /// bcrypt or RNG failure. Fatal for the attempt, never for the server.
    #[error("credential backend failure")]
    Internal(#[source] anyhow::Error),
}

impl AuthError {
    /// Stable kind string used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::MissingAuthorization => "missing_authorization",
            AuthError::MalformedAuthorization => "malformed_authorization",
            AuthError::UnknownToken => "unknown_token",
            AuthError::ExpiredToken => "expired_token",
            AuthError::UnknownUser => "unknown_user",
            AuthError::WrongPassword => "wrong_password",
            AuthError::UserDisabled => "user_disabled",
            AuthError::SessionExpired => "session_expired",
            AuthError::RateLimited => "rate_limited",
            AuthError::Internal(_) => "internal",
        }
    }
}

/// Failures reading or writing a credential file. Fatal at startup, logged
/// and ignored (old state retained) during runtime reloads.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("{}: mode {mode:03o} is too permissive, credential files must be 0600", .path.display())]
    Permission { path: PathBuf, mode: u32 },
    #[error("{}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CodecError {
    pub fn kind(&self) -> &'static str {
        match self {
            CodecError::Permission { .. } => "file_permission",
            CodecError::Parse { .. } => "file_parse",
            CodecError::Io { .. } => "file_io",
        }
    }
}

/// Failures leasing a connection pool.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("no database named '{0}' is configured")]
    UnknownDatabase(String),
    #[error("no database is configured")]
    NoDatabase,
    #[error("no database is available to interactive users")]
    NoUserDatabase,
    #[error("principal has expired")]
    PrincipalExpired,
    #[error("failed to open connection pool: {0}")]
    Pool(#[source] anyhow::Error),
}

/// HTTP-facing error. Authentication failures serialize to exactly
/// `{"error":"Unauthorized"}` with no further detail.
#[derive(Debug)]
pub enum AppError {
    Unauthorized,
    BadRequest(String),
    Unavailable(String),
    Internal(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Unauthorized" })),
            )
                .into_response(),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))).into_response()
            }
            AppError::Unavailable(msg) => {
                tracing::warn!(reason = %msg, "service unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({ "error": "Unavailable" })),
                )
                    .into_response()
            }
            AppError::Internal(err) => {
                tracing::error!("Internal server error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Internal server error" })),
                )
                    .into_response()
            }
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Internal(inner) => AppError::Internal(inner),
            _ => AppError::Unauthorized,
        }
    }
}

impl From<BrokerError> for AppError {
    fn from(err: BrokerError) -> Self {
        match err {
            BrokerError::PrincipalExpired => AppError::Unauthorized,
            other => AppError::Unavailable(other.to_string()),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}
