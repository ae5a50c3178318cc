use axum::{
    extract::{FromRequest, Request, State},
    Json,
};
use chrono::Utc;

use crate::{
    error::AppError,
    middleware::client_ip,
    models::user::{AuthenticateRequest, AuthenticateResponse},
    state::AppState,
};

/// Username/password authentication. The returned session token is the only
/// plaintext copy that ever leaves the server. Every failure mode is the
/// same opaque 401; the log carries the kind.
pub async fn authenticate_user(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<AuthenticateResponse>, AppError> {
    let ip = client_ip(request.extensions());
    let Json(payload): Json<AuthenticateRequest> = Json::from_request(request, &())
        .await
        .map_err(|_| AppError::BadRequest("Invalid request body".to_string()))?;

    match state
        .authenticator
        .authenticate_user(&payload.username, &payload.password, ip, Utc::now())
    {
        Ok(grant) => Ok(Json(AuthenticateResponse {
            session_token: grant.token,
            expires_at: grant.expires_at,
        })),
        Err(err) => {
            tracing::warn!(kind = err.kind(), client = %ip, "user authentication rejected");
            Err(err.into())
        }
    }
}
