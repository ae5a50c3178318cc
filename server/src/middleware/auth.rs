use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use crate::{error::AppError, state::AppState};

/// Bearer authentication for the JSON-RPC surface. On success the resulting
/// [`Principal`](crate::models::principal::Principal) is attached to the
/// request; every failure is the same opaque 401.
pub async fn auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    let ip = client_ip(request.extensions());

    match state
        .authenticator
        .authenticate_bearer(header, ip, Utc::now())
    {
        Ok(principal) => {
            request.extensions_mut().insert(principal);
            Ok(next.run(request).await)
        }
        Err(err) => {
            tracing::warn!(kind = err.kind(), client = %ip, "authentication rejected");
            Err(err.into())
        }
    }
}

/// The peer address recorded by the listener. Absent only in exotic setups
/// (or tests that forgot to inject it), which fold into one bucket.
pub fn client_ip(extensions: &axum::http::Extensions) -> IpAddr {
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}
