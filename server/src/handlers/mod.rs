pub mod auth;
pub mod health;
pub mod rpc;

use axum::{
    http::Method,
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::middleware as server_middleware;
use crate::state::AppState;

/// Assembles the full route tree. `/health` and the session-issuing endpoint
/// stay outside the bearer gate; the JSON-RPC surface sits behind it.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health::health))
        .route("/mcp/v1/auth", post(auth::authenticate_user));

    let protected_routes = Router::new()
        .route("/mcp/v1", post(rpc::rpc))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            server_middleware::auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(
            ServiceBuilder::new()
                .layer(axum_middleware::from_fn(server_middleware::request_id))
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                        .allow_headers(Any),
                ),
        )
        .with_state(state)
}
