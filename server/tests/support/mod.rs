#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{DateTime, Utc};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use pgmcp_server::{
    auth::{
        authenticator::Authenticator, rate_limit::RateLimiter, token_store::TokenStore,
        user_store::UserStore,
    },
    config::{AuthConfig, Config, DatabaseConfig},
    db::broker::ConnectionBroker,
    handlers,
    models::token::{TokenFile, TokenRecord},
    models::user::{UserFile, UserRecord},
    state::AppState,
    utils::token::sha256_hex,
};

pub fn database(name: &str, available_to_users: bool) -> DatabaseConfig {
    DatabaseConfig {
        name: name.into(),
        host: "127.0.0.1".into(),
        port: 5432,
        database: name.into(),
        user: "svc".into(),
        password: "pw".into(),
        sslmode: "prefer".into(),
        pool_max_conns: 2,
        pool_min_conns: 0,
        pool_max_conn_idle_time: 60,
        available_to_users,
    }
}

pub fn token_record(
    id: &str,
    secret: &str,
    expires_at: Option<DateTime<Utc>>,
    database: Option<&str>,
) -> TokenRecord {
    TokenRecord {
        id: id.into(),
        hash: sha256_hex(secret),
        note: String::new(),
        created_at: Utc::now(),
        expires_at,
        database: database.map(String::from),
    }
}

pub fn user_record(username: &str, password: &str, enabled: bool) -> UserRecord {
    UserRecord {
        username: username.into(),
        // low bcrypt cost keeps the suite fast; verification is cost-agnostic
        password_hash: bcrypt::hash(password, 4).expect("hash"),
        note: String::new(),
        created_at: Utc::now(),
        last_login_at: None,
        enabled,
        failed_attempts: 0,
    }
}

pub struct TestServer {
    pub app: Router,
    pub tokens: Arc<TokenStore>,
    pub users: Arc<UserStore>,
    pub broker: Arc<ConnectionBroker>,
}

pub struct TestServerOptions {
    pub auth_enabled: bool,
    pub lockout_threshold: u32,
    pub rate_limit_max_attempts: u32,
    pub databases: Vec<DatabaseConfig>,
}

impl Default for TestServerOptions {
    fn default() -> Self {
        Self {
            auth_enabled: true,
            lockout_threshold: 0,
            rate_limit_max_attempts: 100,
            databases: vec![database("staging", true), database("production", false)],
        }
    }
}

pub fn test_server(
    tokens: Vec<TokenRecord>,
    users: Vec<UserRecord>,
    options: TestServerOptions,
) -> TestServer {
    let token_store = Arc::new(TokenStore::from_file(TokenFile { tokens }, Utc::now()));
    let user_store = Arc::new(UserStore::from_file(
        UserFile { users },
        options.lockout_threshold,
    ));
    let limiter = Arc::new(RateLimiter::new(15, options.rate_limit_max_attempts));
    let authenticator = Arc::new(Authenticator::new(
        options.auth_enabled,
        Arc::clone(&token_store),
        Arc::clone(&user_store),
        limiter,
    ));
    let broker = Arc::new(ConnectionBroker::new(
        options.databases.clone(),
        Arc::clone(&token_store),
        Arc::clone(&user_store),
    ));

    let config = Config {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        auth: AuthConfig {
            enabled: options.auth_enabled,
            token_file: PathBuf::from("/nonexistent/tokens.yaml"),
            user_file: PathBuf::from("/nonexistent/users.yaml"),
            max_failed_attempts: options.lockout_threshold,
            rate_limit_window_minutes: 15,
            rate_limit_max_attempts: options.rate_limit_max_attempts,
        },
        databases: options.databases,
    };

    let app = handlers::router(AppState::new(
        authenticator,
        Arc::clone(&broker),
        config,
    ));

    TestServer {
        app,
        tokens: token_store,
        users: user_store,
        broker,
    }
}

fn peer(ip: &str) -> ConnectInfo<SocketAddr> {
    ConnectInfo(format!("{}:54321", ip).parse().expect("peer addr"))
}

pub fn rpc_ping(bearer: Option<&str>, ip: &str) -> Request<Body> {
    let body = json!({"jsonrpc": "2.0", "method": "ping", "id": 1});
    let mut builder = Request::builder()
        .method("POST")
        .uri("/mcp/v1")
        .header("content-type", "application/json")
        .extension(peer(ip));
    if let Some(secret) = bearer {
        builder = builder.header("authorization", format!("Bearer {}", secret));
    }
    builder
        .body(Body::from(body.to_string()))
        .expect("build request")
}

pub fn authenticate(username: &str, password: &str, ip: &str) -> Request<Body> {
    let body = json!({"username": username, "password": password});
    Request::builder()
        .method("POST")
        .uri("/mcp/v1/auth")
        .header("content-type", "application/json")
        .extension(peer(ip))
        .body(Body::from(body.to_string()))
        .expect("build request")
}

pub fn health() -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .expect("build request")
}

pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.expect("send request");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("parse body")
    };
    (status, value)
}
