use std::env;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

/// One PostgreSQL target the broker can bind principals to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub name: String,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub database: String,
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_sslmode")]
    pub sslmode: String,
    #[serde(default = "default_pool_max_conns")]
    pub pool_max_conns: u32,
    #[serde(default)]
    pub pool_min_conns: u32,
    /// Seconds an idle connection may linger before the pool closes it.
    #[serde(default = "default_pool_idle_secs")]
    pub pool_max_conn_idle_time: u64,
    /// Whether interactive user sessions may be routed here.
    #[serde(default)]
    pub available_to_users: bool,
}

fn default_port() -> u16 {
    5432
}

fn default_sslmode() -> String {
    "prefer".to_string()
}

fn default_pool_max_conns() -> u32 {
    10
}

fn default_pool_idle_secs() -> u64 {
    300
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub enabled: bool,
    pub token_file: PathBuf,
    pub user_file: PathBuf,
    /// Consecutive wrong passwords before an account is disabled; 0 turns
    /// lockout off.
    pub max_failed_attempts: u32,
    pub rate_limit_window_minutes: u64,
    pub rate_limit_max_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub auth: AuthConfig,
    pub databases: Vec<DatabaseConfig>,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let bind_addr = env::var("BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string())
            .parse()
            .map_err(|_| anyhow!("Invalid BIND_ADDR value"))?;

        let enabled = env::var("AUTH_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse()
            .unwrap_or(true);

        let token_file = env::var("AUTH_TOKEN_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_credential_path("tokens.yaml"));

        let user_file = env::var("AUTH_USER_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_credential_path("users.yaml"));

        let max_failed_attempts = env::var("AUTH_MAX_FAILED_ATTEMPTS")
            .unwrap_or_else(|_| "5".to_string())
            .parse()
            .unwrap_or(5);

        let rate_limit_window_minutes = env::var("AUTH_RATE_LIMIT_WINDOW_MINUTES")
            .unwrap_or_else(|_| "15".to_string())
            .parse::<u64>()
            .unwrap_or(15)
            .max(1);

        let rate_limit_max_attempts = env::var("AUTH_RATE_LIMIT_MAX_ATTEMPTS")
            .unwrap_or_else(|_| "10".to_string())
            .parse::<u32>()
            .unwrap_or(10)
            .max(1);

        let databases = match env::var("DATABASES") {
            Ok(raw) => serde_json::from_str::<Vec<DatabaseConfig>>(&raw)
                .map_err(|e| anyhow!("Invalid DATABASES value: {}", e))?,
            Err(_) => Vec::new(),
        };

        Ok(Config {
            bind_addr,
            auth: AuthConfig {
                enabled,
                token_file,
                user_file,
                max_failed_attempts,
                rate_limit_window_minutes,
                rate_limit_max_attempts,
            },
            databases,
        })
    }
}

/// System directory first, the binary's own directory as a fallback for
/// unpacked deployments.
fn default_credential_path(file_name: &str) -> PathBuf {
    let system = Path::new("/etc/postgres-mcp").join(file_name);
    if system.exists() {
        return system;
    }
    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(file_name)))
        .unwrap_or_else(|| PathBuf::from(file_name))
}
