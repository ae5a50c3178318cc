//! Construction of bounded PostgreSQL pools from a database entry in the
//! configuration snapshot. Pools connect lazily: building one performs no
//! network I/O, the first acquire does.

use std::time::Duration;

use anyhow::anyhow;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::PgPool;

use crate::config::DatabaseConfig;

/// Type alias so downstream code can reference the logical database pool in a
/// single place.
pub type DbPool = PgPool;

pub fn build_pool(cfg: &DatabaseConfig) -> anyhow::Result<DbPool> {
    let options = PgConnectOptions::new()
        .host(&cfg.host)
        .port(cfg.port)
        .database(&cfg.database)
        .username(&cfg.user)
        .password(&cfg.password)
        .ssl_mode(parse_ssl_mode(&cfg.sslmode)?);

    let pool = PgPoolOptions::new()
        .min_connections(cfg.pool_min_conns)
        .max_connections(cfg.pool_max_conns.max(1))
        .idle_timeout(Duration::from_secs(cfg.pool_max_conn_idle_time))
        .connect_lazy_with(options);

    Ok(pool)
}

fn parse_ssl_mode(raw: &str) -> anyhow::Result<PgSslMode> {
    match raw.to_ascii_lowercase().as_str() {
        "disable" => Ok(PgSslMode::Disable),
        "allow" => Ok(PgSslMode::Allow),
        "prefer" => Ok(PgSslMode::Prefer),
        "require" => Ok(PgSslMode::Require),
        "verify-ca" => Ok(PgSslMode::VerifyCa),
        "verify-full" => Ok(PgSslMode::VerifyFull),
        other => Err(anyhow!("Invalid sslmode value: {}", other)),
    }
}
