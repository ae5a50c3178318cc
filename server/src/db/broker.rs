//! Per-principal connection pools.
//!
//! Each authenticated identity key gets its own PostgreSQL pool, so one
//! token's session-local state (temporary tables, prepared statements,
//! `SET LOCAL`) is invisible to every other token. A reaper reconciles the
//! pool map against the credential stores every minute and whenever a reload
//! nudges it: pools whose identity disappeared or whose principal expired are
//! drained and removed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Notify};

use crate::auth::token_store::TokenStore;
use crate::auth::user_store::UserStore;
use crate::config::DatabaseConfig;
use crate::db::connection::{build_pool, DbPool};
use crate::error::BrokerError;
use crate::models::principal::{Principal, PrincipalKind};

/// Identity key of the single pool used when authentication is disabled.
pub const SHARED_POOL_KEY: &str = "shared";

const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);
const REAP_INTERVAL: Duration = Duration::from_secs(60);

struct PoolEntry {
    pool: DbPool,
    database: String,
    expires_at: Option<DateTime<Utc>>,
}

pub struct ConnectionBroker {
    databases: Vec<DatabaseConfig>,
    pools: Mutex<HashMap<String, PoolEntry>>,
    reconcile_nudge: Notify,
    tokens: Arc<TokenStore>,
    users: Arc<UserStore>,
}

impl ConnectionBroker {
    pub fn new(
        databases: Vec<DatabaseConfig>,
        tokens: Arc<TokenStore>,
        users: Arc<UserStore>,
    ) -> Self {
        Self {
            databases,
            pools: Mutex::new(HashMap::new()),
            reconcile_nudge: Notify::new(),
            tokens,
            users,
        }
    }

    /// Returns the pool for this principal, creating it on first use. Pools
    /// are cached per identity key; creation failures are not.
    pub fn lease(&self, principal: &Principal, now: DateTime<Utc>) -> Result<DbPool, BrokerError> {
        if principal.is_expired(now) {
            return Err(BrokerError::PrincipalExpired);
        }

        let (key, cfg) = self.resolve(principal)?;

        let mut pools = self.lock();
        if let Some(entry) = pools.get(&key) {
            return Ok(entry.pool.clone());
        }

        let pool = build_pool(cfg).map_err(BrokerError::Pool)?;
        tracing::info!(
            identity = %redact(&key),
            database = %cfg.name,
            "created connection pool"
        );
        pools.insert(
            key,
            PoolEntry {
                pool: pool.clone(),
                database: cfg.name.clone(),
                expires_at: principal.expires_at,
            },
        );
        Ok(pool)
    }

    fn resolve(&self, principal: &Principal) -> Result<(String, &DatabaseConfig), BrokerError> {
        match principal.kind {
            PrincipalKind::Anonymous => {
                let cfg = self.databases.first().ok_or(BrokerError::NoDatabase)?;
                Ok((SHARED_POOL_KEY.to_string(), cfg))
            }
            PrincipalKind::ApiToken => {
                let cfg = match &principal.database_binding {
                    Some(name) => self
                        .databases
                        .iter()
                        .find(|d| d.name == *name)
                        .ok_or_else(|| BrokerError::UnknownDatabase(name.clone()))?,
                    None => self.databases.first().ok_or(BrokerError::NoDatabase)?,
                };
                Ok((principal.identity_key.clone(), cfg))
            }
            PrincipalKind::UserSession => {
                let cfg = self
                    .databases
                    .iter()
                    .find(|d| d.available_to_users)
                    .ok_or(BrokerError::NoUserDatabase)?;
                Ok((principal.identity_key.clone(), cfg))
            }
        }
    }

    /// Wakes the reaper for an immediate reconciliation (called after a
    /// credential-store reload).
    pub fn request_reconcile(&self) {
        self.reconcile_nudge.notify_one();
    }

    /// Drops every pool whose identity key is gone from both stores or whose
    /// principal expiry has passed. Each removed pool is drained with a
    /// bounded wait; connections still out after that are abandoned to close
    /// on release.
    pub async fn reconcile(&self, now: DateTime<Utc>) {
        let stale: Vec<(String, PoolEntry)> = {
            let mut pools = self.lock();
            let keys: Vec<String> = pools
                .iter()
                .filter(|(key, entry)| self.is_stale(key, entry, now))
                .map(|(key, _)| key.clone())
                .collect();
            keys.into_iter()
                .filter_map(|key| pools.remove(&key).map(|entry| (key, entry)))
                .collect()
        };

        for (key, entry) in stale {
            if tokio::time::timeout(DRAIN_TIMEOUT, entry.pool.close())
                .await
                .is_err()
            {
                tracing::warn!(
                    identity = %redact(&key),
                    database = %entry.database,
                    "pool drain timed out, abandoning in-flight connections"
                );
            }
            tracing::info!(
                identity = %redact(&key),
                database = %entry.database,
                "removed connection pool"
            );
        }
    }

    fn is_stale(&self, key: &str, entry: &PoolEntry, now: DateTime<Utc>) -> bool {
        if key == SHARED_POOL_KEY {
            return false;
        }
        if entry.expires_at.map(|at| at <= now).unwrap_or(false) {
            return true;
        }
        !(self.tokens.contains_identity(key) || self.users.contains_identity(key))
    }

    /// Periodic reconciliation plus reload nudges, until shutdown. All pools
    /// are closed on the way out.
    pub fn spawn_reaper(
        self: &Arc<Self>,
        mut shutdown: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let broker = Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(REAP_INTERVAL);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = tick.tick() => broker.reconcile(Utc::now()).await,
                    _ = broker.reconcile_nudge.notified() => broker.reconcile(Utc::now()).await,
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            broker.close_all().await;
        })
    }

    async fn close_all(&self) {
        let entries: Vec<PoolEntry> = {
            let mut pools = self.lock();
            pools.drain().map(|(_, entry)| entry).collect()
        };
        for entry in entries {
            let _ = tokio::time::timeout(DRAIN_TIMEOUT, entry.pool.close()).await;
        }
    }

    pub fn pool_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PoolEntry>> {
        self.pools.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Identity keys are hashes, not secrets, but full hashes are still noisy in
/// logs; eight characters identify a pool uniquely in practice.
fn redact(key: &str) -> &str {
    &key[..key.len().min(8)]
}
