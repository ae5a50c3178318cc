use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pgmcp_server::{
    auth::{
        authenticator::Authenticator,
        codec,
        rate_limit::RateLimiter,
        token_store::TokenStore,
        user_store::UserStore,
        watcher::{self, WatchTarget},
    },
    config::Config,
    db::broker::ConnectionBroker,
    handlers,
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pgmcp_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load()?;
    tracing::info!(
        bind_addr = %config.bind_addr,
        auth_enabled = config.auth.enabled,
        token_file = %config.auth.token_file.display(),
        user_file = %config.auth.user_file.display(),
        lockout_threshold = config.auth.max_failed_attempts,
        rate_limit_window_minutes = config.auth.rate_limit_window_minutes,
        rate_limit_max_attempts = config.auth.rate_limit_max_attempts,
        databases = config.databases.len(),
        "Loaded configuration from environment/.env"
    );

    // Build the credential stores. With authentication enabled, unreadable
    // credential files are fatal here; once running, reload errors only log.
    let tokens = Arc::new(TokenStore::new());
    let users = Arc::new(UserStore::new(config.auth.max_failed_attempts));
    if config.auth.enabled {
        let token_file = codec::load_token_file(&config.auth.token_file).context(
            "cannot start with AUTH_ENABLED=true: token file is unreadable \
             (create it with `pgmcp-admin add-token`, chmod 0600, or set AUTH_TOKEN_FILE)",
        )?;
        tokens.reload(token_file, Utc::now());

        let user_file = codec::load_user_file(&config.auth.user_file).context(
            "cannot start with AUTH_ENABLED=true: user file is unreadable \
             (create it with `pgmcp-admin add-user`, chmod 0600, or set AUTH_USER_FILE)",
        )?;
        users.reload(user_file);
        tracing::info!(
            tokens = tokens.len(),
            users = users.user_count(),
            "Loaded credential files"
        );
    } else {
        tracing::warn!("Authentication is DISABLED; all requests share one synthetic identity");
    }

    let limiter = Arc::new(RateLimiter::new(
        config.auth.rate_limit_window_minutes,
        config.auth.rate_limit_max_attempts,
    ));
    let authenticator = Arc::new(Authenticator::new(
        config.auth.enabled,
        Arc::clone(&tokens),
        Arc::clone(&users),
        Arc::clone(&limiter),
    ));
    let broker = Arc::new(ConnectionBroker::new(
        config.databases.clone(),
        Arc::clone(&tokens),
        Arc::clone(&users),
    ));

    // Shutdown signal fanned out to every background task.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let _watcher = if config.auth.enabled {
        let token_reload = {
            let tokens = Arc::clone(&tokens);
            let broker = Arc::clone(&broker);
            let path = config.auth.token_file.clone();
            Arc::new(move || -> anyhow::Result<()> {
                let file = codec::load_token_file(&path)?;
                tokens.reload(file, Utc::now());
                broker.request_reconcile();
                Ok(())
            }) as watcher::ReloadFn
        };
        let user_reload = {
            let users = Arc::clone(&users);
            let broker = Arc::clone(&broker);
            let path = config.auth.user_file.clone();
            Arc::new(move || -> anyhow::Result<()> {
                let file = codec::load_user_file(&path)?;
                users.reload(file);
                broker.request_reconcile();
                Ok(())
            }) as watcher::ReloadFn
        };
        Some(watcher::spawn(
            vec![
                WatchTarget {
                    path: config.auth.token_file.clone(),
                    reload: token_reload,
                },
                WatchTarget {
                    path: config.auth.user_file.clone(),
                    reload: user_reload,
                },
            ],
            shutdown_rx.clone(),
        )?)
    } else {
        None
    };

    spawn_expiry_sweeper(
        Arc::clone(&tokens),
        Arc::clone(&users),
        limiter.window().num_seconds().max(1) as u64,
        shutdown_rx.clone(),
    );
    broker.spawn_reaper(shutdown_rx.clone());

    let state = AppState::new(authenticator, Arc::clone(&broker), config.clone());
    let app = handlers::router(state);

    tracing::info!("Server listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Shutting down");
        let _ = shutdown_tx.send(true);
    })
    .await?;

    Ok(())
}

/// Deletes expired sessions and tokens every `min(60 s, rate-limit window)`.
fn spawn_expiry_sweeper(
    tokens: Arc<TokenStore>,
    users: Arc<UserStore>,
    window_secs: u64,
    mut shutdown: watch::Receiver<bool>,
) {
    let period = Duration::from_secs(window_secs.min(60).max(1));
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(period);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let now = Utc::now();
                    let swept = users.sweep_expired_sessions(now);
                    if swept > 0 {
                        tracing::debug!(swept, "deleted expired sessions");
                    }
                    tokens.sweep_expired(now);
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    });
}
