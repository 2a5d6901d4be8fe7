mod agent_caller;
mod circuit;
mod classifier;
mod config;
mod db;
mod dlq;
mod error;
mod handlers;
mod identity;
mod metrics;
mod models;
mod parallel;
mod rate_limit;
mod registry;
mod replay;
mod retry;
mod router;

use crate::agent_caller::AgentCaller;
use crate::circuit::CircuitBreakerManager;
use crate::config::Config;
use crate::metrics::Metrics;
use crate::rate_limit::RateLimiter;
use crate::replay::ReplayWorker;
use crate::router::Router;
use axum::routing::{get, post};
use axum::Router as AxumRouter;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub metrics: Arc<Metrics>,
    pub router: Arc<Router>,
    pub replay: Arc<ReplayWorker>,
    pub rate_limiter: Arc<RateLimiter>,
    pub config: Arc<Config>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    tracing::info!("starting signal router");

    let db = PgPoolOptions::new()
        .max_connections(config.db_pool_max_connections())
        .connect(&config.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&db).await?;

    let metrics = Arc::new(Metrics::new()?);
    let breaker = CircuitBreakerManager::default();
    let agent_caller = Arc::new(AgentCaller::new(breaker, metrics.clone(), config.mock_agents_url.clone()));
    let router = Arc::new(Router::new(db.clone(), metrics.clone(), agent_caller));
    let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit_per_second));
    let replay = Arc::new(ReplayWorker::new(
        db.clone(),
        metrics.clone(),
        config.mock_agents_url.clone(),
        config.auto_replay_interval(),
        config.auto_replay_batch_size,
    ));

    let config = Arc::new(config);
    let state = AppState {
        db: db.clone(),
        metrics: metrics.clone(),
        router,
        replay: replay.clone(),
        rate_limiter,
        config: config.clone(),
    };

    let shutdown = CancellationToken::new();

    if config.enable_auto_replay {
        let replay_task = replay.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            replay_task.run(shutdown).await;
        });
    }

    spawn_backlog_gauge_refresher(db.clone(), metrics.clone());

    let app = AxumRouter::new()
        .route("/route", post(handlers::route_handler))
        .route("/health", get(handlers::health_handler))
        .route("/logs", get(handlers::logs_handler))
        .route("/dlq/status", get(handlers::dlq_status_handler))
        .route("/dlq/replay", post(handlers::dlq_replay_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "listening");

    let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
        let _ = tokio::signal::ctrl_c().await;
        shutdown.cancel();
        tracing::info!("shutdown signal received, draining in-flight requests");
    });

    serve.await?;
    Ok(())
}

/// Refreshes the `dlq_backlog` gauge every 60s (spec §4.12).
fn spawn_backlog_gauge_refresher(pool: sqlx::PgPool, metrics: Arc<Metrics>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        loop {
            ticker.tick().await;
            match db::count_dlq(&pool).await {
                Ok(count) => metrics.dlq_backlog.set(count),
                Err(e) => tracing::warn!(error = %e, "failed to refresh dlq backlog gauge"),
            }
        }
    });
}
