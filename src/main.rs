use axum::{routing::get, Router};
use std::env;
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod auth;
mod config;
mod dashboard;
mod db;
mod duration;
mod error;
mod memory;
mod models;
mod routes;
mod stats;
mod store;

use config::Config;
use routes::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(env::var("RUST_LOG").unwrap_or_else(
            |_| "coursetrack=info,axum=info,tower_http=info".into(),
        )))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let state = match &config.database_url {
        Some(url) => {
            let pool = db::connect(url, config.db_max_connections).await?;
            // crate-relative path for sqlx migrations
            sqlx::migrate!("./migrations").run(&pool).await?;
            tracing::info!("using postgres store");
            AppState::new(db::PgStore::new(pool), config.dashboard_concurrency)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory store, data is lost on exit");
            AppState::new(memory::MemoryStore::new(), config.dashboard_concurrency)
        }
    };

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .merge(routes::router(state))
        .layer(TimeoutLayer::new(config.request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any));

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("listening on http://0.0.0.0:{}", config.port);

    axum::serve(listener, app).await?;
    Ok(())
}
