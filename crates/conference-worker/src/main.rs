//! Conference worker entry point.

use std::sync::Arc;

use conference_core::clock::{Clock, SystemClock};
use conference_store::MIGRATOR;
use conference_worker::config::WorkerConfig;
use conference_worker::error::AppError;
use conference_worker::wiring::Worker;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting conference worker");

    let config = WorkerConfig::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await?;
    MIGRATOR.run(&pool).await?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let mut worker = Worker::postgres(&pool, &config, &clock);
    worker.start()?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");
    worker.stop().await;
    pool.close().await;

    Ok(())
}
