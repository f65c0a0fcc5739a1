mod config;
mod error;
pub mod ingestion;
mod logging;
mod runtime;
pub mod services;

pub use error::AppError;

pub fn run() -> Result<(), AppError> {
    // Absent .env files are fine; the environment may be set directly.
    dotenvy::dotenv().ok();

    logging::init()?;

    let config = config::AppConfig::from_env()?;

    tracing::info!(
        forecaster_url = %config.forecaster_url,
        metrics_url = %config.metrics_url,
        http_bind = %config.http_bind,
        db_path = %config.db_path,
        ingest_queue_capacity = config.ingest_queue_capacity,
        "application bootstrap initialized"
    );

    runtime::run(config)
}
