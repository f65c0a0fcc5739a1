use std::sync::{Arc, Mutex};

use actix_cors::Cors;
use actix_web::{App, HttpServer, web};

use crate::adapters::api::{ApiState, configure_routes};
use crate::adapters::db;
use crate::adapters::metrics::MetricsClient;
use crate::adapters::solar_forecaster::SolarForecasterClient;
use crate::app::config::AppConfig;
use crate::app::error::AppError;
use crate::app::ingestion::IngestionPipeline;
use crate::app::services::SqliteForecastService;

pub fn run(config: AppConfig) -> Result<(), AppError> {
    let mut connection =
        db::open_connection(&config.db_path).map_err(AppError::database_init)?;
    db::run_migrations(&mut connection).map_err(AppError::database_init)?;

    let shared_connection = Arc::new(Mutex::new(connection));

    let forecaster =
        SolarForecasterClient::new(&config.forecaster_url).map_err(AppError::runtime)?;
    let metrics = MetricsClient::new(&config.metrics_url).map_err(AppError::runtime)?;

    let (ingestion, ingestion_worker) = IngestionPipeline::start(
        Arc::clone(&shared_connection),
        config.ingest_queue_capacity,
    );

    let api_state = ApiState {
        forecast_queries: SqliteForecastService::new(Arc::clone(&shared_connection)),
        forecaster,
        metrics,
        ingestion,
        panel_metric_query: config.panel_metric_query.clone(),
    };

    tracing::info!(bind = %config.http_bind, "http server starting");

    let server_result = actix_web::rt::System::new().block_on(async move {
        HttpServer::new(move || {
            App::new()
                .wrap(Cors::permissive())
                .app_data(web::Data::new(api_state.clone()))
                .configure(configure_routes)
        })
        .bind(&config.http_bind)?
        .run()
        .await
    });

    // Server shutdown drops the last pipeline sender; the worker drains any
    // queued results and exits, so joining here is the shutdown drain.
    if ingestion_worker.join().is_err() {
        return Err(AppError::runtime("ingestion worker panicked"));
    }

    server_result.map_err(AppError::runtime)
}
