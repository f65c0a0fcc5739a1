use actix_multipart::form::{MultipartForm, tempfile::TempFile};
use actix_web::{HttpResponse, Responder, delete, get, post, web};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::adapters::metrics::MetricsClient;
use crate::adapters::solar_forecaster::{RunRequest, SolarForecasterClient};
use crate::app::ingestion::IngestionPipeline;
use crate::app::services::{ForecastQueryHandler, ServiceError, SqliteForecastService};
use crate::domain::models::ForecastRecord;

pub const RECENT_FORECASTS_LIMIT: u32 = 10;

#[derive(Clone)]
pub struct ApiState {
    pub forecast_queries: SqliteForecastService,
    pub forecaster: SolarForecasterClient,
    pub metrics: MetricsClient,
    pub ingestion: IngestionPipeline,
    pub panel_metric_query: String,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ForecastResponse {
    pub id: i64,
    pub session_id: String,
    pub timestamp: String,
    pub date: String,
    pub general_status: String,
    pub created_at: String,
    pub energy_balance: EnergyBalanceResponse,
    pub battery_performance: BatteryPerformanceResponse,
    pub action_recommendations: Vec<String>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnergyBalanceResponse {
    pub total_production_kwh: f64,
    pub total_consumption_kwh: f64,
    pub net_battery_change_wh: f64,
    pub status_description: String,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BatteryPerformanceResponse {
    pub initial_soc: f64,
    pub min_soc: f64,
    pub min_soc_time: String,
    pub max_soc: f64,
    pub max_soc_time: String,
    pub end_of_day_soc: f64,
    pub time_to_full: String,
    pub full_charge_expected: bool,
}

#[derive(MultipartForm)]
pub struct UploadEnvForm {
    #[multipart(rename = "env_file")]
    pub env_file: TempFile,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(health)
            .service(panel_metrics)
            .service(run_forecast_endpoint)
            .service(upload_env_endpoint)
            .service(run_with_env_endpoint)
            .service(list_sessions_endpoint)
            .service(delete_session_endpoint)
            .service(sample_env_endpoint)
            .service(recent_forecasts_endpoint)
            .service(forecast_by_id_endpoint),
    );
}

#[get("/health")]
async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

#[get("/panel/metrics")]
async fn panel_metrics(state: web::Data<ApiState>) -> impl Responder {
    match state.metrics.query(&state.panel_metric_query).await {
        Ok(result) => HttpResponse::Ok().json(result),
        Err(error) => {
            tracing::warn!(error = %error, "metrics query failed");
            failure_response("failed to query metrics backend")
        }
    }
}

#[post("/forecaster/run")]
async fn run_forecast_endpoint(
    state: web::Data<ApiState>,
    payload: web::Json<RunRequest>,
) -> impl Responder {
    match state.forecaster.run_forecast(&payload).await {
        Ok(result) => respond_and_ingest(&state, result),
        Err(error) => {
            tracing::warn!(error = %error, "forecaster run failed");
            failure_response("failed to run forecast")
        }
    }
}

#[post("/forecaster/upload-env")]
async fn upload_env_endpoint(
    state: web::Data<ApiState>,
    form: MultipartForm<UploadEnvForm>,
) -> impl Responder {
    match state.forecaster.upload_env_file(form.env_file.file.path()).await {
        Ok(result) => HttpResponse::Ok().json(result),
        Err(error) => {
            tracing::warn!(error = %error, "env upload failed");
            failure_response("failed to upload env file")
        }
    }
}

#[post("/forecaster/run-with-env/{session_id}")]
async fn run_with_env_endpoint(
    state: web::Data<ApiState>,
    session_id: web::Path<String>,
    body: web::Bytes,
) -> impl Responder {
    // An empty body resumes the uploaded configuration unchanged.
    let overrides: Option<Map<String, Value>> = if body.is_empty() {
        None
    } else {
        match serde_json::from_slice(&body) {
            Ok(overrides) => Some(overrides),
            Err(error) => {
                tracing::debug!(error = %error, "rejecting malformed overrides payload");
                return HttpResponse::BadRequest().json(serde_json::json!({
                    "error": "invalid overrides payload"
                }));
            }
        }
    };

    match state
        .forecaster
        .run_with_env(&session_id, overrides.as_ref())
        .await
    {
        Ok(result) => respond_and_ingest(&state, result),
        Err(error) => {
            tracing::warn!(error = %error, "forecaster run with env failed");
            failure_response("failed to run with env")
        }
    }
}

#[get("/forecaster/sessions")]
async fn list_sessions_endpoint(state: web::Data<ApiState>) -> impl Responder {
    match state.forecaster.list_sessions().await {
        Ok(result) => HttpResponse::Ok().json(result),
        Err(error) => {
            tracing::warn!(error = %error, "session listing failed");
            failure_response("failed to list sessions")
        }
    }
}

#[delete("/forecaster/sessions/{session_id}")]
async fn delete_session_endpoint(
    state: web::Data<ApiState>,
    session_id: web::Path<String>,
) -> impl Responder {
    // Removes the microservice session only; persisted forecasts for that
    // session are untouched.
    match state.forecaster.delete_session(&session_id).await {
        Ok(result) => HttpResponse::Ok().json(result),
        Err(error) => {
            tracing::warn!(error = %error, "session delete failed");
            failure_response("failed to delete session")
        }
    }
}

#[get("/forecaster/sample-env")]
async fn sample_env_endpoint(state: web::Data<ApiState>) -> impl Responder {
    match state.forecaster.sample_env().await {
        Ok(result) => HttpResponse::Ok().json(result),
        Err(error) => {
            tracing::warn!(error = %error, "sample env fetch failed");
            failure_response("failed to get sample env")
        }
    }
}

#[get("/storage/forecasts")]
async fn recent_forecasts_endpoint(state: web::Data<ApiState>) -> impl Responder {
    match state.forecast_queries.recent_forecasts(RECENT_FORECASTS_LIMIT) {
        Ok(forecasts) => {
            let mapped: Vec<ForecastResponse> =
                forecasts.into_iter().map(forecast_response).collect();
            HttpResponse::Ok().json(mapped)
        }
        Err(error) => service_error_response(error),
    }
}

#[get("/storage/forecasts/{id}")]
async fn forecast_by_id_endpoint(
    state: web::Data<ApiState>,
    id: web::Path<i64>,
) -> impl Responder {
    match state.forecast_queries.forecast_by_id(*id) {
        Ok(Some(forecast)) => HttpResponse::Ok().json(forecast_response(forecast)),
        Ok(None) => HttpResponse::NotFound().json(serde_json::json!({
            "error": "forecast not found"
        })),
        Err(error) => service_error_response(error),
    }
}

/// The caller gets the raw result back immediately; persistence happens
/// behind it on the ingestion worker.
fn respond_and_ingest(state: &ApiState, result: Map<String, Value>) -> HttpResponse {
    let raw = Value::Object(result);
    state.ingestion.submit(raw.clone());
    HttpResponse::Ok().json(raw)
}

fn forecast_response(forecast: ForecastRecord) -> ForecastResponse {
    ForecastResponse {
        id: forecast.id,
        session_id: forecast.session_id,
        timestamp: forecast.timestamp,
        date: forecast.forecast_date,
        general_status: forecast.general_status,
        created_at: forecast.created_at,
        energy_balance: EnergyBalanceResponse {
            total_production_kwh: forecast.energy_balance.total_production_kwh,
            total_consumption_kwh: forecast.energy_balance.total_consumption_kwh,
            net_battery_change_wh: forecast.energy_balance.net_battery_change_wh,
            status_description: forecast.energy_balance.status_description,
        },
        battery_performance: BatteryPerformanceResponse {
            initial_soc: forecast.battery_performance.initial_soc,
            min_soc: forecast.battery_performance.min_soc,
            min_soc_time: forecast.battery_performance.min_soc_time,
            max_soc: forecast.battery_performance.max_soc,
            max_soc_time: forecast.battery_performance.max_soc_time,
            end_of_day_soc: forecast.battery_performance.end_of_day_soc,
            time_to_full: forecast.battery_performance.time_to_full,
            full_charge_expected: forecast.battery_performance.full_charge_expected,
        },
        action_recommendations: forecast.action_recommendations,
    }
}

fn failure_response(message: &str) -> HttpResponse {
    HttpResponse::InternalServerError().json(serde_json::json!({ "error": message }))
}

fn service_error_response(error: ServiceError) -> HttpResponse {
    tracing::warn!(error = %error, "forecast read failed");
    failure_response("failed to read forecasts")
}
