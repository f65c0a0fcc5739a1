use std::sync::mpsc::{Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use chrono::{NaiveDateTime, SecondsFormat, Utc};
use rusqlite::Connection;
use serde_json::Value;
use thiserror::Error;

use crate::adapters::db::{DbError, insert_forecast};
use crate::domain::forecast_payload::{ForecastPayload, normalize_payload};
use crate::domain::models::{BatteryPerformanceRecord, EnergyBalanceRecord, NewForecastRecord};

/// Zone-less microsecond layout emitted by the forecaster.
pub const FORECAST_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("forecast result could not be normalized: {0}")]
    Normalize(#[source] serde_json::Error),
    #[error("forecast timestamp {value:?} is not parseable: {source}")]
    Timestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
    #[error("database lock poisoned")]
    DbLockPoisoned,
    #[error("forecast write failed: {0}")]
    Database(#[source] DbError),
}

/// Best-effort ingestion of raw forecast results, decoupled from the request
/// that produced them. A bounded channel feeds one worker thread that owns
/// the persistence path; dropping the last handle lets the worker drain the
/// queue and exit, which is the shutdown path.
#[derive(Debug, Clone)]
pub struct IngestionPipeline {
    sender: SyncSender<Value>,
}

impl IngestionPipeline {
    pub fn start(
        connection: Arc<Mutex<Connection>>,
        queue_capacity: usize,
    ) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = std::sync::mpsc::sync_channel(queue_capacity);
        let handle = std::thread::spawn(move || worker_loop(receiver, connection));

        (Self { sender }, handle)
    }

    /// Hands a raw result to the worker without blocking the caller. A full
    /// queue drops the result; the caller already holds the forecast and
    /// must not wait on storage.
    pub fn submit(&self, raw: Value) {
        match self.sender.try_send(raw) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!("ingestion queue full, dropping forecast result");
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::warn!("ingestion worker stopped, dropping forecast result");
            }
        }
    }
}

fn worker_loop(receiver: Receiver<Value>, connection: Arc<Mutex<Connection>>) {
    while let Ok(raw) = receiver.recv() {
        match ingest(&connection, &raw) {
            Ok(Some(forecast_id)) => tracing::info!(forecast_id, "forecast persisted"),
            Ok(None) => {
                tracing::debug!("forecast result carries no session id, skipping persistence");
            }
            Err(error) => tracing::warn!(error = %error, "forecast ingestion failed"),
        }
    }
}

/// Normalizes and persists one raw result. `Ok(None)` is the designed no-op
/// for results without a session id, not a failure.
pub fn ingest(
    connection: &Arc<Mutex<Connection>>,
    raw: &Value,
) -> Result<Option<i64>, IngestError> {
    let payload = normalize_payload(raw).map_err(IngestError::Normalize)?;

    if payload.session_id.is_empty() {
        return Ok(None);
    }

    let parsed = NaiveDateTime::parse_from_str(&payload.timestamp, FORECAST_TIMESTAMP_FORMAT)
        .map_err(|source| IngestError::Timestamp {
            value: payload.timestamp.clone(),
            source,
        })?;

    let record = record_from_payload(payload, parsed);

    let mut connection = connection.lock().map_err(|_| IngestError::DbLockPoisoned)?;
    insert_forecast(&mut connection, &record)
        .map(Some)
        .map_err(IngestError::Database)
}

fn record_from_payload(payload: ForecastPayload, parsed: NaiveDateTime) -> NewForecastRecord {
    let result = payload.result;

    NewForecastRecord {
        session_id: payload.session_id,
        // Stored as RFC 3339 UTC text so lexicographic ordering stays
        // chronological.
        timestamp: parsed.and_utc().to_rfc3339_opts(SecondsFormat::Micros, true),
        forecast_date: result.date,
        general_status: payload.general_status,
        created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        energy_balance: EnergyBalanceRecord {
            total_production_kwh: result.energy_balance.total_production_kwh,
            total_consumption_kwh: result.energy_balance.total_consumption_kwh,
            net_battery_change_wh: result.energy_balance.net_battery_change_wh,
            status_description: result.energy_balance.status_description,
        },
        battery_performance: BatteryPerformanceRecord {
            initial_soc: result.battery_performance.initial_soc,
            min_soc: result.battery_performance.min_soc,
            min_soc_time: result.battery_performance.min_soc_time,
            max_soc: result.battery_performance.max_soc,
            max_soc_time: result.battery_performance.max_soc_time,
            end_of_day_soc: result.battery_performance.end_of_day_soc,
            time_to_full: result.battery_performance.time_to_full,
            full_charge_expected: result.battery_performance.full_charge_expected,
        },
        action_recommendations: result.action_recommendations,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::{Value, json};

    use crate::adapters::db::{get_forecast_by_id, get_recent_forecasts};
    use crate::test_support::open_test_connection;

    use super::{IngestError, IngestionPipeline, ingest};

    fn shared_test_connection(name: &str) -> Arc<Mutex<rusqlite::Connection>> {
        Arc::new(Mutex::new(open_test_connection(name)))
    }

    fn sample_raw(session_id: &str) -> Value {
        json!({
            "session_id": session_id,
            "timestamp": "2024-05-01T10:00:00.000000",
            "general_status": "ok",
            "result": {
                "date": "2024-05-01",
                "energy_balance": {
                    "total_production_kwh": 12.4,
                    "total_consumption_kwh": 9.1,
                    "net_battery_change_wh": 3300.0,
                    "status_description": "surplus expected"
                },
                "battery_performance": {
                    "initial_soc": 40.0,
                    "min_soc": 35.5,
                    "min_soc_time": "06:15",
                    "max_soc": 100.0,
                    "max_soc_time": "14:30",
                    "end_of_day_soc": 88.0,
                    "time_to_full": "3h 20m",
                    "full_charge_expected": true
                },
                "action_recommendations": ["x", "y"]
            }
        })
    }

    fn count_forecasts(connection: &Arc<Mutex<rusqlite::Connection>>) -> i64 {
        let locked = connection.lock().expect("lock should be available");
        locked
            .query_row("SELECT COUNT(*) FROM forecasts", [], |row| row.get(0))
            .expect("count query should succeed")
    }

    #[test]
    fn ingests_well_formed_result_as_one_composite_record() {
        let connection = shared_test_connection("ingest-happy.sqlite");

        let forecast_id = ingest(&connection, &sample_raw("abc"))
            .expect("ingest should succeed")
            .expect("session id is present, record should be created");

        let locked = connection.lock().expect("lock should be available");
        let forecast = get_forecast_by_id(&locked, forecast_id)
            .expect("query should succeed")
            .expect("forecast should exist");

        assert_eq!(forecast.session_id, "abc");
        assert_eq!(forecast.timestamp, "2024-05-01T10:00:00.000000Z");
        assert_eq!(forecast.forecast_date, "2024-05-01");
        assert_eq!(forecast.energy_balance.net_battery_change_wh, 3300.0);
        assert!(forecast.battery_performance.full_charge_expected);
        assert_eq!(forecast.action_recommendations, vec!["x", "y"]);
    }

    #[test]
    fn empty_session_id_is_a_silent_no_op() {
        let connection = shared_test_connection("ingest-no-session.sqlite");

        let raw = json!({
            "timestamp": "2024-05-01T10:00:00.000000",
            "general_status": "ok",
            "result": {"date": "2024-05-01"}
        });

        let outcome = ingest(&connection, &raw).expect("ingest should not fail");

        assert_eq!(outcome, None);
        assert_eq!(count_forecasts(&connection), 0);
    }

    #[test]
    fn unparseable_timestamp_aborts_without_partial_state() {
        let connection = shared_test_connection("ingest-bad-timestamp.sqlite");

        let mut raw = sample_raw("abc");
        raw["timestamp"] = json!("first of may, around ten");

        let error = ingest(&connection, &raw).expect_err("ingest should fail");

        assert!(
            matches!(error, IngestError::Timestamp { .. }),
            "unexpected error: {error}"
        );
        assert_eq!(count_forecasts(&connection), 0);
    }

    #[test]
    fn structurally_broken_result_aborts_without_partial_state() {
        let connection = shared_test_connection("ingest-broken.sqlite");

        let raw = json!({"session_id": "abc", "result": "not an object"});

        let error = ingest(&connection, &raw).expect_err("ingest should fail");

        assert!(
            matches!(error, IngestError::Normalize(_)),
            "unexpected error: {error}"
        );
        assert_eq!(count_forecasts(&connection), 0);
    }

    #[test]
    fn pipeline_drains_queued_results_before_worker_exits() {
        let connection = shared_test_connection("ingest-drain.sqlite");
        let (pipeline, worker) = IngestionPipeline::start(Arc::clone(&connection), 8);

        pipeline.submit(sample_raw("s1"));
        pipeline.submit(sample_raw("s2"));
        pipeline.submit(sample_raw("s3"));

        drop(pipeline);
        worker.join().expect("worker should terminate cleanly");

        assert_eq!(count_forecasts(&connection), 3);
    }

    #[test]
    fn full_queue_drops_results_instead_of_blocking_submit() {
        let connection = shared_test_connection("ingest-full-queue.sqlite");
        let (pipeline, worker) = IngestionPipeline::start(Arc::clone(&connection), 1);

        // With the connection lock held the worker stalls mid-ingest, so it
        // can accept at most one in-flight item plus one queued item.
        let held = connection.lock().expect("lock should be available");
        pipeline.submit(sample_raw("q1"));
        pipeline.submit(sample_raw("q2"));
        pipeline.submit(sample_raw("q3"));
        drop(held);

        drop(pipeline);
        worker.join().expect("worker should terminate cleanly");

        let persisted = count_forecasts(&connection);
        assert!(
            (1..=2).contains(&persisted),
            "expected at least one dropped result, got {persisted} rows"
        );
    }

    #[test]
    fn submit_after_worker_exit_is_a_logged_no_op() {
        let (sender, receiver) = std::sync::mpsc::sync_channel(1);
        drop(receiver);

        let pipeline = IngestionPipeline { sender };
        pipeline.submit(sample_raw("gone"));
    }

    #[test]
    fn concurrent_results_for_one_session_persist_independently() {
        let connection = shared_test_connection("ingest-concurrent.sqlite");
        let (pipeline, worker) = IngestionPipeline::start(Arc::clone(&connection), 8);

        let submitters: Vec<_> = (0..4)
            .map(|_| {
                let pipeline = pipeline.clone();
                std::thread::spawn(move || pipeline.submit(sample_raw("shared-session")))
            })
            .collect();
        for submitter in submitters {
            submitter.join().expect("submitter should terminate cleanly");
        }

        drop(pipeline);
        worker.join().expect("worker should terminate cleanly");

        let locked = connection.lock().expect("lock should be available");
        let forecasts = get_recent_forecasts(&locked, 10).expect("query should succeed");

        assert_eq!(forecasts.len(), 4);
        for forecast in forecasts {
            assert_eq!(forecast.session_id, "shared-session");
            assert_eq!(forecast.action_recommendations, vec!["x", "y"]);
        }
    }
}
