use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;

use crate::domain::models::{
    BatteryPerformanceRecord, EnergyBalanceRecord, ForecastRecord, NewForecastRecord,
};

pub const LATEST_SCHEMA_VERSION: u32 = 1;

const MIGRATIONS: &[(u32, &str)] = &[(
    1,
    r#"
CREATE TABLE IF NOT EXISTS forecasts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    forecast_date TEXT NOT NULL,
    general_status TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_forecasts_timestamp_desc
ON forecasts (timestamp DESC);

CREATE TABLE IF NOT EXISTS energy_balances (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    forecast_id INTEGER NOT NULL REFERENCES forecasts(id) ON DELETE CASCADE,
    total_production_kwh REAL NOT NULL,
    total_consumption_kwh REAL NOT NULL,
    net_battery_change_wh REAL NOT NULL,
    status_description TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS battery_performances (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    forecast_id INTEGER NOT NULL REFERENCES forecasts(id) ON DELETE CASCADE,
    initial_soc REAL NOT NULL,
    min_soc REAL NOT NULL,
    min_soc_time TEXT NOT NULL,
    max_soc REAL NOT NULL,
    max_soc_time TEXT NOT NULL,
    end_of_day_soc REAL NOT NULL,
    time_to_full TEXT NOT NULL,
    full_charge_expected INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS action_recommendations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    forecast_id INTEGER NOT NULL REFERENCES forecasts(id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    recommendation TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_action_recommendations_forecast
ON action_recommendations (forecast_id, position);
"#,
)];

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database operation failed: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("unsupported schema version {current}; latest supported is {latest}")]
    UnsupportedSchemaVersion { current: u32, latest: u32 },
}

pub fn open_connection(path: &str) -> Result<Connection, DbError> {
    let connection = Connection::open(path)?;
    // Cascades on the three sub-record tables depend on this pragma.
    connection.pragma_update(None, "foreign_keys", true)?;
    Ok(connection)
}

pub fn run_migrations(connection: &mut Connection) -> Result<(), DbError> {
    let current_version = schema_version(connection)?;

    if current_version > LATEST_SCHEMA_VERSION {
        return Err(DbError::UnsupportedSchemaVersion {
            current: current_version,
            latest: LATEST_SCHEMA_VERSION,
        });
    }

    let transaction = connection.transaction()?;

    for (version, sql) in MIGRATIONS {
        if *version > current_version {
            transaction.execute_batch(sql)?;
            transaction.pragma_update(None, "user_version", version)?;
        }
    }

    transaction.commit()?;

    Ok(())
}

pub fn schema_version(connection: &Connection) -> Result<u32, DbError> {
    let version = connection.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

/// Writes the forecast row together with its two 1:1 sub-records and all
/// recommendation rows in one transaction. Either every row lands or none.
pub fn insert_forecast(
    connection: &mut Connection,
    new_forecast: &NewForecastRecord,
) -> Result<i64, DbError> {
    let transaction = connection.transaction()?;

    transaction.execute(
        "INSERT INTO forecasts (session_id, timestamp, forecast_date, general_status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            new_forecast.session_id,
            new_forecast.timestamp,
            new_forecast.forecast_date,
            new_forecast.general_status,
            new_forecast.created_at,
        ],
    )?;
    let forecast_id = transaction.last_insert_rowid();

    transaction.execute(
        "INSERT INTO energy_balances
         (forecast_id, total_production_kwh, total_consumption_kwh, net_battery_change_wh, status_description)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            forecast_id,
            new_forecast.energy_balance.total_production_kwh,
            new_forecast.energy_balance.total_consumption_kwh,
            new_forecast.energy_balance.net_battery_change_wh,
            new_forecast.energy_balance.status_description,
        ],
    )?;

    transaction.execute(
        "INSERT INTO battery_performances
         (forecast_id, initial_soc, min_soc, min_soc_time, max_soc, max_soc_time,
          end_of_day_soc, time_to_full, full_charge_expected)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            forecast_id,
            new_forecast.battery_performance.initial_soc,
            new_forecast.battery_performance.min_soc,
            new_forecast.battery_performance.min_soc_time,
            new_forecast.battery_performance.max_soc,
            new_forecast.battery_performance.max_soc_time,
            new_forecast.battery_performance.end_of_day_soc,
            new_forecast.battery_performance.time_to_full,
            new_forecast.battery_performance.full_charge_expected,
        ],
    )?;

    for (position, recommendation) in new_forecast.action_recommendations.iter().enumerate() {
        transaction.execute(
            "INSERT INTO action_recommendations (forecast_id, position, recommendation)
             VALUES (?1, ?2, ?3)",
            params![forecast_id, position as i64, recommendation],
        )?;
    }

    transaction.commit()?;

    Ok(forecast_id)
}

pub fn get_recent_forecasts(
    connection: &Connection,
    limit: u32,
) -> Result<Vec<ForecastRecord>, DbError> {
    let mut statement = connection.prepare(
        "SELECT id, session_id, timestamp, forecast_date, general_status, created_at
         FROM forecasts
         ORDER BY timestamp DESC, id DESC
         LIMIT ?1",
    )?;

    let rows = statement.query_map(params![i64::from(limit)], forecast_head_from_row)?;

    let mut forecasts = Vec::new();
    for row in rows {
        let head = row?;
        forecasts.push(attach_sub_records(connection, head)?);
    }

    Ok(forecasts)
}

pub fn get_forecast_by_id(
    connection: &Connection,
    id: i64,
) -> Result<Option<ForecastRecord>, DbError> {
    let head = connection
        .query_row(
            "SELECT id, session_id, timestamp, forecast_date, general_status, created_at
             FROM forecasts
             WHERE id = ?1",
            params![id],
            forecast_head_from_row,
        )
        .optional()?;

    match head {
        Some(head) => Ok(Some(attach_sub_records(connection, head)?)),
        None => Ok(None),
    }
}

fn forecast_head_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ForecastRecord> {
    Ok(ForecastRecord {
        id: row.get(0)?,
        session_id: row.get(1)?,
        timestamp: row.get(2)?,
        forecast_date: row.get(3)?,
        general_status: row.get(4)?,
        created_at: row.get(5)?,
        energy_balance: EnergyBalanceRecord::default(),
        battery_performance: BatteryPerformanceRecord::default(),
        action_recommendations: Vec::new(),
    })
}

fn attach_sub_records(
    connection: &Connection,
    mut forecast: ForecastRecord,
) -> Result<ForecastRecord, DbError> {
    forecast.energy_balance = connection.query_row(
        "SELECT total_production_kwh, total_consumption_kwh, net_battery_change_wh, status_description
         FROM energy_balances
         WHERE forecast_id = ?1",
        params![forecast.id],
        |row| {
            Ok(EnergyBalanceRecord {
                total_production_kwh: row.get(0)?,
                total_consumption_kwh: row.get(1)?,
                net_battery_change_wh: row.get(2)?,
                status_description: row.get(3)?,
            })
        },
    )?;

    forecast.battery_performance = connection.query_row(
        "SELECT initial_soc, min_soc, min_soc_time, max_soc, max_soc_time,
                end_of_day_soc, time_to_full, full_charge_expected
         FROM battery_performances
         WHERE forecast_id = ?1",
        params![forecast.id],
        |row| {
            Ok(BatteryPerformanceRecord {
                initial_soc: row.get(0)?,
                min_soc: row.get(1)?,
                min_soc_time: row.get(2)?,
                max_soc: row.get(3)?,
                max_soc_time: row.get(4)?,
                end_of_day_soc: row.get(5)?,
                time_to_full: row.get(6)?,
                full_charge_expected: row.get(7)?,
            })
        },
    )?;

    let mut statement = connection.prepare(
        "SELECT recommendation
         FROM action_recommendations
         WHERE forecast_id = ?1
         ORDER BY position ASC",
    )?;
    let rows = statement.query_map(params![forecast.id], |row| row.get::<_, String>(0))?;

    for row in rows {
        forecast.action_recommendations.push(row?);
    }

    Ok(forecast)
}
