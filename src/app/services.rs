use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use thiserror::Error;

use crate::adapters::db;
use crate::adapters::db::DbError;
use crate::domain::models::ForecastRecord;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("database lock poisoned")]
    DbLockPoisoned,
    #[error("database operation failed: {0}")]
    Database(#[from] DbError),
}

pub trait ForecastQueryHandler {
    fn recent_forecasts(&self, limit: u32) -> Result<Vec<ForecastRecord>, ServiceError>;
    fn forecast_by_id(&self, id: i64) -> Result<Option<ForecastRecord>, ServiceError>;
}

#[derive(Clone)]
pub struct SqliteForecastService {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteForecastService {
    pub fn new(connection: Arc<Mutex<Connection>>) -> Self {
        Self { connection }
    }

    fn with_connection<T>(
        &self,
        op: impl FnOnce(&Connection) -> Result<T, DbError>,
    ) -> Result<T, ServiceError> {
        let connection = self
            .connection
            .lock()
            .map_err(|_| ServiceError::DbLockPoisoned)?;
        op(&connection).map_err(ServiceError::from)
    }
}

impl ForecastQueryHandler for SqliteForecastService {
    fn recent_forecasts(&self, limit: u32) -> Result<Vec<ForecastRecord>, ServiceError> {
        self.with_connection(|connection| db::get_recent_forecasts(connection, limit))
    }

    fn forecast_by_id(&self, id: i64) -> Result<Option<ForecastRecord>, ServiceError> {
        self.with_connection(|connection| db::get_forecast_by_id(connection, id))
    }
}
