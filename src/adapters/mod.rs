pub mod api;
pub mod db;
pub mod metrics;
pub mod solar_forecaster;
