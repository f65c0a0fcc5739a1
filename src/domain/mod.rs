pub mod forecast_payload;
pub mod models;
