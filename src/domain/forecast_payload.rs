use serde::Deserialize;
use serde_json::Value;

/// Lenient mirror of the forecaster's result shape. Every level carries
/// `#[serde(default)]` so a producer emitting a subset of the expected
/// fields normalizes to zero values instead of failing; unknown extra
/// fields are ignored. Only a structurally incompatible tree (for example
/// `result` holding a string) is an error.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct ForecastPayload {
    pub session_id: String,
    pub timestamp: String,
    pub general_status: String,
    pub result: ForecastResultPayload,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct ForecastResultPayload {
    pub date: String,
    pub energy_balance: EnergyBalancePayload,
    pub battery_performance: BatteryPerformancePayload,
    pub action_recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct EnergyBalancePayload {
    pub total_production_kwh: f64,
    pub total_consumption_kwh: f64,
    pub net_battery_change_wh: f64,
    pub status_description: String,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct BatteryPerformancePayload {
    pub initial_soc: f64,
    pub min_soc: f64,
    pub min_soc_time: String,
    pub max_soc: f64,
    pub max_soc_time: String,
    pub end_of_day_soc: f64,
    pub time_to_full: String,
    pub full_charge_expected: bool,
}

pub fn normalize_payload(raw: &Value) -> Result<ForecastPayload, serde_json::Error> {
    serde_json::from_value(raw.clone())
}
