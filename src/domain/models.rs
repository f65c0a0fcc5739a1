#[derive(Debug, Clone, PartialEq)]
pub struct ForecastRecord {
    pub id: i64,
    pub session_id: String,
    pub timestamp: String,
    pub forecast_date: String,
    pub general_status: String,
    pub created_at: String,
    pub energy_balance: EnergyBalanceRecord,
    pub battery_performance: BatteryPerformanceRecord,
    pub action_recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewForecastRecord {
    pub session_id: String,
    pub timestamp: String,
    pub forecast_date: String,
    pub general_status: String,
    pub created_at: String,
    pub energy_balance: EnergyBalanceRecord,
    pub battery_performance: BatteryPerformanceRecord,
    pub action_recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EnergyBalanceRecord {
    pub total_production_kwh: f64,
    pub total_consumption_kwh: f64,
    pub net_battery_change_wh: f64,
    pub status_description: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatteryPerformanceRecord {
    pub initial_soc: f64,
    pub min_soc: f64,
    pub min_soc_time: String,
    pub max_soc: f64,
    pub max_soc_time: String,
    pub end_of_day_soc: f64,
    pub time_to_full: String,
    pub full_charge_expected: bool,
}
