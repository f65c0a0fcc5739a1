use crate::app::AppError;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub forecaster_url: String,
    pub metrics_url: String,
    pub http_bind: String,
    pub db_path: String,
    pub panel_metric_query: String,
    pub ingest_queue_capacity: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let forecaster_url = lookup("FORECASTER_URL")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AppError::config("FORECASTER_URL is required"))?;

        Ok(Self {
            forecaster_url,
            metrics_url: lookup("METRICS_URL")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "http://localhost:8428".to_string()),
            http_bind: lookup("HTTP_BIND")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            db_path: lookup("DB_PATH")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "/var/lib/solar-scope/solar_scope.db".to_string()),
            panel_metric_query: lookup("PANEL_METRIC_QUERY")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| r#"mppt_values{sensor="panel gucu"}"#.to_string()),
            ingest_queue_capacity: parse_or_default(&lookup, "INGEST_QUEUE_CAPACITY", 32_usize)?,
        })
    }
}

fn parse_or_default<T, F>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr + Copy,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::config(format!("{key} must be a valid number"))),
        None => Ok(default),
    }
}
