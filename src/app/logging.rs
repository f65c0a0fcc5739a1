use tracing_subscriber::{EnvFilter, fmt};

use crate::app::AppError;

/// Crate logs default to info; everything else stays at warn unless
/// `RUST_LOG` says otherwise.
const DEFAULT_FILTER: &str = "solar_scope=info,warn";

pub fn init() -> Result<(), AppError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(AppError::logging_init)
}
