mod config;
mod error;
pub mod handlers;
mod logging;
pub mod prices;
mod runtime;
pub mod services;

pub use error::AppError;

pub fn run() -> Result<(), AppError> {
    logging::init()?;

    let config = config::AppConfig::from_env()?;

    tracing::info!(
        db_path = %config.db_path,
        price_api_base = %config.price_api_base,
        price_fetch_timeout_ms = config.price_fetch_timeout_ms,
        price_cache_ttl_secs = config.price_cache_ttl_secs,
        max_session_hours = config.max_session_hours,
        timezone = %config.timezone,
        "application bootstrap initialized"
    );

    runtime::run(config)
}
