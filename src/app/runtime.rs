use std::sync::{Arc, Mutex};

use crate::adapters::db::{open_connection, run_migrations, schema_version};
use crate::adapters::price_api::HvaKosterStrommenClient;
use crate::adapters::telegram::TelegramBot;
use crate::app::config::AppConfig;
use crate::app::error::AppError;
use crate::app::handlers::{RequestHandler, TrackerBot};
use crate::app::prices::SpotPriceProvider;
use crate::app::services::SqliteTrackerService;
use crate::domain::clock::SystemClock;
use crate::domain::session_cost::SessionAccountant;

pub fn run(config: AppConfig) -> Result<(), AppError> {
    let mut connection = open_connection(&config.db_path).map_err(AppError::database_init)?;
    run_migrations(&mut connection).map_err(AppError::database_init)?;
    let version = schema_version(&connection).map_err(AppError::database_init)?;
    tracing::info!(db_path = %config.db_path, schema_version = version, "database ready");

    let store = SqliteTrackerService::new(Arc::new(Mutex::new(connection)));

    let client = HvaKosterStrommenClient::new(&config.price_api_base, config.price_fetch_timeout())
        .map_err(AppError::runtime)?;
    let prices = SpotPriceProvider::new(
        client,
        SystemClock,
        config.timezone,
        config.price_fetch_timeout(),
        config.price_cache_ttl(),
    );
    let accountant = SessionAccountant::new(prices, config.timezone, config.max_session_hours);
    let handler: Arc<dyn RequestHandler> = Arc::new(TrackerBot::new(store, accountant, SystemClock));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(AppError::runtime)?;

    let bot = TelegramBot::new(&config.telegram_bot_token);
    runtime.block_on(bot.run(handler));

    tracing::info!("shutdown complete");
    Ok(())
}
