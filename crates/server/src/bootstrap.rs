use std::sync::Arc;

use dcx_core::config::{AppConfig, ConfigError, LoadOptions};
use dcx_core::{CallLifecycle, RoutingEngine, RoutingPolicy};
use dcx_db::{
    connect_from_config, migrations, DbPool, SqlCallSessionRepository, SqlCapLedger,
    SqlOfferCatalog,
};
use thiserror::Error;
use tracing::info;

use crate::app::{AppState, TelephonySettings};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub state: AppState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub fn load_config(options: LoadOptions) -> Result<AppConfig, BootstrapError> {
    Ok(AppConfig::load(options)?)
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let db_pool =
        connect_from_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        max_connections = config.database.max_connections,
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.migrations_applied", "database migrations applied");

    let catalog = Arc::new(SqlOfferCatalog::new(db_pool.clone()));
    let sessions = Arc::new(SqlCallSessionRepository::new(db_pool.clone()));
    let ledger = Arc::new(SqlCapLedger::new(db_pool.clone()));

    let policy = RoutingPolicy::from(&config.routing);
    let engine = RoutingEngine::new(catalog.clone(), ledger, policy);
    let lifecycle = CallLifecycle::new(sessions, catalog)
        .with_cost_per_minute(config.telephony.cost_per_minute_cents);

    let state = AppState {
        lifecycle: Arc::new(lifecycle),
        engine: Arc::new(engine),
        telephony: Arc::new(TelephonySettings::from(&config.telephony)),
    };
    info!(
        event_name = "system.bootstrap.ready",
        validate_signatures = config.telephony.validate_signatures,
        cost_per_minute_cents = %config.telephony.cost_per_minute_cents,
        "call exchange wired"
    );

    Ok(Application { config, db_pool, state })
}
