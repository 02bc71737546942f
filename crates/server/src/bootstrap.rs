use std::sync::Arc;

use botsso_core::config::{AppConfig, ConfigError, LoadOptions};
use botsso_core::errors::{DomainError, ExchangeError};
use botsso_db::{
    connect_from_config, migrations, ConversationStateStore, DbPool,
    InMemoryConversationStateStore, SqlConversationStateStore,
};
use botsso_identity::{OnBehalfOfClient, OnBehalfOfSettings};
use botsso_teams::cards::SignInSettings;
use botsso_teams::{CommandDispatchDialog, SsoPrompt, SsoPromptSettings};
use thiserror::Error;
use tracing::info;

use crate::commands::ShowProfileCommand;
use crate::health::StoreProbe;

pub struct Application {
    pub config: AppConfig,
    pub store_probe: StoreProbe,
    pub dialog: Arc<CommandDispatchDialog>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("identity client setup failed: {0}")]
    IdentityClient(#[source] ExchangeError),
    #[error("command registration failed: {0}")]
    Command(#[source] DomainError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        store = if config.store.is_memory() { "memory" } else { "sqlite" },
        "starting application bootstrap"
    );

    let (store, store_probe) = open_store(&config).await?;

    let exchange = OnBehalfOfClient::new(OnBehalfOfSettings::from(&config.auth))
        .map_err(BootstrapError::IdentityClient)?;
    info!(
        event_name = "system.bootstrap.identity_client_ready",
        correlation_id = "bootstrap",
        token_endpoint = %exchange.token_endpoint(),
        "on-behalf-of client configured"
    );

    let prompt = SsoPrompt::new(store, Arc::new(exchange), SignInSettings::from(&config.auth));
    let mut dialog = CommandDispatchDialog::new(prompt, SsoPromptSettings::from(&config.prompt));
    let command_id = dialog
        .add_command(ShowProfileCommand, ShowProfileCommand::triggers())
        .map_err(BootstrapError::Command)?;
    info!(
        event_name = "system.bootstrap.command_registered",
        correlation_id = "bootstrap",
        command_id = %command_id,
        "sso command registered"
    );

    Ok(Application { config, store_probe, dialog: Arc::new(dialog) })
}

async fn open_store(
    config: &AppConfig,
) -> Result<(Arc<dyn ConversationStateStore>, StoreProbe), BootstrapError> {
    if config.store.is_memory() {
        return Ok((Arc::new(InMemoryConversationStateStore::default()), StoreProbe::Memory));
    }

    let db_pool: DbPool =
        connect_from_config(&config.store).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    Ok((Arc::new(SqlConversationStateStore::new(db_pool.clone())), StoreProbe::Sql(db_pool)))
}
