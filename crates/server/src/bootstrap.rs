use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use yobidashi_core::claims::ClaimRegistry;
use yobidashi_core::config::{AppConfig, ConfigError, DatabaseConfig, LoadOptions, StoreBackend};
use yobidashi_core::domain::message::ChannelId;
use yobidashi_core::stats::StatsTracker;
use yobidashi_db::{
    connect_with_settings, migrations, EmergencyCallRepository, PostgrestEmergencyCallRepository,
    RepositoryError, SqlEmergencyCallRepository,
};
use yobidashi_discord::archive::{ArchiveError, SheetsRelay};
use yobidashi_discord::events::{build_dispatcher, DispatcherServices};
use yobidashi_discord::gateway::{GatewayRunner, NoopGatewayTransport, ReconnectPolicy};
use yobidashi_discord::platform::{ChatPlatform, PlatformError};
use yobidashi_discord::response::ResponseCoordinator;

use crate::health::HealthState;
use crate::rest::DiscordRestClient;
use crate::sheets::SheetsWebhookClient;

pub struct Application {
    pub config: AppConfig,
    pub store: Arc<dyn EmergencyCallRepository>,
    pub claims: Arc<ClaimRegistry>,
    pub gateway_runner: GatewayRunner,
}

impl Application {
    pub fn health_state(&self) -> HealthState {
        HealthState::new(self.store.clone(), self.claims.clone())
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("store client setup failed: {0}")]
    Store(#[source] RepositoryError),
    #[error("discord client setup failed: {0}")]
    Platform(#[source] PlatformError),
    #[error("sheet relay setup failed: {0}")]
    Archive(#[source] ArchiveError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    let store = open_store(&config.database).await?;

    let platform =
        DiscordRestClient::connect(&config.discord).await.map_err(BootstrapError::Platform)?;
    info!(
        event_name = "system.bootstrap.discord_connected",
        correlation_id = "bootstrap",
        bot_user_id = %platform.bot_user_id(),
        "discord identity resolved"
    );

    assemble(config, store, Arc::new(platform))
}

pub async fn open_store(
    database: &DatabaseConfig,
) -> Result<Arc<dyn EmergencyCallRepository>, BootstrapError> {
    match database.backend() {
        StoreBackend::Sqlite => {
            let pool = connect_with_settings(
                &database.url,
                database.max_connections,
                database.timeout_secs,
            )
            .await
            .map_err(BootstrapError::DatabaseConnect)?;
            info!(
                event_name = "system.bootstrap.database_connected",
                correlation_id = "bootstrap",
                "database connection established"
            );

            migrations::run_pending(&pool).await.map_err(BootstrapError::Migration)?;
            info!(
                event_name = "system.bootstrap.migrations_applied",
                correlation_id = "bootstrap",
                "database migrations applied"
            );
            Ok(Arc::new(SqlEmergencyCallRepository::new(pool)))
        }
        StoreBackend::Postgrest => {
            let api_key = database.api_key.clone().ok_or_else(|| {
                BootstrapError::Config(ConfigError::Validation(
                    "database.api_key is required for a REST store".to_owned(),
                ))
            })?;
            let store = PostgrestEmergencyCallRepository::new(
                &database.url,
                api_key,
                Duration::from_secs(database.timeout_secs),
            )
            .map_err(BootstrapError::Store)?;
            info!(
                event_name = "system.bootstrap.rest_store_configured",
                correlation_id = "bootstrap",
                "rest store client configured"
            );
            Ok(Arc::new(store))
        }
    }
}

pub fn claim_registry(retention_secs: u64) -> ClaimRegistry {
    let retention = i64::try_from(retention_secs).ok().and_then(chrono::Duration::try_seconds);
    match retention {
        Some(retention) if retention_secs > 0 => ClaimRegistry::with_retention(retention),
        _ => ClaimRegistry::new(),
    }
}

/// Wires the coordinator, handlers and gateway runner around an already-open
/// store and platform.
pub fn assemble(
    config: AppConfig,
    store: Arc<dyn EmergencyCallRepository>,
    platform: Arc<dyn ChatPlatform>,
) -> Result<Application, BootstrapError> {
    let claims = Arc::new(claim_registry(config.coordinator.claim_retention_secs));
    let stats = Arc::new(StatsTracker::new());
    let coordinator = Arc::new(ResponseCoordinator::new(
        platform.clone(),
        store.clone(),
        claims.clone(),
        stats.clone(),
    ));

    let relay = match (&config.sheets.webhook_url, &config.sheets.channel_id) {
        (Some(url), Some(channel_id)) => {
            let archive = SheetsWebhookClient::new(
                url.clone(),
                Duration::from_secs(config.discord.request_timeout_secs),
            )
            .map_err(BootstrapError::Archive)?;
            Some(SheetsRelay::new(archive, ChannelId(channel_id.clone())))
        }
        _ => None,
    };
    info!(
        event_name = "system.bootstrap.sheets_relay",
        correlation_id = "bootstrap",
        enabled = relay.is_some(),
        "sheet relay configured"
    );

    let dispatcher = build_dispatcher(DispatcherServices {
        platform,
        coordinator,
        stats,
        reaction_emoji: config.coordinator.reaction_emoji.clone(),
        relay,
    });
    let gateway_runner = GatewayRunner::new(
        Arc::new(NoopGatewayTransport),
        dispatcher,
        ReconnectPolicy::default(),
    );

    Ok(Application { config, store, claims, gateway_runner })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use yobidashi_core::config::{AppConfig, ConfigOverrides, DatabaseConfig, LoadOptions};
    use yobidashi_core::domain::message::{
        ChannelId, ChatMessage, ChatUser, GuildId, MessageId, UserId,
    };
    use yobidashi_db::InMemoryEmergencyCallRepository;
    use yobidashi_discord::embeds::MessageTemplate;
    use yobidashi_discord::platform::{
        ChatPlatform, InteractionRef, PlatformError, ThreadRequest,
    };

    use super::{assemble, bootstrap, claim_registry, open_store, BootstrapError};

    struct OfflinePlatform {
        bot_user_id: UserId,
    }

    fn offline<T>() -> Result<T, PlatformError> {
        Err(PlatformError::Unavailable("offline platform".to_owned()))
    }

    #[async_trait]
    impl ChatPlatform for OfflinePlatform {
        fn bot_user_id(&self) -> &UserId {
            &self.bot_user_id
        }

        async fn fetch_message(
            &self,
            _channel_id: &ChannelId,
            _message_id: &MessageId,
        ) -> Result<ChatMessage, PlatformError> {
            offline()
        }

        async fn send_message(
            &self,
            _channel_id: &ChannelId,
            _message: &MessageTemplate,
        ) -> Result<MessageId, PlatformError> {
            offline()
        }

        async fn react(
            &self,
            _channel_id: &ChannelId,
            _message_id: &MessageId,
            _emoji: &str,
        ) -> Result<(), PlatformError> {
            offline()
        }

        async fn start_private_thread(
            &self,
            _request: &ThreadRequest,
        ) -> Result<ChannelId, PlatformError> {
            offline()
        }

        async fn add_thread_member(
            &self,
            _thread_id: &ChannelId,
            _user_id: &UserId,
        ) -> Result<(), PlatformError> {
            offline()
        }

        async fn list_guild_members(
            &self,
            _guild_id: &GuildId,
        ) -> Result<Vec<ChatUser>, PlatformError> {
            offline()
        }

        async fn api_latency(&self) -> Result<Duration, PlatformError> {
            offline()
        }

        async fn reply(
            &self,
            _interaction: &InteractionRef,
            _message: &MessageTemplate,
        ) -> Result<(), PlatformError> {
            offline()
        }

        async fn defer_reply(&self, _interaction: &InteractionRef) -> Result<(), PlatformError> {
            offline()
        }

        async fn edit_reply(
            &self,
            _interaction: &InteractionRef,
            _message: &MessageTemplate,
        ) -> Result<(), PlatformError> {
            offline()
        }

        async fn follow_up(
            &self,
            _interaction: &InteractionRef,
            _message: &MessageTemplate,
        ) -> Result<(), PlatformError> {
            offline()
        }
    }

    fn platform() -> Arc<dyn ChatPlatform> {
        Arc::new(OfflinePlatform { bot_user_id: UserId("900".to_owned()) })
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_without_discord_token() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_owned()),
                discord_bot_token: Some(String::new()),
                discord_application_id: Some("123".to_owned()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        let Err(BootstrapError::Config(error)) = result else {
            panic!("expected config error");
        };
        assert!(error.to_string().contains("discord.bot_token"));
    }

    #[tokio::test]
    async fn sqlite_store_is_migrated_on_open() {
        let database = DatabaseConfig {
            url: "sqlite::memory:".to_owned(),
            api_key: None,
            max_connections: 1,
            timeout_secs: 5,
        };

        let store = open_store(&database).await.expect("store");

        store.ping().await.expect("ping");
        assert!(store.list_pending().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn rest_store_requires_api_key() {
        let database = DatabaseConfig {
            url: "https://project.supabase.co".to_owned(),
            api_key: None,
            max_connections: 1,
            timeout_secs: 5,
        };

        assert!(matches!(open_store(&database).await, Err(BootstrapError::Config(_))));
    }

    #[test]
    fn assemble_wires_relay_only_when_sheets_are_configured() {
        let mut config = AppConfig::default();
        let app = assemble(
            config.clone(),
            Arc::new(InMemoryEmergencyCallRepository::default()),
            platform(),
        )
        .expect("assemble");
        assert_eq!(app.gateway_runner.handler_count(), 3);
        assert!(app.gateway_runner.is_noop_transport());

        config.sheets.webhook_url = Some("https://script.google.com/macros/s/x/exec".to_owned());
        config.sheets.channel_id = Some("1434".to_owned());
        let app = assemble(config, Arc::new(InMemoryEmergencyCallRepository::default()), platform())
            .expect("assemble");
        assert_eq!(app.gateway_runner.handler_count(), 4);
    }

    #[test]
    fn zero_retention_keeps_claims_for_process_lifetime() {
        assert!(claim_registry(0).is_empty());
        assert!(claim_registry(604_800).is_empty());
        assert!(claim_registry(u64::MAX).is_empty());
    }
}
