use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub discord: DiscordConfig,
    pub sheets: SheetsConfig,
    pub coordinator: CoordinatorConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    /// `sqlite://…` for a local store, `https://…` for a PostgREST endpoint.
    pub url: String,
    pub api_key: Option<SecretString>,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct DiscordConfig {
    pub bot_token: SecretString,
    pub application_id: String,
    pub api_base_url: String,
    pub request_timeout_secs: u64,
}

#[derive(Clone, Debug, Default)]
pub struct SheetsConfig {
    pub webhook_url: Option<String>,
    pub channel_id: Option<String>,
}

#[derive(Clone, Debug)]
pub struct CoordinatorConfig {
    pub reaction_emoji: String,
    /// `0` keeps every claim for the life of the process.
    pub claim_retention_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Sqlite,
    Postgrest,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub database_api_key: Option<String>,
    pub log_level: Option<String>,
    pub discord_bot_token: Option<String>,
    pub discord_application_id: Option<String>,
    pub sheets_webhook_url: Option<String>,
    pub sheets_channel_id: Option<String>,
    pub claim_retention_secs: Option<u64>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

pub const DEFAULT_DISCORD_API_BASE_URL: &str = "https://discord.com/api/v10";
pub const DEFAULT_REACTION_EMOJI: &str = "🫡";

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://yobidashi.db".to_string(),
                api_key: None,
                max_connections: 5,
                timeout_secs: 30,
            },
            discord: DiscordConfig {
                bot_token: String::new().into(),
                application_id: String::new(),
                api_base_url: DEFAULT_DISCORD_API_BASE_URL.to_string(),
                request_timeout_secs: 15,
            },
            sheets: SheetsConfig::default(),
            coordinator: CoordinatorConfig {
                reaction_emoji: DEFAULT_REACTION_EMOJI.to_string(),
                claim_retention_secs: 7 * 24 * 60 * 60,
            },
            server: ServerConfig { bind_address: "127.0.0.1".to_string(), health_check_port: 8080 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl DatabaseConfig {
    pub fn backend(&self) -> StoreBackend {
        let url = self.url.trim();
        if url.starts_with("http://") || url.starts_with("https://") {
            StoreBackend::Postgrest
        } else {
            StoreBackend::Sqlite
        }
    }
}

impl SheetsConfig {
    /// The relay runs only when both the webhook and the watched channel are set.
    pub fn is_enabled(&self) -> bool {
        self.webhook_url.is_some() && self.channel_id.is_some()
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("yobidashi.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(database_api_key_value) = database.api_key {
                self.database.api_key = Some(secret_value(database_api_key_value));
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(discord) = patch.discord {
            if let Some(discord_bot_token_value) = discord.bot_token {
                self.discord.bot_token = secret_value(discord_bot_token_value);
            }
            if let Some(application_id) = discord.application_id {
                self.discord.application_id = application_id;
            }
            if let Some(api_base_url) = discord.api_base_url {
                self.discord.api_base_url = api_base_url;
            }
            if let Some(request_timeout_secs) = discord.request_timeout_secs {
                self.discord.request_timeout_secs = request_timeout_secs;
            }
        }

        if let Some(sheets) = patch.sheets {
            if let Some(webhook_url) = sheets.webhook_url {
                self.sheets.webhook_url = Some(webhook_url);
            }
            if let Some(channel_id) = sheets.channel_id {
                self.sheets.channel_id = Some(channel_id);
            }
        }

        if let Some(coordinator) = patch.coordinator {
            if let Some(reaction_emoji) = coordinator.reaction_emoji {
                self.coordinator.reaction_emoji = reaction_emoji;
            }
            if let Some(claim_retention_secs) = coordinator.claim_retention_secs {
                self.coordinator.claim_retention_secs = claim_retention_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        let database_url =
            read_env("YOBIDASHI_DATABASE_URL").or_else(|| read_env("VITE_SUPABASE_URL"));
        if let Some(value) = database_url {
            self.database.url = value;
        }
        let database_api_key =
            read_env("YOBIDASHI_DATABASE_API_KEY").or_else(|| read_env("VITE_SUPABASE_ANON_KEY"));
        if let Some(value) = database_api_key {
            self.database.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("YOBIDASHI_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("YOBIDASHI_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("YOBIDASHI_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("YOBIDASHI_DATABASE_TIMEOUT_SECS", &value)?;
        }

        let bot_token =
            read_env("YOBIDASHI_DISCORD_BOT_TOKEN").or_else(|| read_env("DISCORD_TOKEN"));
        if let Some(value) = bot_token {
            self.discord.bot_token = secret_value(value);
        }
        let application_id =
            read_env("YOBIDASHI_DISCORD_APPLICATION_ID").or_else(|| read_env("CLIENT_ID"));
        if let Some(value) = application_id {
            self.discord.application_id = value;
        }
        if let Some(value) = read_env("YOBIDASHI_DISCORD_API_BASE_URL") {
            self.discord.api_base_url = value;
        }
        if let Some(value) = read_env("YOBIDASHI_DISCORD_REQUEST_TIMEOUT_SECS") {
            self.discord.request_timeout_secs =
                parse_u64("YOBIDASHI_DISCORD_REQUEST_TIMEOUT_SECS", &value)?;
        }

        let webhook_url =
            read_env("YOBIDASHI_SHEETS_WEBHOOK_URL").or_else(|| read_env("GOOGLE_APPS_SCRIPT_URL"));
        if let Some(value) = webhook_url {
            self.sheets.webhook_url = Some(value);
        }
        if let Some(value) = read_env("YOBIDASHI_SHEETS_CHANNEL_ID") {
            self.sheets.channel_id = Some(value);
        }

        if let Some(value) = read_env("YOBIDASHI_COORDINATOR_REACTION_EMOJI") {
            self.coordinator.reaction_emoji = value;
        }
        if let Some(value) = read_env("YOBIDASHI_COORDINATOR_CLAIM_RETENTION_SECS") {
            self.coordinator.claim_retention_secs =
                parse_u64("YOBIDASHI_COORDINATOR_CLAIM_RETENTION_SECS", &value)?;
        }

        if let Some(value) = read_env("YOBIDASHI_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("YOBIDASHI_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port =
                parse_u16("YOBIDASHI_SERVER_HEALTH_CHECK_PORT", &value)?;
        }

        let log_level =
            read_env("YOBIDASHI_LOGGING_LEVEL").or_else(|| read_env("YOBIDASHI_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("YOBIDASHI_LOGGING_FORMAT").or_else(|| read_env("YOBIDASHI_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(database_api_key) = overrides.database_api_key {
            self.database.api_key = Some(secret_value(database_api_key));
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(discord_bot_token) = overrides.discord_bot_token {
            self.discord.bot_token = secret_value(discord_bot_token);
        }
        if let Some(application_id) = overrides.discord_application_id {
            self.discord.application_id = application_id;
        }
        if let Some(webhook_url) = overrides.sheets_webhook_url {
            self.sheets.webhook_url = Some(webhook_url);
        }
        if let Some(channel_id) = overrides.sheets_channel_id {
            self.sheets.channel_id = Some(channel_id);
        }
        if let Some(claim_retention_secs) = overrides.claim_retention_secs {
            self.coordinator.claim_retention_secs = claim_retention_secs;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_discord(&self.discord)?;
        validate_sheets(&self.sheets)?;
        validate_coordinator(&self.coordinator)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("yobidashi.toml"), PathBuf::from("config/yobidashi.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

fn is_snowflake(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|ch| ch.is_ascii_digit())
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url && !is_http_url(url) {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, `:memory:`) or an http(s) REST endpoint"
                .to_string(),
        ));
    }

    if database.backend() == StoreBackend::Postgrest {
        let missing = database
            .api_key
            .as_ref()
            .map(|value| value.expose_secret().trim().is_empty())
            .unwrap_or(true);
        if missing {
            return Err(ConfigError::Validation(
                "database.api_key is required when database.url is an http(s) REST endpoint"
                    .to_string(),
            ));
        }
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_discord(discord: &DiscordConfig) -> Result<(), ConfigError> {
    let bot_token = discord.bot_token.expose_secret();
    if bot_token.trim().is_empty() {
        return Err(ConfigError::Validation(
            "discord.bot_token is required. Get it from https://discord.com/developers/applications > Your App > Bot > Token".to_string(),
        ));
    }
    if bot_token.trim_start().starts_with("Bot ") {
        return Err(ConfigError::Validation(
            "discord.bot_token must be the raw token without the `Bot ` prefix".to_string(),
        ));
    }

    if !is_snowflake(discord.application_id.trim()) {
        return Err(ConfigError::Validation(
            "discord.application_id must be the numeric application id".to_string(),
        ));
    }

    if !is_http_url(&discord.api_base_url) {
        return Err(ConfigError::Validation(
            "discord.api_base_url must start with http:// or https://".to_string(),
        ));
    }

    if discord.request_timeout_secs == 0 || discord.request_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "discord.request_timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_sheets(sheets: &SheetsConfig) -> Result<(), ConfigError> {
    if let Some(webhook_url) = &sheets.webhook_url {
        if !is_http_url(webhook_url) {
            return Err(ConfigError::Validation(
                "sheets.webhook_url must start with http:// or https://".to_string(),
            ));
        }
    }

    if let Some(channel_id) = &sheets.channel_id {
        if !is_snowflake(channel_id.trim()) {
            return Err(ConfigError::Validation(
                "sheets.channel_id must be a numeric channel id".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_coordinator(coordinator: &CoordinatorConfig) -> Result<(), ConfigError> {
    if coordinator.reaction_emoji.trim().is_empty() {
        return Err(ConfigError::Validation(
            "coordinator.reaction_emoji must not be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    discord: Option<DiscordPatch>,
    sheets: Option<SheetsPatch>,
    coordinator: Option<CoordinatorPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    api_key: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct DiscordPatch {
    bot_token: Option<String>,
    application_id: Option<String>,
    api_base_url: Option<String>,
    request_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SheetsPatch {
    webhook_url: Option<String>,
    channel_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CoordinatorPatch {
    reaction_emoji: Option<String>,
    claim_retention_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    health_check_port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
