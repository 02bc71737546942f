use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::session::{DEFAULT_PROMPT_TIMEOUT_MS, MAX_PROMPT_TIMEOUT_MS};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub auth: AuthConfig,
    pub prompt: PromptConfig,
    pub store: StoreConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub client_id: String,
    pub client_secret: SecretString,
    pub tenant_id: String,
    pub authority_host: String,
    pub initiate_login_endpoint: String,
    pub application_id_uri: String,
    pub exchange_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct PromptConfig {
    pub scopes: Vec<String>,
    pub timeout_ms: u64,
    pub end_on_invalid_message: bool,
}

#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
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

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub store_url: Option<String>,
    pub log_level: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub tenant_id: Option<String>,
    pub authority_host: Option<String>,
    pub initiate_login_endpoint: Option<String>,
    pub application_id_uri: Option<String>,
    pub scopes: Option<Vec<String>>,
    pub prompt_timeout_ms: Option<u64>,
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

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            auth: AuthConfig {
                client_id: String::new(),
                client_secret: String::new().into(),
                tenant_id: String::new(),
                authority_host: "https://login.microsoftonline.com".to_string(),
                initiate_login_endpoint: String::new(),
                application_id_uri: String::new(),
                exchange_timeout_secs: 30,
            },
            prompt: PromptConfig {
                scopes: vec!["User.Read".to_string()],
                timeout_ms: DEFAULT_PROMPT_TIMEOUT_MS,
                end_on_invalid_message: true,
            },
            store: StoreConfig { url: "memory".to_string(), max_connections: 5, timeout_secs: 30 },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 3978,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl PromptConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl StoreConfig {
    pub fn is_memory(&self) -> bool {
        self.url.trim().eq_ignore_ascii_case("memory")
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

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("botsso.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(auth) = patch.auth {
            if let Some(client_id) = auth.client_id {
                self.auth.client_id = client_id;
            }
            if let Some(client_secret_value) = auth.client_secret {
                self.auth.client_secret = secret_value(client_secret_value);
            }
            if let Some(tenant_id) = auth.tenant_id {
                self.auth.tenant_id = tenant_id;
            }
            if let Some(authority_host) = auth.authority_host {
                self.auth.authority_host = authority_host;
            }
            if let Some(initiate_login_endpoint) = auth.initiate_login_endpoint {
                self.auth.initiate_login_endpoint = initiate_login_endpoint;
            }
            if let Some(application_id_uri) = auth.application_id_uri {
                self.auth.application_id_uri = application_id_uri;
            }
            if let Some(exchange_timeout_secs) = auth.exchange_timeout_secs {
                self.auth.exchange_timeout_secs = exchange_timeout_secs;
            }
        }

        if let Some(prompt) = patch.prompt {
            if let Some(scopes) = prompt.scopes {
                self.prompt.scopes = scopes;
            }
            if let Some(timeout_ms) = prompt.timeout_ms {
                self.prompt.timeout_ms = timeout_ms;
            }
            if let Some(end_on_invalid_message) = prompt.end_on_invalid_message {
                self.prompt.end_on_invalid_message = end_on_invalid_message;
            }
        }

        if let Some(store) = patch.store {
            if let Some(url) = store.url {
                self.store.url = url;
            }
            if let Some(max_connections) = store.max_connections {
                self.store.max_connections = max_connections;
            }
            if let Some(timeout_secs) = store.timeout_secs {
                self.store.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
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
        if let Some(value) = read_env("BOTSSO_AUTH_CLIENT_ID") {
            self.auth.client_id = value;
        }
        if let Some(value) = read_env("BOTSSO_AUTH_CLIENT_SECRET") {
            self.auth.client_secret = secret_value(value);
        }
        if let Some(value) = read_env("BOTSSO_AUTH_TENANT_ID") {
            self.auth.tenant_id = value;
        }
        if let Some(value) = read_env("BOTSSO_AUTH_AUTHORITY_HOST") {
            self.auth.authority_host = value;
        }
        if let Some(value) = read_env("BOTSSO_AUTH_INITIATE_LOGIN_ENDPOINT") {
            self.auth.initiate_login_endpoint = value;
        }
        if let Some(value) = read_env("BOTSSO_AUTH_APPLICATION_ID_URI") {
            self.auth.application_id_uri = value;
        }
        if let Some(value) = read_env("BOTSSO_AUTH_EXCHANGE_TIMEOUT_SECS") {
            self.auth.exchange_timeout_secs =
                parse_u64("BOTSSO_AUTH_EXCHANGE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("BOTSSO_PROMPT_SCOPES") {
            self.prompt.scopes = parse_scopes(&value);
        }
        if let Some(value) = read_env("BOTSSO_PROMPT_TIMEOUT_MS") {
            self.prompt.timeout_ms = parse_u64("BOTSSO_PROMPT_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = read_env("BOTSSO_PROMPT_END_ON_INVALID_MESSAGE") {
            self.prompt.end_on_invalid_message =
                parse_bool("BOTSSO_PROMPT_END_ON_INVALID_MESSAGE", &value)?;
        }

        if let Some(value) = read_env("BOTSSO_STORE_URL") {
            self.store.url = value;
        }
        if let Some(value) = read_env("BOTSSO_STORE_MAX_CONNECTIONS") {
            self.store.max_connections = parse_u32("BOTSSO_STORE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("BOTSSO_STORE_TIMEOUT_SECS") {
            self.store.timeout_secs = parse_u64("BOTSSO_STORE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("BOTSSO_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("BOTSSO_SERVER_PORT") {
            self.server.port = parse_u16("BOTSSO_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("BOTSSO_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("BOTSSO_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level = read_env("BOTSSO_LOGGING_LEVEL").or_else(|| read_env("BOTSSO_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("BOTSSO_LOGGING_FORMAT").or_else(|| read_env("BOTSSO_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(store_url) = overrides.store_url {
            self.store.url = store_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(client_id) = overrides.client_id {
            self.auth.client_id = client_id;
        }
        if let Some(client_secret) = overrides.client_secret {
            self.auth.client_secret = secret_value(client_secret);
        }
        if let Some(tenant_id) = overrides.tenant_id {
            self.auth.tenant_id = tenant_id;
        }
        if let Some(authority_host) = overrides.authority_host {
            self.auth.authority_host = authority_host;
        }
        if let Some(initiate_login_endpoint) = overrides.initiate_login_endpoint {
            self.auth.initiate_login_endpoint = initiate_login_endpoint;
        }
        if let Some(application_id_uri) = overrides.application_id_uri {
            self.auth.application_id_uri = application_id_uri;
        }
        if let Some(scopes) = overrides.scopes {
            self.prompt.scopes = scopes;
        }
        if let Some(timeout_ms) = overrides.prompt_timeout_ms {
            self.prompt.timeout_ms = timeout_ms;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_auth(&self.auth)?;
        validate_prompt(&self.prompt)?;
        validate_store(&self.store)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("botsso.toml"), PathBuf::from("config/botsso.toml")]
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

fn validate_auth(auth: &AuthConfig) -> Result<(), ConfigError> {
    let mut missing = Vec::new();
    if auth.initiate_login_endpoint.trim().is_empty() {
        missing.push("auth.initiate_login_endpoint");
    }
    if auth.client_id.trim().is_empty() {
        missing.push("auth.client_id");
    }
    if auth.tenant_id.trim().is_empty() {
        missing.push("auth.tenant_id");
    }
    if auth.application_id_uri.trim().is_empty() {
        missing.push("auth.application_id_uri");
    }
    if auth.client_secret.expose_secret().trim().is_empty() {
        missing.push("auth.client_secret");
    }
    if !missing.is_empty() {
        return Err(ConfigError::Validation(format!(
            "missing required configuration: {}. Find these values on the bot's Entra ID app registration",
            missing.join(", ")
        )));
    }

    for (name, value) in [
        ("auth.initiate_login_endpoint", &auth.initiate_login_endpoint),
        ("auth.authority_host", &auth.authority_host),
    ] {
        if !value.starts_with("https://") && !value.starts_with("http://") {
            return Err(ConfigError::Validation(format!(
                "{name} must start with http:// or https://"
            )));
        }
    }

    if auth.exchange_timeout_secs == 0 || auth.exchange_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "auth.exchange_timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_prompt(prompt: &PromptConfig) -> Result<(), ConfigError> {
    if prompt.scopes.is_empty() || prompt.scopes.iter().any(|scope| scope.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "prompt.scopes must contain at least one non-empty scope".to_string(),
        ));
    }

    if prompt.timeout_ms == 0 || prompt.timeout_ms > MAX_PROMPT_TIMEOUT_MS {
        return Err(ConfigError::Validation(format!(
            "prompt.timeout_ms must be in range 1..={MAX_PROMPT_TIMEOUT_MS}"
        )));
    }

    Ok(())
}

fn validate_store(store: &StoreConfig) -> Result<(), ConfigError> {
    let url = store.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !store.is_memory() && !sqlite_url {
        return Err(ConfigError::Validation(
            "store.url must be `memory` or a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if store.max_connections == 0 {
        return Err(ConfigError::Validation(
            "store.max_connections must be greater than zero".to_string(),
        ));
    }

    if store.timeout_secs == 0 || store.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "store.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
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

/// Accepts space- or comma-separated scope lists.
fn parse_scopes(value: &str) -> Vec<String> {
    value
        .split(|ch: char| ch == ',' || ch.is_whitespace())
        .filter(|scope| !scope.is_empty())
        .map(str::to_string)
        .collect()
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

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    auth: Option<AuthPatch>,
    prompt: Option<PromptPatch>,
    store: Option<StorePatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthPatch {
    client_id: Option<String>,
    client_secret: Option<String>,
    tenant_id: Option<String>,
    authority_host: Option<String>,
    initiate_login_endpoint: Option<String>,
    application_id_uri: Option<String>,
    exchange_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PromptPatch {
    scopes: Option<Vec<String>>,
    timeout_ms: Option<u64>,
    end_on_invalid_message: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct StorePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};
    use std::time::Duration;

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
    use crate::domain::session::MAX_PROMPT_TIMEOUT_MS;

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    const AUTH_VARS: &[(&str, &str)] = &[
        ("BOTSSO_AUTH_CLIENT_ID", "00000000-0000-0000-0000-00000000c1d0"),
        ("BOTSSO_AUTH_CLIENT_SECRET", "client-secret-value"),
        ("BOTSSO_AUTH_TENANT_ID", "contoso-tenant"),
        ("BOTSSO_AUTH_INITIATE_LOGIN_ENDPOINT", "https://bot.contoso.com/auth-start.html"),
        ("BOTSSO_AUTH_APPLICATION_ID_URI", "api://botid-00000000"),
    ];

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn set_auth_vars() {
        for (key, value) in AUTH_VARS {
            env::set_var(key, value);
        }
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn clear_auth_vars() {
        for (key, _) in AUTH_VARS {
            env::remove_var(key);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_BOTSSO_CLIENT_SECRET", "secret-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("botsso.toml");
            fs::write(
                &path,
                r#"
[auth]
client_id = "client-from-file"
client_secret = "${TEST_BOTSSO_CLIENT_SECRET}"
tenant_id = "tenant-from-file"
initiate_login_endpoint = "https://bot.contoso.com/auth-start.html"
application_id_uri = "api://botid-from-file"

[prompt]
scopes = ["User.Read", "Mail.Read"]
timeout_ms = 60000
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.auth.client_secret.expose_secret() == "secret-from-env",
                "client secret should be interpolated from environment",
            )?;
            ensure(config.auth.client_id == "client-from-file", "client id should come from file")?;
            ensure(
                config.prompt.scopes == vec!["User.Read".to_string(), "Mail.Read".to_string()],
                "scopes should come from file",
            )?;
            ensure(
                config.prompt.timeout() == Duration::from_secs(60),
                "prompt timeout should come from file",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_BOTSSO_CLIENT_SECRET"]);
        result
    }

    #[test]
    fn defaults_match_prompt_conventions() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        set_auth_vars();

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.prompt.timeout() == Duration::from_secs(15 * 60),
                "default prompt timeout should be fifteen minutes",
            )?;
            ensure(
                config.prompt.end_on_invalid_message,
                "end_on_invalid_message defaults to true",
            )?;
            ensure(config.store.is_memory(), "store defaults to memory")?;
            ensure(
                config.auth.authority_host == "https://login.microsoftonline.com",
                "authority host defaults to the public cloud",
            )?;
            Ok(())
        })();

        clear_auth_vars();
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_auth_vars();
        env::set_var("BOTSSO_LOG_LEVEL", "warn");
        env::set_var("BOTSSO_LOG_FORMAT", "pretty");
        env::set_var("BOTSSO_PROMPT_SCOPES", "User.Read, Calendars.Read");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            ensure(
                config.prompt.scopes
                    == vec!["User.Read".to_string(), "Calendars.Read".to_string()],
                "scopes should be split on commas and whitespace",
            )?;
            Ok(())
        })();

        clear_auth_vars();
        clear_vars(&["BOTSSO_LOG_LEVEL", "BOTSSO_LOG_FORMAT", "BOTSSO_PROMPT_SCOPES"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_auth_vars();
        env::set_var("BOTSSO_STORE_URL", "sqlite://from-env.db");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("botsso.toml");
            fs::write(
                &path,
                r#"
[auth]
tenant_id = "tenant-from-file"

[store]
url = "sqlite://from-file.db"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    store_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.store.url == "sqlite://from-override.db",
                "override store url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.auth.tenant_id == "contoso-tenant",
                "env tenant id should win over file and defaults",
            )?;
            Ok(())
        })();

        clear_auth_vars();
        clear_vars(&["BOTSSO_STORE_URL"]);
        result
    }

    #[test]
    fn validation_lists_every_missing_auth_setting() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_auth_vars();

        let error = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => {
                return Err("expected validation failure but config load succeeded".to_string())
            }
            Err(error) => error,
        };
        let has_message = matches!(
            error,
            ConfigError::Validation(ref message)
                if message.contains("auth.initiate_login_endpoint")
                    && message.contains("auth.client_id")
                    && message.contains("auth.tenant_id")
                    && message.contains("auth.application_id_uri")
        );
        ensure(has_message, "validation failure should list every missing auth setting")
    }

    #[test]
    fn empty_scopes_are_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        set_auth_vars();

        let result = match AppConfig::load(LoadOptions {
            overrides: ConfigOverrides { scopes: Some(Vec::new()), ..ConfigOverrides::default() },
            ..LoadOptions::default()
        }) {
            Ok(_) => Err("empty scopes should fail validation".to_string()),
            Err(ConfigError::Validation(message)) => {
                ensure(message.contains("prompt.scopes"), "message should mention prompt.scopes")
            }
            Err(other) => Err(format!("unexpected error: {other}")),
        };

        clear_auth_vars();
        result
    }

    #[test]
    fn prompt_timeout_is_bounded() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        set_auth_vars();

        let load_with = |timeout_ms: u64| {
            AppConfig::load(LoadOptions {
                overrides: ConfigOverrides {
                    prompt_timeout_ms: Some(timeout_ms),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
        };

        let mut result = Ok(());
        for timeout_ms in [0, MAX_PROMPT_TIMEOUT_MS + 1, 10_000_000_000_000_000] {
            result = result.and_then(|_| match load_with(timeout_ms) {
                Ok(_) => Err(format!("timeout_ms {timeout_ms} should fail validation")),
                Err(ConfigError::Validation(message)) => ensure(
                    message.contains("prompt.timeout_ms"),
                    "message should mention prompt.timeout_ms",
                ),
                Err(other) => Err(format!("unexpected error: {other}")),
            });
        }
        result = result.and_then(|_| match load_with(MAX_PROMPT_TIMEOUT_MS) {
            Ok(config) => ensure(
                config.prompt.timeout_ms == MAX_PROMPT_TIMEOUT_MS,
                "the largest allowed timeout should load",
            ),
            Err(error) => Err(format!("maximum timeout should load: {error}")),
        });

        clear_auth_vars();
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        set_auth_vars();

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(
                !debug.contains("client-secret-value"),
                "debug output should not contain the client secret",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_auth_vars();
        result
    }
}
