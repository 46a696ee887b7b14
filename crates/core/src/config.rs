use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::economics::default_cost_per_minute_cents;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub telephony: TelephonyConfig,
    pub routing: RoutingConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
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
pub struct TelephonyConfig {
    pub auth_token: SecretString,
    pub validate_signatures: bool,
    pub cost_per_minute_cents: Decimal,
    /// Externally visible base URL; used for signature validation and status
    /// callbacks when the server sits behind a proxy.
    pub public_base_url: Option<String>,
    pub fallback_voice: String,
}

#[derive(Clone, Debug)]
pub struct RoutingConfig {
    pub max_ring_seconds: u32,
    pub max_call_duration_seconds: u32,
    pub backend_timeout_ms: u64,
    pub candidate_page_size: u32,
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
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub server_port: Option<u16>,
    pub telephony_auth_token: Option<String>,
    pub validate_signatures: Option<bool>,
    pub cost_per_minute_cents: Option<Decimal>,
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
            database: DatabaseConfig {
                url: "sqlite://dcx.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 4000,
                graceful_shutdown_secs: 15,
            },
            telephony: TelephonyConfig {
                auth_token: String::new().into(),
                validate_signatures: true,
                cost_per_minute_cents: default_cost_per_minute_cents(),
                public_base_url: None,
                fallback_voice: "Polly.Matthew".to_string(),
            },
            routing: RoutingConfig {
                max_ring_seconds: 30,
                max_call_duration_seconds: 1800,
                backend_timeout_ms: 250,
                candidate_page_size: 20,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl FromStr for LogFormat {
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
            config.apply_patch(patch)?;
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("dcx.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
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

        if let Some(telephony) = patch.telephony {
            if let Some(auth_token_value) = telephony.auth_token {
                self.telephony.auth_token = secret_value(auth_token_value);
            }
            if let Some(validate_signatures) = telephony.validate_signatures {
                self.telephony.validate_signatures = validate_signatures;
            }
            if let Some(rate) = telephony.cost_per_minute_cents {
                self.telephony.cost_per_minute_cents =
                    parse_decimal("telephony.cost_per_minute_cents", &rate)?;
            }
            if let Some(public_base_url) = telephony.public_base_url {
                self.telephony.public_base_url = Some(public_base_url);
            }
            if let Some(fallback_voice) = telephony.fallback_voice {
                self.telephony.fallback_voice = fallback_voice;
            }
        }

        if let Some(routing) = patch.routing {
            if let Some(max_ring_seconds) = routing.max_ring_seconds {
                self.routing.max_ring_seconds = max_ring_seconds;
            }
            if let Some(max_call_duration_seconds) = routing.max_call_duration_seconds {
                self.routing.max_call_duration_seconds = max_call_duration_seconds;
            }
            if let Some(backend_timeout_ms) = routing.backend_timeout_ms {
                self.routing.backend_timeout_ms = backend_timeout_ms;
            }
            if let Some(candidate_page_size) = routing.candidate_page_size {
                self.routing.candidate_page_size = candidate_page_size;
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

        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("DCX_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("DCX_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("DCX_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("DCX_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("DCX_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("DCX_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("DCX_SERVER_PORT") {
            self.server.port = parse_u16("DCX_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("DCX_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("DCX_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let auth_token =
            read_env("DCX_TELEPHONY_AUTH_TOKEN").or_else(|| read_env("TWILIO_AUTH_TOKEN"));
        if let Some(value) = auth_token {
            self.telephony.auth_token = secret_value(value);
        }
        if let Some(value) = read_env("DCX_TELEPHONY_VALIDATE_SIGNATURES") {
            self.telephony.validate_signatures =
                parse_bool("DCX_TELEPHONY_VALIDATE_SIGNATURES", &value)?;
        }
        if let Some(value) = read_env("DCX_TELEPHONY_COST_PER_MINUTE_CENTS") {
            self.telephony.cost_per_minute_cents =
                parse_decimal("DCX_TELEPHONY_COST_PER_MINUTE_CENTS", &value)?;
        }
        if let Some(value) = read_env("DCX_TELEPHONY_PUBLIC_BASE_URL") {
            self.telephony.public_base_url = Some(value);
        }
        if let Some(value) = read_env("DCX_TELEPHONY_FALLBACK_VOICE") {
            self.telephony.fallback_voice = value;
        }

        if let Some(value) = read_env("DCX_ROUTING_MAX_RING_SECONDS") {
            self.routing.max_ring_seconds = parse_u32("DCX_ROUTING_MAX_RING_SECONDS", &value)?;
        }
        if let Some(value) = read_env("DCX_ROUTING_MAX_CALL_DURATION_SECONDS") {
            self.routing.max_call_duration_seconds =
                parse_u32("DCX_ROUTING_MAX_CALL_DURATION_SECONDS", &value)?;
        }
        if let Some(value) = read_env("DCX_ROUTING_BACKEND_TIMEOUT_MS") {
            self.routing.backend_timeout_ms = parse_u64("DCX_ROUTING_BACKEND_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = read_env("DCX_ROUTING_CANDIDATE_PAGE_SIZE") {
            self.routing.candidate_page_size =
                parse_u32("DCX_ROUTING_CANDIDATE_PAGE_SIZE", &value)?;
        }

        let log_level = read_env("DCX_LOGGING_LEVEL").or_else(|| read_env("DCX_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("DCX_LOGGING_FORMAT").or_else(|| read_env("DCX_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(auth_token) = overrides.telephony_auth_token {
            self.telephony.auth_token = secret_value(auth_token);
        }
        if let Some(validate_signatures) = overrides.validate_signatures {
            self.telephony.validate_signatures = validate_signatures;
        }
        if let Some(rate) = overrides.cost_per_minute_cents {
            self.telephony.cost_per_minute_cents = rate;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_telephony(&self.telephony)?;
        validate_routing(&self.routing)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("dcx.toml"), PathBuf::from("config/dcx.toml")]
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

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
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

fn validate_telephony(telephony: &TelephonyConfig) -> Result<(), ConfigError> {
    if telephony.validate_signatures && telephony.auth_token.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "telephony.auth_token is required while telephony.validate_signatures is enabled (set DCX_TELEPHONY_AUTH_TOKEN or TWILIO_AUTH_TOKEN)"
                .to_string(),
        ));
    }

    if telephony.cost_per_minute_cents.is_sign_negative() {
        return Err(ConfigError::Validation(
            "telephony.cost_per_minute_cents must not be negative".to_string(),
        ));
    }

    if let Some(base_url) = &telephony.public_base_url {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "telephony.public_base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_routing(routing: &RoutingConfig) -> Result<(), ConfigError> {
    if routing.max_ring_seconds == 0 {
        return Err(ConfigError::Validation(
            "routing.max_ring_seconds must be greater than zero".to_string(),
        ));
    }

    if routing.max_call_duration_seconds == 0 {
        return Err(ConfigError::Validation(
            "routing.max_call_duration_seconds must be greater than zero".to_string(),
        ));
    }

    if routing.backend_timeout_ms == 0 || routing.backend_timeout_ms > 5_000 {
        return Err(ConfigError::Validation(
            "routing.backend_timeout_ms must be in range 1..=5000".to_string(),
        ));
    }

    if routing.candidate_page_size == 0 {
        return Err(ConfigError::Validation(
            "routing.candidate_page_size must be greater than zero".to_string(),
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

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_decimal(key: &str, value: &str) -> Result<Decimal, ConfigError> {
    Decimal::from_str(value.trim()).map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    telephony: Option<TelephonyPatch>,
    routing: Option<RoutingPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
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
struct TelephonyPatch {
    auth_token: Option<String>,
    validate_signatures: Option<bool>,
    /// Written as a string (`"1.4"`) so the rate never passes through a float.
    cost_per_minute_cents: Option<String>,
    public_base_url: Option<String>,
    fallback_voice: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RoutingPatch {
    max_ring_seconds: Option<u32>,
    max_call_duration_seconds: Option<u32>,
    backend_timeout_ms: Option<u64>,
    candidate_page_size: Option<u32>,
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

    use rust_decimal::Decimal;
    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
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

        env::set_var("TEST_DCX_AUTH_TOKEN", "token-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("dcx.toml");
            fs::write(
                &path,
                r#"
[telephony]
auth_token = "${TEST_DCX_AUTH_TOKEN}"
cost_per_minute_cents = "2.5"

[routing]
max_ring_seconds = 20
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.telephony.auth_token.expose_secret() == "token-from-env",
                "auth token should be interpolated from environment",
            )?;
            ensure(
                config.telephony.cost_per_minute_cents == Decimal::new(25, 1),
                "per-minute rate should be read from file",
            )?;
            ensure(config.routing.max_ring_seconds == 20, "ring limit should be read from file")?;
            ensure(
                config.routing.max_call_duration_seconds == 1800,
                "unset routing values keep their defaults",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_DCX_AUTH_TOKEN"]);
        result
    }

    #[test]
    fn carrier_token_alias_and_logging_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TWILIO_AUTH_TOKEN", "twilio-token");
        env::set_var("DCX_LOG_LEVEL", "warn");
        env::set_var("DCX_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.telephony.auth_token.expose_secret() == "twilio-token",
                "TWILIO_AUTH_TOKEN should populate the carrier auth token",
            )?;
            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Json),
                "json logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["TWILIO_AUTH_TOKEN", "DCX_LOG_LEVEL", "DCX_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("DCX_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("DCX_TELEPHONY_AUTH_TOKEN", "token-from-env");
        env::set_var("DCX_TELEPHONY_COST_PER_MINUTE_CENTS", "1.75");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("dcx.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[telephony]
auth_token = "token-from-file"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.telephony.auth_token.expose_secret() == "token-from-env",
                "env auth token should win over file and defaults",
            )?;
            ensure(
                config.telephony.cost_per_minute_cents == Decimal::new(175, 2),
                "env rate should be parsed exactly",
            )?;
            Ok(())
        })();

        clear_vars(&[
            "DCX_DATABASE_URL",
            "DCX_TELEPHONY_AUTH_TOKEN",
            "DCX_TELEPHONY_COST_PER_MINUTE_CENTS",
        ]);
        result
    }

    #[test]
    fn signature_validation_requires_auth_token() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let error = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => return Err("expected validation failure but config load succeeded".to_string()),
            Err(error) => error,
        };
        let has_message = matches!(
            error,
            ConfigError::Validation(ref message) if message.contains("telephony.auth_token")
        );
        ensure(has_message, "validation failure should mention telephony.auth_token")?;

        let config = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                validate_signatures: Some(false),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .map_err(|err| format!("config load failed: {err}"))?;
        ensure(!config.telephony.validate_signatures, "validation can be switched off")
    }

    #[test]
    fn invalid_numeric_env_override_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("DCX_TELEPHONY_AUTH_TOKEN", "token");
        env::set_var("DCX_ROUTING_BACKEND_TIMEOUT_MS", "fast");

        let result = (|| -> Result<(), String> {
            match AppConfig::load(LoadOptions::default()) {
                Err(ConfigError::InvalidEnvOverride { key, .. }) => ensure(
                    key == "DCX_ROUTING_BACKEND_TIMEOUT_MS",
                    "error should name the offending variable",
                ),
                Err(other) => Err(format!("unexpected error: {other}")),
                Ok(_) => Err("expected invalid override error".to_string()),
            }
        })();

        clear_vars(&["DCX_TELEPHONY_AUTH_TOKEN", "DCX_ROUTING_BACKEND_TIMEOUT_MS"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("DCX_TELEPHONY_AUTH_TOKEN", "super-secret-carrier-token");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(
                !debug.contains("super-secret-carrier-token"),
                "debug output should not contain the carrier auth token",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&["DCX_TELEPHONY_AUTH_TOKEN"]);
        result
    }
}
