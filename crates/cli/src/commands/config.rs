use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use dcx_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

/// One printed setting: dotted key, rendered value, env vars that can set it.
struct Setting {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines =
        vec!["effective config (source precedence: env > file > default):".to_string()];
    for setting in settings(&config) {
        let source = field_source(
            setting.key,
            setting.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(format!("- {} = {} (source: {source})", setting.key, setting.value));
    }

    lines.join("\n")
}

fn settings(config: &AppConfig) -> Vec<Setting> {
    let optional = |value: Option<&str>| value.unwrap_or("<unset>").to_string();

    vec![
        Setting {
            key: "database.url",
            value: config.database.url.clone(),
            env_keys: &["DCX_DATABASE_URL"],
        },
        Setting {
            key: "database.max_connections",
            value: config.database.max_connections.to_string(),
            env_keys: &["DCX_DATABASE_MAX_CONNECTIONS"],
        },
        Setting {
            key: "database.timeout_secs",
            value: config.database.timeout_secs.to_string(),
            env_keys: &["DCX_DATABASE_TIMEOUT_SECS"],
        },
        Setting {
            key: "server.bind_address",
            value: config.server.bind_address.clone(),
            env_keys: &["DCX_SERVER_BIND_ADDRESS"],
        },
        Setting {
            key: "server.port",
            value: config.server.port.to_string(),
            env_keys: &["DCX_SERVER_PORT"],
        },
        Setting {
            key: "server.graceful_shutdown_secs",
            value: config.server.graceful_shutdown_secs.to_string(),
            env_keys: &["DCX_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        },
        Setting {
            key: "telephony.auth_token",
            value: redact_token(config.telephony.auth_token.expose_secret()),
            env_keys: &["DCX_TELEPHONY_AUTH_TOKEN", "TWILIO_AUTH_TOKEN"],
        },
        Setting {
            key: "telephony.validate_signatures",
            value: config.telephony.validate_signatures.to_string(),
            env_keys: &["DCX_TELEPHONY_VALIDATE_SIGNATURES"],
        },
        Setting {
            key: "telephony.cost_per_minute_cents",
            value: config.telephony.cost_per_minute_cents.to_string(),
            env_keys: &["DCX_TELEPHONY_COST_PER_MINUTE_CENTS"],
        },
        Setting {
            key: "telephony.public_base_url",
            value: optional(config.telephony.public_base_url.as_deref()),
            env_keys: &["DCX_TELEPHONY_PUBLIC_BASE_URL"],
        },
        Setting {
            key: "telephony.fallback_voice",
            value: config.telephony.fallback_voice.clone(),
            env_keys: &["DCX_TELEPHONY_FALLBACK_VOICE"],
        },
        Setting {
            key: "routing.max_ring_seconds",
            value: config.routing.max_ring_seconds.to_string(),
            env_keys: &["DCX_ROUTING_MAX_RING_SECONDS"],
        },
        Setting {
            key: "routing.max_call_duration_seconds",
            value: config.routing.max_call_duration_seconds.to_string(),
            env_keys: &["DCX_ROUTING_MAX_CALL_DURATION_SECONDS"],
        },
        Setting {
            key: "routing.backend_timeout_ms",
            value: config.routing.backend_timeout_ms.to_string(),
            env_keys: &["DCX_ROUTING_BACKEND_TIMEOUT_MS"],
        },
        Setting {
            key: "routing.candidate_page_size",
            value: config.routing.candidate_page_size.to_string(),
            env_keys: &["DCX_ROUTING_CANDIDATE_PAGE_SIZE"],
        },
        Setting {
            key: "logging.level",
            value: config.logging.level.clone(),
            env_keys: &["DCX_LOGGING_LEVEL", "DCX_LOG_LEVEL"],
        },
        Setting {
            key: "logging.format",
            value: format!("{:?}", config.logging.format),
            env_keys: &["DCX_LOGGING_FORMAT", "DCX_LOG_FORMAT"],
        },
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    ["dcx.toml", "config/dcx.toml"].into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

/// Shows at most a two-character prefix of the carrier token.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }
    if trimmed.len() <= 4 {
        return "<redacted>".to_string();
    }
    let prefix: String = trimmed.chars().take(2).collect();
    format!("{prefix}***")
}
