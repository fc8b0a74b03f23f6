use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use procura_core::config::{AppConfig, LoadOptions};
use procura_core::JobName;
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    let database = &config.database;
    lines.push(render_line(
        "database.url",
        &database.url,
        source("database.url", &["PROCURA_DATABASE_URL"]),
    ));
    lines.push(render_line(
        "database.max_connections",
        &database.max_connections.to_string(),
        source("database.max_connections", &["PROCURA_DATABASE_MAX_CONNECTIONS"]),
    ));
    lines.push(render_line(
        "database.timeout_secs",
        &database.timeout_secs.to_string(),
        source("database.timeout_secs", &["PROCURA_DATABASE_TIMEOUT_SECS"]),
    ));

    let server = &config.server;
    lines.push(render_line(
        "server.bind_address",
        &server.bind_address,
        source("server.bind_address", &["PROCURA_SERVER_BIND_ADDRESS"]),
    ));
    lines.push(render_line(
        "server.port",
        &server.port.to_string(),
        source("server.port", &["PROCURA_SERVER_PORT"]),
    ));
    lines.push(render_line(
        "server.graceful_shutdown_secs",
        &server.graceful_shutdown_secs.to_string(),
        source("server.graceful_shutdown_secs", &["PROCURA_SERVER_GRACEFUL_SHUTDOWN_SECS"]),
    ));

    let notifications = &config.notifications;
    lines.push(render_line(
        "notifications.provider",
        &format!("{:?}", notifications.provider),
        source("notifications.provider", &["PROCURA_NOTIFICATIONS_PROVIDER"]),
    ));
    lines.push(render_line(
        "notifications.endpoint",
        notifications.endpoint.as_deref().unwrap_or("<unset>"),
        source("notifications.endpoint", &["PROCURA_NOTIFICATIONS_ENDPOINT"]),
    ));
    lines.push(render_line(
        "notifications.api_key",
        redact_secret(notifications.api_key.as_ref()),
        source("notifications.api_key", &["PROCURA_NOTIFICATIONS_API_KEY"]),
    ));
    lines.push(render_line(
        "notifications.from_address",
        &notifications.from_address,
        source("notifications.from_address", &["PROCURA_NOTIFICATIONS_FROM_ADDRESS"]),
    ));
    lines.push(render_line(
        "notifications.timeout_secs",
        &notifications.timeout_secs.to_string(),
        source("notifications.timeout_secs", &["PROCURA_NOTIFICATIONS_TIMEOUT_SECS"]),
    ));

    let scheduler = &config.scheduler;
    lines.push(render_line(
        "scheduler.enabled",
        &scheduler.enabled.to_string(),
        source("scheduler.enabled", &["PROCURA_SCHEDULER_ENABLED"]),
    ));
    lines.push(render_line(
        "scheduler.utc_offset_hours",
        &scheduler.utc_offset_hours.to_string(),
        source("scheduler.utc_offset_hours", &["PROCURA_SCHEDULER_UTC_OFFSET_HOURS"]),
    ));
    lines.push(render_line(
        "scheduler.tick_secs",
        &scheduler.tick_secs.to_string(),
        source("scheduler.tick_secs", &["PROCURA_SCHEDULER_TICK_SECS"]),
    ));
    for job in JobName::ALL {
        let key_path = format!("scheduler.{}", job.config_key());
        lines.push(render_line(&key_path, scheduler.cron_for(job), source(&key_path, &[])));
    }

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", &["PROCURA_LOGGING_LEVEL", "PROCURA_LOG_LEVEL"]),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        source("logging.format", &["PROCURA_LOGGING_FORMAT", "PROCURA_LOG_FORMAT"]),
    ));

    lines.join("\n")
}

pub(crate) fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("procura.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/procura.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
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

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_secret(secret: Option<&SecretString>) -> &'static str {
    match secret {
        None => "<unset>",
        Some(secret) if secret.expose_secret().trim().is_empty() => "<empty>",
        Some(_) => "<redacted>",
    }
}
