use std::{collections::HashMap, fs, path::Path, time::Duration};

use client_core::controller::AUTOSAVE_INTERVAL;
use tracing::warn;

pub const SETTINGS_FILE: &str = "candidate.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub api_url: String,
    pub store_url: String,
    pub log_filter: String,
    pub autosave_interval: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:3000/api".into(),
            store_url: "sqlite://./data/candidate.db".into(),
            log_filter: "info".into(),
            autosave_interval: AUTOSAVE_INTERVAL,
        }
    }
}

pub fn load_settings() -> Settings {
    load_settings_from(Path::new(SETTINGS_FILE), |key| std::env::var(key).ok())
}

/// File values first, then environment overrides; later sources win.
pub fn load_settings_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<HashMap<String, toml::Value>>(&raw) {
            Ok(file_cfg) => {
                if let Some(v) = file_cfg.get("api_url").and_then(toml::Value::as_str) {
                    settings.api_url = v.to_string();
                }
                if let Some(v) = file_cfg.get("store_url").and_then(toml::Value::as_str) {
                    settings.store_url = v.to_string();
                }
                if let Some(v) = file_cfg.get("log_filter").and_then(toml::Value::as_str) {
                    settings.log_filter = v.to_string();
                }
                if let Some(secs) = file_cfg.get("autosave_interval_secs").and_then(toml_secs) {
                    settings.autosave_interval = secs;
                }
            }
            Err(err) => warn!(path = %path.display(), "ignoring unreadable settings file: {err}"),
        }
    }

    if let Some(v) = env("API_URL") {
        settings.api_url = v;
    }
    if let Some(v) = env("APP__API_URL") {
        settings.api_url = v;
    }

    if let Some(v) = env("STORE_URL") {
        settings.store_url = v;
    }
    if let Some(v) = env("APP__STORE_URL") {
        settings.store_url = v;
    }

    if let Some(v) = env("APP__LOG_FILTER") {
        settings.log_filter = v;
    }

    if let Some(secs) = env("APP__AUTOSAVE_INTERVAL_SECS").and_then(|v| parse_secs(&v)) {
        settings.autosave_interval = secs;
    }

    settings.store_url = normalize_store_url(&settings.store_url);
    settings
}

fn normalize_store_url(raw_store_url: &str) -> String {
    let raw_store_url = raw_store_url.trim();

    if raw_store_url.is_empty() {
        return Settings::default().store_url;
    }

    if raw_store_url.starts_with("sqlite::memory:")
        || raw_store_url.starts_with("sqlite://")
        || raw_store_url.contains("://")
    {
        return raw_store_url.to_string();
    }

    if let Some(path) = raw_store_url.strip_prefix("sqlite:") {
        let path = path.replace('\\', "/");
        return format!("sqlite://{path}");
    }

    format!("sqlite://{}", raw_store_url.replace('\\', "/"))
}

fn toml_secs(value: &toml::Value) -> Option<Duration> {
    match value {
        toml::Value::Integer(secs) => u64::try_from(*secs)
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs),
        toml::Value::String(raw) => parse_secs(raw),
        _ => None,
    }
}

/// Whole positive seconds; anything else is ignored.
fn parse_secs(raw: &str) -> Option<Duration> {
    raw.trim()
        .parse::<u64>()
        .ok()
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}
