//! Application settings, read from `SHERPA_*` environment variables.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const ENV_PREFIX: &str = "SHERPA_";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Pretty => f.write_str("pretty"),
            LogFormat::Json => f.write_str("json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    pub app_name: String,
    pub environment: String,
    pub debug: bool,
    pub workers: usize,
    pub bind: SocketAddr,
    pub log_format: LogFormat,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_name: "ShopSherpa".to_string(),
            environment: "development".to_string(),
            debug: false,
            workers: 2,
            bind: SocketAddr::from(([127, 0, 0, 1], 8000)),
            log_format: LogFormat::Pretty,
        }
    }
}

impl AppConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by `lookup`, called with full `SHERPA_*` keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |name: &str| {
            let key = format!("{ENV_PREFIX}{name}");
            lookup(key.as_str()).map(|value| (key, value))
        };

        if let Some((_, v)) = get("APP_NAME") {
            config.app_name = v;
        }
        if let Some((_, v)) = get("ENVIRONMENT") {
            config.environment = v;
        }
        if let Some((key, v)) = get("DEBUG") {
            config.debug = parse_bool(&v).ok_or(ConfigError::InvalidEnv { key, value: v })?;
        }
        if let Some((key, v)) = get("WORKERS") {
            config.workers = parse(key, v)?;
        }
        if let Some((key, v)) = get("BIND") {
            config.bind = parse(key, v)?;
        }
        if let Some((key, v)) = get("LOG_FORMAT") {
            config.log_format = parse(key, v)?;
        }
        Ok(config)
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

fn parse<T: FromStr>(key: String, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { key, value })
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
