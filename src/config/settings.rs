//! Process settings read from the environment (`.env` honoured through dotenvy by the binary).

use crate::error::ConfigError;
use crate::search::schema::{DEFAULT_LIMIT, DEFAULT_MAX_LIMIT};
use crate::search::UnknownKeys;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_PAGE_WINDOW: i64 = 5;
pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

/// Search defaults applied to every entity unless its own config overrides them.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchSettings {
    pub default_limit: u64,
    pub max_limit: u64,
    /// Window length passed to the paginator for response metadata.
    pub page_window: i64,
    pub unknown_keys: UnknownKeys,
}

impl Default for SearchSettings {
    fn default() -> Self {
        SearchSettings {
            default_limit: DEFAULT_LIMIT,
            max_limit: DEFAULT_MAX_LIMIT,
            page_window: DEFAULT_PAGE_WINDOW,
            unknown_keys: UnknownKeys::Raise,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub database_url: String,
    pub listen_addr: String,
    pub config_path: PathBuf,
    pub body_limit: usize,
    pub search: SearchSettings,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Settings::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").ok_or_else(|| ConfigError::Load("DATABASE_URL must be set".into()))?;
        let defaults = SearchSettings::default();
        Ok(Settings {
            database_url,
            listen_addr: lookup("LISTEN_ADDR").unwrap_or_else(|| DEFAULT_LISTEN_ADDR.into()),
            config_path: lookup("CONFIG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("config")),
            body_limit: parsed(&lookup, "BODY_LIMIT_BYTES", DEFAULT_BODY_LIMIT)?,
            search: SearchSettings {
                default_limit: parsed(&lookup, "SEARCH_DEFAULT_LIMIT", defaults.default_limit)?,
                max_limit: parsed(&lookup, "SEARCH_MAX_LIMIT", defaults.max_limit)?,
                page_window: parsed(&lookup, "SEARCH_PAGE_WINDOW", defaults.page_window)?,
                unknown_keys: parsed(&lookup, "SEARCH_UNKNOWN_KEYS", defaults.unknown_keys)?,
            },
        })
    }
}

fn parsed<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ConfigError::Load(format!("{}: {}", key, e))),
    }
}
