//! Settings for the `hearth` daemon.
//!
//! Read from an optional `settings.toml` next to the binary, then from
//! `HEARTH__*` environment variables (`HEARTH__SCHEDULER__HOUR=6`).

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct App {
    pub level: String,
}

impl Default for App {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Database {
    Memory,
    /// Path of the sqlite file, created when missing.
    Sqlite(String),
}

impl Default for Database {
    fn default() -> Self {
        Self::Sqlite("hearth.db".to_string())
    }
}

impl Database {
    pub fn url(&self) -> String {
        match self {
            Self::Memory => "sqlite::memory:".to_string(),
            Self::Sqlite(path) => format!("sqlite:{path}?mode=rwc"),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Scheduler {
    pub hour: u32,
    pub minute: u32,
    /// IANA timezone name.
    pub timezone: String,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self {
            hour: 0,
            minute: 5,
            timezone: "UTC".to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub app: App,
    pub database: Database,
    pub scheduler: Scheduler,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name("settings").required(false))
            .add_source(Environment::with_prefix("HEARTH").separator("__"))
            .build()?
            .try_deserialize()
    }
}
