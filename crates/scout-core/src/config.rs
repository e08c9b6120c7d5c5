//! Lightweight configuration loader.
//!
//! Uses Figment to merge built-in defaults + `scout.toml` + `scout.<env>.toml`
//! + `SCOUT_*` env vars (nested keys separated by `__`, e.g.
//! `SCOUT_CURSOR__CHUNK_SIZE`). The engine never reads this on its own; the
//! extracted [`Settings`] are handed to it explicitly.
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub soft_delete: bool,
    pub soft_delete_field: String,
    pub default_connection: String,
    pub alias_cache_ttl_secs: u64,
    pub cursor: CursorSettings,
    pub paginate: PaginateSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CursorSettings {
    pub chunk_size: usize,
    pub keep_alive: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginateSettings {
    pub per_page: usize,
    pub page_name: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            soft_delete: false,
            soft_delete_field: "__soft_deleted".to_string(),
            default_connection: "default".to_string(),
            alias_cache_ttl_secs: 300,
            cursor: CursorSettings::default(),
            paginate: PaginateSettings::default(),
        }
    }
}

impl Default for CursorSettings {
    fn default() -> Self {
        Self { chunk_size: 1000, keep_alive: "5m".to_string() }
    }
}

impl Default for PaginateSettings {
    fn default() -> Self {
        Self { per_page: 15, page_name: "page".to_string() }
    }
}

impl Settings {
    pub fn alias_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.alias_cache_ttl_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.soft_delete_field.trim().is_empty() {
            return Err(Error::InvalidConfig("soft_delete_field must not be empty".to_string()));
        }
        if self.default_connection.trim().is_empty() {
            return Err(Error::InvalidConfig("default_connection must not be empty".to_string()));
        }
        if self.cursor.chunk_size == 0 {
            return Err(Error::InvalidConfig("cursor.chunk_size must be at least 1".to_string()));
        }
        if self.cursor.keep_alive.trim().is_empty() {
            return Err(Error::InvalidConfig("cursor.keep_alive must not be empty".to_string()));
        }
        if self.paginate.per_page == 0 {
            return Err(Error::InvalidConfig("paginate.per_page must be at least 1".to_string()));
        }
        Ok(())
    }
}

pub struct Config {
    figment: Figment,
}

impl Config {
    /// Load from the current directory using `RUST_ENV` (default `dev`).
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        Self::load_from(Path::new("."), &env_name)
    }

    pub fn load_from(dir: &Path, env_name: &str) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(dir.join("scout.toml")));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("scout.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("scout.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("scout.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("SCOUT_").split("__"));

        let config = Self { figment };
        config.settings()?.validate()?;
        Ok(config)
    }

    pub fn settings(&self) -> Result<Settings> {
        self.figment
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::InvalidConfig(format!("Failed to get '{key}': {e}")))
    }
}
