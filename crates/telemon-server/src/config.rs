use anyhow::{anyhow, Context};
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Listen address, `host:port`.
    #[serde(default = "default_address")]
    pub address: String,
    /// Default `tracing` level for the `telemon` crates.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Snapshot period for the file store. Zero writes on every update.
    #[serde(default = "default_store_interval")]
    pub store_interval_secs: u64,
    /// Snapshot file; enables the file store when set.
    #[serde(default)]
    pub file_storage_path: Option<String>,
    /// Load the snapshot at startup.
    #[serde(default)]
    pub restore: bool,
    /// PostgreSQL connection string; takes precedence over the file store.
    #[serde(default)]
    pub database_dsn: Option<String>,
    /// HMAC key for `HashSHA256` request checks and response signatures.
    #[serde(default)]
    pub key: Option<String>,
}

fn default_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_store_interval() -> u64 {
    300
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            log_level: default_log_level(),
            store_interval_secs: default_store_interval(),
            file_storage_path: None,
            restore: false,
            database_dsn: None,
            key: None,
        }
    }
}

impl ServerConfig {
    /// Reads `path` (defaults when the file does not exist) and applies
    /// environment overrides.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let mut config = if Path::new(path).exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read server config '{path}'"))?;
            toml::from_str(&content).with_context(|| format!("invalid server config '{path}'"))?
        } else {
            Self::default()
        };
        config.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Overrides fields from `ADDRESS`, `LOG_LEVEL`, `STORE_INTERVAL`,
    /// `FILE_STORAGE_PATH`, `RESTORE`, `DATABASE_DSN` and `KEY`.
    /// Empty values are ignored.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<()> {
        let lookup = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(v) = lookup("ADDRESS") {
            self.address = v;
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            self.log_level = v;
        }
        if let Some(v) = lookup("STORE_INTERVAL") {
            self.store_interval_secs = parse("STORE_INTERVAL", &v)?;
        }
        if let Some(v) = lookup("FILE_STORAGE_PATH") {
            self.file_storage_path = Some(v);
        }
        if let Some(v) = lookup("RESTORE") {
            self.restore = parse("RESTORE", &v)?;
        }
        if let Some(v) = lookup("DATABASE_DSN") {
            self.database_dsn = Some(v);
        }
        if let Some(v) = lookup("KEY") {
            self.key = Some(v);
        }
        Ok(())
    }

    pub fn store_interval(&self) -> Duration {
        Duration::from_secs(self.store_interval_secs)
    }

    /// The file store writes through on every update when the interval is zero.
    pub fn sync_on_write(&self) -> bool {
        self.store_interval_secs == 0
    }

    pub fn sign_key(&self) -> Option<&str> {
        self.key.as_deref().filter(|k| !k.is_empty())
    }
}

fn parse<T>(name: &str, raw: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| anyhow!("invalid {name} '{raw}': {e}"))
}
