use anyhow::{anyhow, bail, Context};
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// `host:port` of the telemon server.
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,
    /// Number of concurrent delivery workers.
    #[serde(default = "default_rate_limit")]
    pub rate_limit: usize,
    /// HMAC key for the `HashSHA256` header; unsigned when absent.
    #[serde(default)]
    pub key: Option<String>,
    /// Sample host memory, load and per-core CPU in addition to the agent process.
    #[serde(default = "default_host_metrics")]
    pub host_metrics: bool,
}

fn default_address() -> String {
    "localhost:8080".to_string()
}

fn default_poll_interval() -> u64 {
    2
}

fn default_report_interval() -> u64 {
    10
}

fn default_rate_limit() -> usize {
    5
}

fn default_host_metrics() -> bool {
    true
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            poll_interval_secs: default_poll_interval(),
            report_interval_secs: default_report_interval(),
            rate_limit: default_rate_limit(),
            key: None,
            host_metrics: default_host_metrics(),
        }
    }
}

impl AgentConfig {
    /// Reads `path` (defaults when the file does not exist), applies
    /// environment overrides and validates the result.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let mut config = if Path::new(path).exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read agent config '{path}'"))?;
            toml::from_str(&content).with_context(|| format!("invalid agent config '{path}'"))?
        } else {
            tracing::info!(path, "Config file not found, using defaults");
            Self::default()
        };
        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Overrides fields from `ADDRESS`, `POLL_INTERVAL`, `REPORT_INTERVAL`,
    /// `KEY`, `RATE_LIMIT` and `HOST_METRICS` as resolved by `lookup`.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<()> {
        if let Some(address) = lookup("ADDRESS") {
            self.address = address;
        }
        if let Some(v) = parse_var(&lookup, "POLL_INTERVAL")? {
            self.poll_interval_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "REPORT_INTERVAL")? {
            self.report_interval_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "RATE_LIMIT")? {
            self.rate_limit = v;
        }
        if let Some(v) = parse_var(&lookup, "HOST_METRICS")? {
            self.host_metrics = v;
        }
        if let Some(key) = lookup("KEY") {
            self.key = Some(key).filter(|k| !k.is_empty());
        }
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.address.trim().is_empty() {
            bail!("address must not be empty");
        }
        if self.poll_interval_secs == 0 {
            bail!("poll interval must be greater than zero");
        }
        if self.report_interval_secs == 0 {
            bail!("report interval must be greater than zero");
        }
        if self.rate_limit == 0 {
            bail!("rate limit must be greater than zero");
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }

    /// Full URL of the batch update endpoint.
    pub fn updates_url(&self) -> String {
        let addr = self.address.trim().trim_end_matches('/');
        if addr.contains("://") {
            format!("{addr}/updates/")
        } else {
            format!("http://{addr}/updates/")
        }
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(name)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| anyhow!("invalid {name} '{raw}': {e}"))
        })
        .transpose()
}
