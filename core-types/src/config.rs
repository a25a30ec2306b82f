// Copyright (c) James Kassemi, SC, US. All rights reserved.
use std::{path::Path, time::Duration};

use config::{Config, ConfigError};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    retry::RetryPolicy,
    types::{NetworkEndpoint, NetworkId, RefreshMode},
};

pub const DEFAULT_CONFIG_FILE: &str = "ledger-stats";
pub const ENV_PREFIX: &str = "LEDGER_STATS";

/// Top-level configuration, read from an optional TOML file and then the
/// environment (`LEDGER_STATS_REFRESH__HISTORICAL_LEDGER_COUNT=50`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub log_level: String,
    pub networks: NetworksConfig,
    pub refresh: RefreshConfig,
    pub scan: ScanSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            networks: NetworksConfig::default(),
            refresh: RefreshConfig::default(),
            scan: ScanSettings::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworksConfig {
    pub xrpl_url: String,
    pub xahau_url: String,
}

impl Default for NetworksConfig {
    fn default() -> Self {
        Self {
            xrpl_url: NetworkId::Xrpl.default_url().to_string(),
            xahau_url: NetworkId::Xahau.default_url().to_string(),
        }
    }
}

impl NetworksConfig {
    pub fn url_for(&self, network: NetworkId) -> &str {
        match network {
            NetworkId::Xrpl => &self.xrpl_url,
            NetworkId::Xahau => &self.xahau_url,
        }
    }

    pub fn endpoints(&self) -> Vec<NetworkEndpoint> {
        NetworkId::ALL
            .iter()
            .map(|id| NetworkEndpoint::new(*id, self.url_for(*id)))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    pub default_mode: RefreshMode,
    pub default_network: NetworkId,
    pub historical_ledger_count: u32,
    pub historical_interval_secs: u64,
    /// Upper bound on one network fetch; 0 disables.
    pub fetch_timeout_secs: u64,
    /// Reconnect a live subscription after this long without a ledger close; 0 disables.
    pub live_idle_timeout_secs: u64,
    pub live_reconnect_base_ms: u64,
    pub live_reconnect_max_ms: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            default_mode: RefreshMode::Historical,
            default_network: NetworkId::Xrpl,
            historical_ledger_count: 100,
            historical_interval_secs: 300,
            fetch_timeout_secs: 120,
            live_idle_timeout_secs: 60,
            live_reconnect_base_ms: 1_000,
            live_reconnect_max_ms: 30_000,
        }
    }
}

impl RefreshConfig {
    pub fn historical_interval(&self) -> Duration {
        Duration::from_secs(self.historical_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        non_zero_secs(self.fetch_timeout_secs)
    }

    pub fn live_idle_timeout(&self) -> Option<Duration> {
        non_zero_secs(self.live_idle_timeout_secs)
    }

    pub fn reconnect_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            usize::MAX,
            self.live_reconnect_base_ms,
            self.live_reconnect_max_ms,
            0.2,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Per-request timeout; 0 disables.
    pub request_timeout_ms: u64,
    pub ledger_fetch_attempts: usize,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            request_timeout_ms: 15_000,
            ledger_fetch_attempts: 3,
            retry_base_delay_ms: 250,
            retry_max_delay_ms: 2_000,
        }
    }
}

impl ScanSettings {
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_ms > 0).then(|| Duration::from_millis(self.request_timeout_ms))
    }

    pub fn ledger_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.ledger_fetch_attempts,
            self.retry_base_delay_ms,
            self.retry_max_delay_ms,
            0.2,
        )
    }
}

fn non_zero_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

impl AppConfig {
    /// Loads `ledger-stats.toml` from the working directory if present.
    pub fn load() -> Result<Self, ConfigError> {
        Self::build(config::File::with_name(DEFAULT_CONFIG_FILE).required(false))
    }

    /// Loads an explicit configuration file, which must exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        Self::build(config::File::from(path).required(true))
    }

    fn build<S>(file: S) -> Result<Self, ConfigError>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let settings = Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for network in NetworkId::ALL {
            let raw = self.networks.url_for(network);
            let url = Url::parse(raw).map_err(|err| {
                ConfigError::Message(format!("invalid url for {network}: {raw} ({err})"))
            })?;
            if !matches!(url.scheme(), "ws" | "wss") {
                return Err(ConfigError::Message(format!(
                    "url for {network} must use ws:// or wss://, got {raw}"
                )));
            }
        }
        if self.refresh.historical_ledger_count == 0 {
            return Err(ConfigError::Message(
                "refresh.historical_ledger_count must be at least 1".to_string(),
            ));
        }
        if self.refresh.historical_interval_secs == 0 {
            return Err(ConfigError::Message(
                "refresh.historical_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.scan.ledger_fetch_attempts == 0 {
            return Err(ConfigError::Message(
                "scan.ledger_fetch_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn endpoints(&self) -> Vec<NetworkEndpoint> {
        self.networks.endpoints()
    }
}
