// Copyright (c) James Kassemi, SC, US. All rights reserved.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Label used when a transaction carries no recognizable result code or type.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// The two ledger networks tracked by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkId {
    Xrpl,
    Xahau,
}

impl NetworkId {
    pub const ALL: [NetworkId; 2] = [NetworkId::Xrpl, NetworkId::Xahau];

    pub fn label(self) -> &'static str {
        match self {
            NetworkId::Xrpl => "XRPL Mainnet",
            NetworkId::Xahau => "Xahau Network",
        }
    }

    pub fn short_name(self) -> &'static str {
        match self {
            NetworkId::Xrpl => "XRPL",
            NetworkId::Xahau => "Xahau",
        }
    }

    pub fn default_url(self) -> &'static str {
        match self {
            NetworkId::Xrpl => "wss://xrpl1.panicbot.app",
            NetworkId::Xahau => "wss://xahau2.panicbot.app",
        }
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownNetwork(pub String);

impl fmt::Display for UnknownNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown network '{}' (expected xrpl or xahau)", self.0)
    }
}

impl std::error::Error for UnknownNetwork {}

impl FromStr for NetworkId {
    type Err = UnknownNetwork;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "xrpl" => Ok(NetworkId::Xrpl),
            "xahau" => Ok(NetworkId::Xahau),
            other => Err(UnknownNetwork(other.to_string())),
        }
    }
}

/// Immutable identity of one socket endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkEndpoint {
    pub id: NetworkId,
    pub name: String,
    pub url: String,
}

impl NetworkEndpoint {
    pub fn new(id: NetworkId, url: impl Into<String>) -> Self {
        Self {
            id,
            name: id.label().to_string(),
            url: url.into(),
        }
    }

    pub fn with_default_url(id: NetworkId) -> Self {
        Self::new(id, id.default_url())
    }
}

/// Scheduling strategy applied to every tracked network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshMode {
    /// Single-ledger scans driven by ledger-close events.
    Live,
    /// Periodic rescans over a window of recent ledgers.
    Historical,
}

impl RefreshMode {
    pub fn ledger_count(self, historical_window: u32) -> u32 {
        match self {
            RefreshMode::Live => 1,
            RefreshMode::Historical => historical_window.max(1),
        }
    }
}

impl fmt::Display for RefreshMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshMode::Live => f.write_str("live"),
            RefreshMode::Historical => f.write_str("historical"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRefreshMode(pub String);

impl fmt::Display for UnknownRefreshMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown refresh mode '{}' (expected live or historical)", self.0)
    }
}

impl std::error::Error for UnknownRefreshMode {}

impl FromStr for RefreshMode {
    type Err = UnknownRefreshMode;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "live" => Ok(RefreshMode::Live),
            "historical" => Ok(RefreshMode::Historical),
            other => Err(UnknownRefreshMode(other.to_string())),
        }
    }
}

/// One row of a ranked frequency table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedEntry {
    pub label: String,
    pub count: u64,
    /// Percentage of the table total, 0..=100.
    pub share: f64,
}

/// Output of aggregating a set of transactions.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TransactionStats {
    pub result_codes: Vec<RankedEntry>,
    pub transaction_types: Vec<RankedEntry>,
    pub total_transactions: u64,
    pub most_common_result_code: Option<String>,
    pub most_common_transaction_type: Option<String>,
    pub average_per_result_code: f64,
    pub average_per_transaction_type: f64,
}

/// Immutable per-network result served to readers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub network: NetworkId,
    pub network_label: String,
    pub mode: RefreshMode,
    #[serde(flatten)]
    pub stats: TransactionStats,
    pub latest_ledger_index: u64,
    pub ledger_range: String,
    pub ledgers_scanned: u32,
    pub ledgers_failed: u32,
    pub timestamp: DateTime<Utc>,
}

impl Snapshot {
    pub fn total_transactions(&self) -> u64 {
        self.stats.total_transactions
    }

    pub fn result_codes(&self) -> &[RankedEntry] {
        &self.stats.result_codes
    }

    pub fn transaction_types(&self) -> &[RankedEntry] {
        &self.stats.transaction_types
    }
}
