// Copyright (c) James Kassemi, SC, US. All rights reserved.
use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::types::NetworkId;

/// Discrete health level exposed to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverallStatus {
    Ok,
    Warn,
    Crit,
}

impl Default for OverallStatus {
    fn default() -> Self {
        OverallStatus::Warn
    }
}

/// Per-network refresh state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FetchState {
    #[default]
    Idle,
    Fetching,
    Cached,
    FetchFailed,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkStatus {
    pub state: FetchState,
    /// Most recent failure; cleared by the next success.
    pub last_error: Option<String>,
    pub last_success: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub in_flight: u32,
    /// Whether any snapshot has ever been committed for this network.
    pub has_snapshot: bool,
}

/// Lightweight gauge descriptor for consumers that chart service health.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusGauge {
    pub label: String,
    pub value: f64,
    pub max: Option<f64>,
    pub unit: Option<String>,
    pub details: Option<String>,
}

/// Mutable backing structure for a service status snapshot.
#[derive(Debug, Clone, Default)]
pub struct ServiceStatus {
    pub networks: BTreeMap<NetworkId, NetworkStatus>,
    pub warnings: Vec<String>,
    pub gauges: Vec<StatusGauge>,
}

impl ServiceStatus {
    fn network_mut(&mut self, network: NetworkId) -> &mut NetworkStatus {
        self.networks.entry(network).or_default()
    }

    /// Crit when a network has failed with nothing cached. Warn while any
    /// network lacks a fresh result or a warning is outstanding.
    pub fn overall(&self) -> OverallStatus {
        if self.networks.is_empty() {
            return OverallStatus::Warn;
        }
        let mut overall = OverallStatus::Ok;
        for status in self.networks.values() {
            match status.state {
                FetchState::FetchFailed if !status.has_snapshot => return OverallStatus::Crit,
                FetchState::FetchFailed | FetchState::Idle => overall = OverallStatus::Warn,
                FetchState::Fetching if !status.has_snapshot => overall = OverallStatus::Warn,
                FetchState::Fetching | FetchState::Cached => {}
            }
        }
        if !self.warnings.is_empty() && overall == OverallStatus::Ok {
            overall = OverallStatus::Warn;
        }
        overall
    }
}

/// Immutable snapshot returned to consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceStatusSnapshot {
    pub name: String,
    pub overall: OverallStatus,
    pub networks: BTreeMap<NetworkId, NetworkStatus>,
    pub warnings: Vec<String>,
    pub gauges: Vec<StatusGauge>,
}

impl ServiceStatusSnapshot {
    pub fn network(&self, network: NetworkId) -> NetworkStatus {
        self.networks.get(&network).cloned().unwrap_or_default()
    }
}

/// Shared handle so the refresh service can record outcomes while readers
/// poll a consistent view.
#[derive(Clone)]
pub struct ServiceStatusHandle {
    name: &'static str,
    inner: Arc<RwLock<ServiceStatus>>,
}

impl ServiceStatusHandle {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inner: Arc::new(RwLock::new(ServiceStatus::default())),
        }
    }

    pub fn update<F>(&self, mutator: F)
    where
        F: FnOnce(&mut ServiceStatus),
    {
        let mut guard = self.inner.write();
        mutator(&mut guard);
    }

    pub fn track(&self, networks: &[NetworkId]) {
        self.update(|s| {
            for network in networks {
                s.network_mut(*network);
            }
        });
    }

    pub fn begin_fetch(&self, network: NetworkId) {
        self.update(|s| {
            let status = s.network_mut(network);
            status.in_flight += 1;
            status.state = FetchState::Fetching;
        });
    }

    pub fn record_success(&self, network: NetworkId, at: DateTime<Utc>) {
        self.update(|s| {
            let status = s.network_mut(network);
            status.in_flight = status.in_flight.saturating_sub(1);
            status.last_error = None;
            status.consecutive_failures = 0;
            status.has_snapshot = true;
            status.last_success = Some(status.last_success.map_or(at, |prev| prev.max(at)));
            status.state = if status.in_flight > 0 {
                FetchState::Fetching
            } else {
                FetchState::Cached
            };
        });
    }

    pub fn record_failure(&self, network: NetworkId, error: impl Into<String>) {
        let error = error.into();
        self.update(|s| {
            let status = s.network_mut(network);
            status.in_flight = status.in_flight.saturating_sub(1);
            status.last_error = Some(error);
            status.consecutive_failures += 1;
            status.state = if status.in_flight > 0 {
                FetchState::Fetching
            } else {
                FetchState::FetchFailed
            };
        });
    }

    /// Records an error that did not come from a fetch (e.g. a lost live
    /// subscription) without touching the fetch state machine.
    pub fn record_error(&self, network: NetworkId, error: impl Into<String>) {
        let error = error.into();
        self.update(|s| s.network_mut(network).last_error = Some(error));
    }

    /// Adds a warning unless the same text is already present.
    pub fn push_warning(&self, msg: impl Into<String>) {
        let msg = msg.into();
        self.update(|s| {
            if !s.warnings.contains(&msg) {
                s.warnings.push(msg);
            }
        });
    }

    pub fn clear_warnings_matching(&self, predicate: impl Fn(&str) -> bool) {
        self.update(|s| s.warnings.retain(|w| !predicate(w)));
    }

    pub fn set_gauges(&self, gauges: Vec<StatusGauge>) {
        self.update(|s| s.gauges = gauges);
    }

    pub fn network(&self, network: NetworkId) -> NetworkStatus {
        self.inner
            .read()
            .networks
            .get(&network)
            .cloned()
            .unwrap_or_default()
    }

    pub fn last_error(&self, network: NetworkId) -> Option<String> {
        self.inner
            .read()
            .networks
            .get(&network)
            .and_then(|s| s.last_error.clone())
    }

    pub fn snapshot(&self) -> ServiceStatusSnapshot {
        let guard = self.inner.read();
        ServiceStatusSnapshot {
            name: self.name.to_string(),
            overall: guard.overall(),
            networks: guard.networks.clone(),
            warnings: guard.warnings.clone(),
            gauges: guard.gauges.clone(),
        }
    }

    pub fn overall(&self) -> OverallStatus {
        self.inner.read().overall()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_keeps_snapshot_flag_and_success_clears_error() {
        let status = ServiceStatusHandle::new("ledger_stats");
        status.begin_fetch(NetworkId::Xrpl);
        status.record_success(NetworkId::Xrpl, Utc::now());
        status.begin_fetch(NetworkId::Xrpl);
        status.record_failure(NetworkId::Xrpl, "connection lost");

        let net = status.network(NetworkId::Xrpl);
        assert_eq!(net.state, FetchState::FetchFailed);
        assert!(net.has_snapshot);
        assert_eq!(net.last_error.as_deref(), Some("connection lost"));
        assert_eq!(status.overall(), OverallStatus::Warn);

        status.begin_fetch(NetworkId::Xrpl);
        status.record_success(NetworkId::Xrpl, Utc::now());
        let net = status.network(NetworkId::Xrpl);
        assert_eq!(net.state, FetchState::Cached);
        assert_eq!(net.last_error, None);
        assert_eq!(net.consecutive_failures, 0);
    }

    #[test]
    fn overall_is_crit_when_failed_without_cache() {
        let status = ServiceStatusHandle::new("ledger_stats");
        status.track(&NetworkId::ALL);
        status.begin_fetch(NetworkId::Xahau);
        status.record_failure(NetworkId::Xahau, "boom");
        assert_eq!(status.overall(), OverallStatus::Crit);
        assert_eq!(status.network(NetworkId::Xrpl).state, FetchState::Idle);
    }

    #[test]
    fn warnings_degrade_an_otherwise_healthy_status() {
        let status = ServiceStatusHandle::new("ledger_stats");
        status.begin_fetch(NetworkId::Xrpl);
        status.record_success(NetworkId::Xrpl, Utc::now());
        assert_eq!(status.overall(), OverallStatus::Ok);

        status.push_warning("[XRPL Mainnet] live subscription lost");
        status.push_warning("[XRPL Mainnet] live subscription lost");
        let snapshot = status.snapshot();
        assert_eq!(snapshot.overall, OverallStatus::Warn);
        assert_eq!(snapshot.warnings.len(), 1);

        status.clear_warnings_matching(|w| w.starts_with("[XRPL Mainnet]"));
        assert!(status.snapshot().warnings.is_empty());
        assert_eq!(status.overall(), OverallStatus::Ok);
    }

    #[test]
    fn overlapping_fetches_stay_fetching_until_last_completes() {
        let status = ServiceStatusHandle::new("ledger_stats");
        status.begin_fetch(NetworkId::Xrpl);
        status.begin_fetch(NetworkId::Xrpl);
        status.record_success(NetworkId::Xrpl, Utc::now());
        assert_eq!(status.network(NetworkId::Xrpl).state, FetchState::Fetching);
        status.record_success(NetworkId::Xrpl, Utc::now());
        assert_eq!(status.network(NetworkId::Xrpl).state, FetchState::Cached);
        assert_eq!(status.overall(), OverallStatus::Ok);
    }
}
