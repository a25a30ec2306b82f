// Copyright (c) James Kassemi, SC, US. All rights reserved.
use std::{collections::BTreeMap, sync::Arc, time::Duration};

use core_types::{
    config::AppConfig,
    retry::RetryPolicy,
    status::{FetchState, ServiceStatusHandle, StatusGauge},
    NetworkEndpoint, NetworkId, RefreshMode, Snapshot,
};
use futures::future::join_all;
use log::{debug, info, warn};
use parking_lot::RwLock;

use crate::{
    cache::SnapshotCache,
    error::FetchError,
    fetch::LedgerFetcher,
    metrics::RefreshMetrics,
};

pub(crate) const STATUS_NAME: &str = "ledger_stats";

/// Timing knobs for the refresh schedules.
#[derive(Debug, Clone)]
pub(crate) struct RefreshSettings {
    pub historical_window: u32,
    pub historical_interval: Duration,
    pub fetch_timeout: Option<Duration>,
    pub live_idle_timeout: Option<Duration>,
    pub reconnect: RetryPolicy,
}

impl From<&AppConfig> for RefreshSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            historical_window: config.refresh.historical_ledger_count,
            historical_interval: config.refresh.historical_interval(),
            fetch_timeout: config.refresh.fetch_timeout(),
            live_idle_timeout: config.refresh.live_idle_timeout(),
            reconnect: config.refresh.reconnect_policy(),
        }
    }
}

/// State shared by the service, its read handles and the schedule tasks.
/// The cache is written only through [`Refresher::refresh`].
pub(crate) struct Refresher {
    pub fetcher: Arc<dyn LedgerFetcher>,
    pub endpoints: Vec<NetworkEndpoint>,
    pub settings: RefreshSettings,
    pub cache: SnapshotCache,
    pub status: ServiceStatusHandle,
    pub metrics: RefreshMetrics,
    pub active_network: RwLock<NetworkId>,
    pub mode: RwLock<RefreshMode>,
}

impl Refresher {
    pub fn new(config: &AppConfig, fetcher: Arc<dyn LedgerFetcher>) -> Self {
        let endpoints = config.endpoints();
        let status = ServiceStatusHandle::new(STATUS_NAME);
        let networks: Vec<NetworkId> = endpoints.iter().map(|endpoint| endpoint.id).collect();
        status.track(&networks);
        Self {
            fetcher,
            endpoints,
            settings: RefreshSettings::from(config),
            cache: SnapshotCache::new(),
            status,
            metrics: RefreshMetrics::new(),
            active_network: RwLock::new(config.refresh.default_network),
            mode: RwLock::new(config.refresh.default_mode),
        }
    }

    pub fn networks(&self) -> Vec<NetworkId> {
        self.endpoints.iter().map(|endpoint| endpoint.id).collect()
    }

    pub fn endpoint(&self, network: NetworkId) -> Result<&NetworkEndpoint, FetchError> {
        self.endpoints
            .iter()
            .find(|endpoint| endpoint.id == network)
            .ok_or(FetchError::UnknownNetwork(network))
    }

    pub fn ledger_count(&self, mode: RefreshMode) -> u32 {
        mode.ledger_count(self.settings.historical_window)
    }

    /// Fetches one network and commits the result unless a newer fetch for
    /// the same network already committed. Failures leave the cache alone.
    pub async fn refresh(
        &self,
        network: NetworkId,
        mode: RefreshMode,
    ) -> Result<Arc<Snapshot>, FetchError> {
        let endpoint = self.endpoint(network)?;
        let count = self.ledger_count(mode);
        let ticket = self.cache.ticket(network);
        self.status.begin_fetch(network);
        self.metrics.inc_fetches_started();
        debug!("[{}] fetching {count} ledgers ({mode})", endpoint.name);

        let fetch = self.fetcher.fetch(endpoint, count, mode);
        let outcome = match self.settings.fetch_timeout {
            Some(limit) => tokio::time::timeout(limit, fetch)
                .await
                .unwrap_or(Err(FetchError::Timeout(limit))),
            None => fetch.await,
        };

        let result = match outcome {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                self.metrics
                    .inc_ledgers_dropped(u64::from(snapshot.ledgers_failed));
                self.status.record_success(network, snapshot.timestamp);
                if self.cache.commit(ticket, Arc::clone(&snapshot)) {
                    self.metrics.inc_fetches_succeeded();
                    self.metrics.mark_commit();
                    info!(
                        "[{}] snapshot committed: {} transactions over {}",
                        endpoint.name,
                        snapshot.total_transactions(),
                        snapshot.ledger_range
                    );
                } else {
                    self.metrics.inc_fetches_discarded();
                    debug!(
                        "[{}] discarding superseded snapshot for ledger {}",
                        endpoint.name, snapshot.latest_ledger_index
                    );
                }
                Ok(snapshot)
            }
            Err(err) => {
                self.metrics.inc_fetches_failed();
                self.status.record_failure(network, err.to_string());
                warn!("[{}] fetch failed: {err}", endpoint.name);
                Err(err)
            }
        };
        self.publish_gauges();
        result
    }

    /// One concurrent fetch per network; returns the cache view afterwards.
    pub async fn refresh_all(
        &self,
        mode: RefreshMode,
    ) -> BTreeMap<NetworkId, Option<Arc<Snapshot>>> {
        let networks = self.networks();
        join_all(networks.iter().map(|network| self.refresh(*network, mode))).await;
        self.cache.view(&networks)
    }

    fn publish_gauges(&self) {
        let snapshot = self.status.snapshot();
        let failing = snapshot
            .networks
            .values()
            .filter(|status| status.state == FetchState::FetchFailed)
            .count();
        let tracked = self.endpoints.len() as f64;
        self.status.set_gauges(vec![
            StatusGauge {
                label: "cached_networks".to_string(),
                value: self.cache.len() as f64,
                max: Some(tracked),
                unit: None,
                details: None,
            },
            StatusGauge {
                label: "failing_networks".to_string(),
                value: failing as f64,
                max: Some(tracked),
                unit: None,
                details: None,
            },
        ]);
    }
}
