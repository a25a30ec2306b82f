// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Ledger stats service: keeps a per-network transaction statistics snapshot
//! fresh, either on a historical timer or driven by live ledger closes.

pub mod cache;
pub mod error;
pub mod fetch;
pub mod metrics;
mod refresh;
mod schedule;

use std::{collections::BTreeMap, sync::Arc};

use core_types::{
    config::AppConfig,
    status::{FetchState, ServiceStatusHandle, ServiceStatusSnapshot},
    NetworkId, RefreshMode, Snapshot,
};
use ledger::ScanConfig;
use log::info;
use parking_lot::Mutex;

pub use error::FetchError;
pub use fetch::{LedgerCloseStream, LedgerFetcher, WsLedgerFetcher};
pub use metrics::{RefreshMetrics, RefreshMetricsSnapshot};

use refresh::Refresher;
use schedule::RefreshSchedule;

/// Owns the snapshot cache and the active refresh schedule.
///
/// Mode changes spawn tasks, so they must be made from inside a tokio
/// runtime. Dropping the service tears the schedule down.
pub struct LedgerStatsService {
    refresher: Arc<Refresher>,
    schedule: Mutex<RefreshSchedule>,
}

impl LedgerStatsService {
    pub fn new(config: &AppConfig) -> Self {
        let fetcher = WsLedgerFetcher::new(ScanConfig::from(&config.scan));
        Self::with_fetcher(config, Arc::new(fetcher))
    }

    pub fn with_fetcher(config: &AppConfig, fetcher: Arc<dyn LedgerFetcher>) -> Self {
        Self {
            refresher: Arc::new(Refresher::new(config, fetcher)),
            schedule: Mutex::new(RefreshSchedule::Idle),
        }
    }

    pub fn handle(&self) -> LedgerStatsHandle {
        LedgerStatsHandle {
            refresher: Arc::clone(&self.refresher),
        }
    }

    /// Installs the schedule for the configured default mode.
    pub fn start(&self) {
        self.set_mode(self.mode());
    }

    /// Replaces the schedule for every tracked network. Re-selecting the
    /// mode that is already running keeps the current schedule.
    pub fn set_mode(&self, mode: RefreshMode) {
        let mut schedule = self.schedule.lock();
        *self.refresher.mode.write() = mode;
        if schedule.mode() == Some(mode) && schedule.is_running() {
            return;
        }
        info!("refresh mode set to {mode}");
        schedule.transition(RefreshSchedule::install(Arc::clone(&self.refresher), mode));
    }

    pub fn mode(&self) -> RefreshMode {
        *self.refresher.mode.read()
    }

    /// Whether a schedule is currently installed and running.
    pub fn is_scheduled(&self) -> bool {
        self.schedule.lock().is_running()
    }

    /// Changes which network the `active_*` accessors answer for. Does not
    /// fetch.
    pub fn select_network(&self, network: NetworkId) {
        *self.refresher.active_network.write() = network;
    }

    pub fn active_network(&self) -> NetworkId {
        *self.refresher.active_network.read()
    }

    pub fn current_snapshot(&self, network: NetworkId) -> Option<Arc<Snapshot>> {
        self.refresher.cache.get(network)
    }

    pub fn active_snapshot(&self) -> Option<Arc<Snapshot>> {
        self.current_snapshot(self.active_network())
    }

    /// Fetches every network concurrently with the active mode's window and
    /// returns the cache afterwards. Failed networks keep their prior entry.
    pub async fn force_refresh_all(&self) -> BTreeMap<NetworkId, Option<Arc<Snapshot>>> {
        self.refresher.refresh_all(self.mode()).await
    }

    pub async fn refresh_network(&self, network: NetworkId) -> Result<Arc<Snapshot>, FetchError> {
        self.refresher.refresh(network, self.mode()).await
    }

    /// Most recent failure for the active network, cleared by its next success.
    pub fn last_error(&self) -> Option<String> {
        self.handle().last_error()
    }

    pub fn status(&self) -> ServiceStatusSnapshot {
        self.refresher.status.snapshot()
    }

    pub fn status_handle(&self) -> ServiceStatusHandle {
        self.refresher.status.clone()
    }

    pub fn metrics(&self) -> RefreshMetricsSnapshot {
        self.refresher.metrics.snapshot()
    }

    /// Stops the schedule. In-flight fetches still complete and commit.
    pub fn shutdown(&self) {
        let mut schedule = self.schedule.lock();
        if schedule.mode().is_some() {
            info!("refresh schedule stopped");
        }
        schedule.teardown();
    }
}

/// Cheap read-only view for presentation code.
#[derive(Clone)]
pub struct LedgerStatsHandle {
    refresher: Arc<Refresher>,
}

impl LedgerStatsHandle {
    pub fn networks(&self) -> Vec<NetworkId> {
        self.refresher.networks()
    }

    pub fn mode(&self) -> RefreshMode {
        *self.refresher.mode.read()
    }

    pub fn active_network(&self) -> NetworkId {
        *self.refresher.active_network.read()
    }

    pub fn current_snapshot(&self, network: NetworkId) -> Option<Arc<Snapshot>> {
        self.refresher.cache.get(network)
    }

    pub fn active_snapshot(&self) -> Option<Arc<Snapshot>> {
        self.current_snapshot(self.active_network())
    }

    pub fn snapshots(&self) -> BTreeMap<NetworkId, Option<Arc<Snapshot>>> {
        self.refresher.cache.view(&self.refresher.networks())
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error_for(self.active_network())
    }

    pub fn last_error_for(&self, network: NetworkId) -> Option<String> {
        self.refresher.status.last_error(network)
    }

    /// One-line description of the active network's state.
    pub fn status_line(&self) -> String {
        let network = self.active_network();
        let status = self.refresher.status.network(network);
        match (status.state, status.last_error) {
            (FetchState::FetchFailed, Some(error)) => format!("{}: error: {error}", network.label()),
            (FetchState::Fetching, _) => format!("{}: fetching", network.label()),
            (_, _) => match self.current_snapshot(network) {
                Some(snapshot) => format!(
                    "{}: ledgers {} updated {}",
                    network.label(),
                    snapshot.ledger_range,
                    snapshot.timestamp.format("%H:%M:%S")
                ),
                None => format!("{}: waiting for data", network.label()),
            },
        }
    }

    pub fn status(&self) -> ServiceStatusSnapshot {
        self.refresher.status.snapshot()
    }

    pub fn metrics(&self) -> RefreshMetricsSnapshot {
        self.refresher.metrics.snapshot()
    }
}
