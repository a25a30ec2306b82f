// Copyright (c) James Kassemi, SC, US. All rights reserved.
use std::{collections::BTreeMap, sync::Arc, time::Duration};

use core_types::{NetworkId, RefreshMode};
use log::{debug, info, warn};
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::refresh::Refresher;

/// Active scheduling strategy. Replacing it always cancels the previous
/// variant's tasks first; fetches those tasks already started run on.
pub(crate) enum RefreshSchedule {
    Idle,
    Periodic {
        interval: Duration,
        cancel: CancellationToken,
        task: JoinHandle<()>,
    },
    EventDriven {
        cancel: CancellationToken,
        subscriptions: BTreeMap<NetworkId, JoinHandle<()>>,
    },
}

impl RefreshSchedule {
    /// Timer that fires immediately, then every `interval`.
    pub fn periodic(refresher: Arc<Refresher>, interval: Duration) -> Self {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_periodic(refresher, interval, cancel.clone()));
        RefreshSchedule::Periodic {
            interval,
            cancel,
            task,
        }
    }

    /// One long-lived subscription per network.
    pub fn event_driven(refresher: Arc<Refresher>) -> Self {
        let cancel = CancellationToken::new();
        let subscriptions = refresher
            .networks()
            .into_iter()
            .map(|network| {
                let task = tokio::spawn(run_live(
                    Arc::clone(&refresher),
                    network,
                    cancel.child_token(),
                ));
                (network, task)
            })
            .collect();
        RefreshSchedule::EventDriven {
            cancel,
            subscriptions,
        }
    }

    pub fn install(refresher: Arc<Refresher>, mode: RefreshMode) -> Self {
        match mode {
            RefreshMode::Historical => {
                let interval = refresher.settings.historical_interval;
                Self::periodic(refresher, interval)
            }
            RefreshMode::Live => Self::event_driven(refresher),
        }
    }

    pub fn mode(&self) -> Option<RefreshMode> {
        match self {
            RefreshSchedule::Idle => None,
            RefreshSchedule::Periodic { .. } => Some(RefreshMode::Historical),
            RefreshSchedule::EventDriven { .. } => Some(RefreshMode::Live),
        }
    }

    /// Whether any task of the current variant is still running.
    pub fn is_running(&self) -> bool {
        match self {
            RefreshSchedule::Idle => false,
            RefreshSchedule::Periodic { task, .. } => !task.is_finished(),
            RefreshSchedule::EventDriven { subscriptions, .. } => {
                subscriptions.values().any(|task| !task.is_finished())
            }
        }
    }

    /// Tears down the current variant, then installs `next`.
    pub fn transition(&mut self, next: RefreshSchedule) {
        self.teardown();
        *self = next;
    }

    pub fn teardown(&mut self) {
        let previous = std::mem::replace(self, RefreshSchedule::Idle);
        match &previous {
            RefreshSchedule::Idle => {}
            RefreshSchedule::Periodic { interval, .. } => {
                debug!("stopping periodic refresh every {interval:?}");
            }
            RefreshSchedule::EventDriven { subscriptions, .. } => {
                debug!("stopping {} live subscriptions", subscriptions.len());
            }
        }
        drop(previous);
    }

    fn cancel(&self) {
        match self {
            RefreshSchedule::Idle => {}
            RefreshSchedule::Periodic { cancel, .. } | RefreshSchedule::EventDriven { cancel, .. } => {
                cancel.cancel()
            }
        }
    }
}

impl Drop for RefreshSchedule {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn run_periodic(refresher: Arc<Refresher>, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!("historical refresh every {interval:?}");
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                refresher.refresh_all(RefreshMode::Historical).await;
            }
        }
    }
    debug!("periodic refresh stopped");
}

enum LiveEnd {
    Cancelled,
    SubscribeFailed,
    Lost,
    Idle(Duration),
}

/// Keeps one subscription open for `network`, reconnecting with backoff, and
/// spawns a single-ledger refresh for every ledger close.
async fn run_live(refresher: Arc<Refresher>, network: NetworkId, cancel: CancellationToken) {
    let endpoint = match refresher.endpoint(network) {
        Ok(endpoint) => endpoint.clone(),
        Err(err) => {
            warn!("live refresh not started: {err}");
            return;
        }
    };
    let reconnect = refresher.settings.reconnect.clone();
    let idle_timeout = refresher.settings.live_idle_timeout;
    let warning_prefix = format!("[{}] ", endpoint.name);
    let mut attempt = 0usize;

    loop {
        let subscribed = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            subscribed = refresher.fetcher.subscribe(&endpoint) => subscribed,
        };

        let ended = match subscribed {
            Ok(mut stream) => {
                attempt = 0;
                refresher
                    .status
                    .clear_warnings_matching(|w| w.starts_with(&warning_prefix));
                info!("[{}] subscribed to ledger stream", endpoint.name);
                let ended = loop {
                    let next = async {
                        match idle_timeout {
                            Some(limit) => tokio::time::timeout(limit, stream.next_close())
                                .await
                                .map_err(|_| limit),
                            None => Ok(stream.next_close().await),
                        }
                    };
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break LiveEnd::Cancelled,
                        next = next => match next {
                            Ok(Some(event)) => {
                                refresher.metrics.inc_ledger_closes();
                                debug!("[{}] ledger {} closed", endpoint.name, event.ledger_index);
                                let refresher = Arc::clone(&refresher);
                                tokio::spawn(async move {
                                    let _ = refresher.refresh(network, RefreshMode::Live).await;
                                });
                            }
                            Ok(None) => break LiveEnd::Lost,
                            Err(limit) => break LiveEnd::Idle(limit),
                        },
                    }
                };
                stream.close().await;
                ended
            }
            Err(err) => {
                refresher.metrics.inc_subscription_failures();
                refresher
                    .status
                    .record_error(network, format!("live subscription failed: {err}"));
                refresher
                    .status
                    .push_warning(format!("{warning_prefix}live subscription unavailable"));
                warn!("[{}] live subscription failed: {err}", endpoint.name);
                LiveEnd::SubscribeFailed
            }
        };

        match ended {
            LiveEnd::Cancelled => break,
            LiveEnd::SubscribeFailed => {}
            LiveEnd::Lost => {
                refresher
                    .status
                    .record_error(network, "live subscription lost");
                refresher
                    .status
                    .push_warning(format!("{warning_prefix}live subscription lost"));
                warn!("[{}] ledger stream ended", endpoint.name);
            }
            LiveEnd::Idle(limit) => {
                warn!(
                    "[{}] no ledger closed within {limit:?}; resubscribing",
                    endpoint.name
                );
            }
        }

        let delay = reconnect.backoff_delay(attempt);
        attempt = attempt.saturating_add(1);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }
    refresher
        .status
        .clear_warnings_matching(|w| w.starts_with(&warning_prefix));
    debug!("[{}] live refresh stopped", endpoint.name);
}
