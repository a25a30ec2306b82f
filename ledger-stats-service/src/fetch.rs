// Copyright (c) James Kassemi, SC, US. All rights reserved.
use aggregations::aggregate;
use async_trait::async_trait;
use chrono::Utc;
use core_types::{NetworkEndpoint, RefreshMode, Snapshot, TransactionStats};
use ledger::{LedgerScan, LedgerScanner, ScanConfig};
use log::{debug, warn};
use tokio::sync::mpsc;
use ws_source::{LedgerClient, LedgerClosed};

use crate::error::FetchError;

/// Produces snapshots and ledger-close subscriptions for one endpoint at a
/// time. Every call owns its own connection.
#[async_trait]
pub trait LedgerFetcher: Send + Sync + 'static {
    async fn fetch(
        &self,
        endpoint: &NetworkEndpoint,
        count: u32,
        mode: RefreshMode,
    ) -> Result<Snapshot, FetchError>;

    async fn subscribe(
        &self,
        endpoint: &NetworkEndpoint,
    ) -> Result<Box<dyn LedgerCloseStream>, FetchError>;
}

/// An open ledger-close subscription.
#[async_trait]
pub trait LedgerCloseStream: Send {
    /// `None` once the subscription has ended.
    async fn next_close(&mut self) -> Option<LedgerClosed>;

    async fn close(self: Box<Self>);
}

pub fn build_snapshot(
    endpoint: &NetworkEndpoint,
    mode: RefreshMode,
    scan: &LedgerScan,
    stats: TransactionStats,
) -> Snapshot {
    Snapshot {
        network: endpoint.id,
        network_label: endpoint.name.clone(),
        mode,
        stats,
        latest_ledger_index: scan.window.latest,
        ledger_range: scan.range_description(),
        ledgers_scanned: scan.fetched.len() as u32,
        ledgers_failed: scan.failed.len() as u32,
        timestamp: Utc::now(),
    }
}

/// Fetcher backed by short-lived websocket clients.
#[derive(Clone, Debug, Default)]
pub struct WsLedgerFetcher {
    scanner: LedgerScanner,
}

impl WsLedgerFetcher {
    pub fn new(config: ScanConfig) -> Self {
        Self {
            scanner: LedgerScanner::new(config),
        }
    }
}

#[async_trait]
impl LedgerFetcher for WsLedgerFetcher {
    async fn fetch(
        &self,
        endpoint: &NetworkEndpoint,
        count: u32,
        mode: RefreshMode,
    ) -> Result<Snapshot, FetchError> {
        let client = LedgerClient::new(endpoint.clone());
        client.connect().await?;
        let scan = self.scanner.scan_window(&client, count).await;
        client.disconnect().await;
        let scan = scan?;

        let stats = aggregate(&scan.transactions);
        debug!(
            "[{}] aggregated {} transactions from {}",
            endpoint.name,
            stats.total_transactions,
            scan.range_description()
        );
        Ok(build_snapshot(endpoint, mode, &scan, stats))
    }

    async fn subscribe(
        &self,
        endpoint: &NetworkEndpoint,
    ) -> Result<Box<dyn LedgerCloseStream>, FetchError> {
        let client = LedgerClient::new(endpoint.clone());
        client.connect().await?;
        let (events_tx, events) = mpsc::unbounded_channel();
        let subscribed = client
            .subscribe_ledger_closed(move |event| {
                let _ = events_tx.send(event);
            })
            .await;
        if let Err(err) = subscribed {
            warn!("[{}] ledger stream subscription failed: {err}", endpoint.name);
            client.disconnect().await;
            return Err(err.into());
        }
        Ok(Box::new(WsCloseStream { client, events }))
    }
}

/// Ends when the client's session tears down and drops the event handler.
struct WsCloseStream {
    client: LedgerClient,
    events: mpsc::UnboundedReceiver<LedgerClosed>,
}

#[async_trait]
impl LedgerCloseStream for WsCloseStream {
    async fn next_close(&mut self) -> Option<LedgerClosed> {
        self.events.recv().await
    }

    async fn close(self: Box<Self>) {
        self.client.disconnect().await;
    }
}
