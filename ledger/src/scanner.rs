// Copyright (c) James Kassemi, SC, US. All rights reserved.
use async_trait::async_trait;
use log::{debug, warn};
use serde_json::Value;
use ws_source::{ledger_index_from, ClientError, Command, LedgerClient};

use crate::{
    config::ScanConfig,
    error::{Result, ScanError},
    record::TransactionRecord,
    window::{LedgerIndex, LedgerWindow},
};

const HEAD_INDEX_FIELD: &str = "result.ledger_index";
const TRANSACTIONS_POINTER: &str = "/result/ledger/transactions";

/// Anything that can answer ledger commands. Implemented by [`LedgerClient`].
#[async_trait]
pub trait LedgerRequester: Send + Sync {
    async fn request(&self, command: &Command) -> std::result::Result<Value, ClientError>;

    /// Prefix for log lines.
    fn label(&self) -> &str {
        "ledger"
    }
}

#[async_trait]
impl LedgerRequester for LedgerClient {
    async fn request(&self, command: &Command) -> std::result::Result<Value, ClientError> {
        LedgerClient::request(self, command).await
    }

    fn label(&self) -> &str {
        &self.endpoint().name
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedLedger {
    pub index: LedgerIndex,
    pub error: String,
}

/// Transactions gathered from the ledgers that were fetched successfully.
#[derive(Debug, Clone)]
pub struct LedgerScan {
    pub window: LedgerWindow,
    pub transactions: Vec<TransactionRecord>,
    /// Fetched ledger indices, highest first.
    pub fetched: Vec<LedgerIndex>,
    pub failed: Vec<FailedLedger>,
}

impl LedgerScan {
    fn new(window: LedgerWindow) -> Self {
        Self {
            window,
            transactions: Vec::new(),
            fetched: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// `"{start} to {latest}"` for a complete scan; partial scans name the
    /// fetched bounds and how many of the window's ledgers made it.
    pub fn range_description(&self) -> String {
        if self.is_complete() {
            return self.window.describe();
        }
        match (self.fetched.iter().min(), self.fetched.iter().max()) {
            (Some(low), Some(high)) => format!(
                "{low} to {high} ({} of {} ledgers)",
                self.fetched.len(),
                self.window.len()
            ),
            _ => format!("no ledgers fetched ({})", self.window.describe()),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct LedgerScanner {
    config: ScanConfig,
}

impl LedgerScanner {
    pub fn new(config: ScanConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Index of the most recent validated ledger.
    pub async fn latest_validated_ledger<R>(&self, client: &R) -> Result<LedgerIndex>
    where
        R: LedgerRequester + ?Sized,
    {
        let response = self.timed(client, &Command::validated_ledger()).await?;
        response
            .get("result")
            .and_then(|result| result.get("ledger_index"))
            .and_then(ledger_index_from)
            .filter(|index| *index > 0)
            .ok_or(ScanError::InvalidResponse {
                field: HEAD_INDEX_FIELD,
            })
    }

    /// Walks `count` ledgers down from the validated head. Only a failed head
    /// lookup fails the scan; individual ledgers that cannot be fetched are
    /// recorded in [`LedgerScan::failed`] and skipped.
    pub async fn scan_window<R>(&self, client: &R, count: u32) -> Result<LedgerScan>
    where
        R: LedgerRequester + ?Sized,
    {
        let latest = self.latest_validated_ledger(client).await?;
        let window = LedgerWindow::ending_at(latest, count);
        let mut scan = LedgerScan::new(window);
        let mut indices = window.descending();

        while let Some(index) = indices.next() {
            match self.fetch_ledger(client, index).await {
                Ok(transactions) => {
                    scan.fetched.push(index);
                    scan.transactions.extend(transactions);
                }
                Err(ScanError::Client(err)) if err.is_connection_failure() => {
                    let error = err.to_string();
                    let abandoned: Vec<_> = std::iter::once(index).chain(indices.by_ref()).collect();
                    warn!(
                        "[{}] connection failed at ledger {index}; dropping {} remaining ledgers: {error}",
                        client.label(),
                        abandoned.len()
                    );
                    scan.failed.extend(abandoned.into_iter().map(|index| FailedLedger {
                        index,
                        error: error.clone(),
                    }));
                }
                Err(err) => {
                    warn!("[{}] dropping ledger {index}: {err}", client.label());
                    scan.failed.push(FailedLedger {
                        index,
                        error: err.to_string(),
                    });
                }
            }
        }

        debug!(
            "[{}] scanned {} ({} transactions, {} ledgers failed)",
            client.label(),
            scan.range_description(),
            scan.transactions.len(),
            scan.failed.len()
        );
        Ok(scan)
    }

    /// Expanded transactions of one ledger, retrying transient failures.
    pub async fn fetch_ledger<R>(&self, client: &R, index: LedgerIndex) -> Result<Vec<TransactionRecord>>
    where
        R: LedgerRequester + ?Sized,
    {
        let command = Command::ledger_transactions(index);
        let response = self
            .config
            .ledger_retry
            .retry_async_when(|_| self.timed(client, &command), ScanError::is_transient)
            .await?;
        Ok(transactions_from(response))
    }

    async fn timed<R>(&self, client: &R, command: &Command) -> Result<Value>
    where
        R: LedgerRequester + ?Sized,
    {
        let request = client.request(command);
        match self.config.request_timeout {
            Some(limit) => tokio::time::timeout(limit, request)
                .await
                .map_err(|_| ScanError::Timeout(limit))?
                .map_err(ScanError::from),
            None => request.await.map_err(ScanError::from),
        }
    }
}

/// A ledger without a transaction list (or with unexpanded entries) yields
/// no records.
fn transactions_from(mut response: Value) -> Vec<TransactionRecord> {
    match response.pointer_mut(TRANSACTIONS_POINTER).map(Value::take) {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter(|item| item.is_object())
            .map(TransactionRecord::new)
            .collect(),
        _ => Vec::new(),
    }
}
