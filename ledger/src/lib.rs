//! Ledger scanning library.
//!
//! The crate exposes:
//! - [`LedgerScanner`]: resolves the validated head and walks a window of ledgers below it.
//! - [`LedgerScan`]: transactions collected from the fetched ledgers, plus the ones that failed.
//! - [`TransactionRecord`]: result code and transaction type extraction from raw transactions.
//! - [`LedgerWindow`]: the inclusive `start..=latest` range being scanned.

pub mod config;
pub mod error;
pub mod record;
pub mod scanner;
pub mod window;

pub use config::ScanConfig;
pub use error::{Result, ScanError};
pub use record::TransactionRecord;
pub use scanner::{FailedLedger, LedgerRequester, LedgerScan, LedgerScanner};
pub use window::{LedgerIndex, LedgerWindow};
