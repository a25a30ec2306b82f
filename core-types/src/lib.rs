// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Shared data model, configuration, status surface, and retry policy for the
//! ledger statistics engine.

pub mod config;
pub mod retry;
pub mod status;
pub mod types;

pub use config::AppConfig;
pub use types::{
    NetworkEndpoint, NetworkId, RankedEntry, RefreshMode, Snapshot, TransactionStats,
    UNKNOWN_LABEL,
};
