// Copyright (c) James Kassemi, SC, US. All rights reserved.
use std::time::Duration;

use core_types::NetworkId;
use ledger::ScanError;
use thiserror::Error;
use ws_source::ClientError;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),
    #[error("no endpoint configured for {0}")]
    UnknownNetwork(NetworkId),
}
