// Copyright (c) James Kassemi, SC, US. All rights reserved.
use std::time::Duration;

use thiserror::Error;
use ws_source::ClientError;

pub type Result<T> = std::result::Result<T, ScanError>;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("invalid response: missing or malformed {field}")]
    InvalidResponse { field: &'static str },
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

impl ScanError {
    /// Errors worth retrying on the same connection.
    pub fn is_transient(&self) -> bool {
        matches!(self, ScanError::Client(ClientError::Server { .. }) | ScanError::Timeout(_))
    }
}
