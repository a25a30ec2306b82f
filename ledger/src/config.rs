// Copyright (c) James Kassemi, SC, US. All rights reserved.
use std::time::Duration;

use core_types::{config::ScanSettings, retry::RetryPolicy};

#[derive(Clone, Debug)]
pub struct ScanConfig {
    /// Bound on each individual request; `None` waits indefinitely.
    pub request_timeout: Option<Duration>,
    /// Applied per ledger fetch; the head lookup is never retried.
    pub ledger_retry: RetryPolicy,
}

impl ScanConfig {
    pub fn new(request_timeout: Option<Duration>, ledger_retry: RetryPolicy) -> Self {
        Self {
            request_timeout,
            ledger_retry,
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::from(&ScanSettings::default())
    }
}

impl From<&ScanSettings> for ScanConfig {
    fn from(settings: &ScanSettings) -> Self {
        Self::new(settings.request_timeout(), settings.ledger_retry_policy())
    }
}
