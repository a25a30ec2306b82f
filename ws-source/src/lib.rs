// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Websocket transport for ledger nodes: request/response correlation over a
//! single socket plus routing of unsolicited ledger-close events.

use std::sync::Once;

pub mod client;
pub mod command;
pub mod error;
pub mod protocol;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use client::LedgerClient;
pub use command::{Command, LedgerSelector};
pub use error::ClientError;
pub use protocol::{ledger_index_from, LedgerClosed};

static TLS_PROVIDER_ONCE: Once = Once::new();

fn ensure_tls_provider() {
    TLS_PROVIDER_ONCE.call_once(|| {
        // Another component may already have installed a process-wide provider.
        if rustls::crypto::ring::default_provider()
            .install_default()
            .is_err()
        {
            log::debug!("rustls crypto provider already installed");
        }
    });
}

pub(crate) use ensure_tls_provider as install_rustls_provider;
