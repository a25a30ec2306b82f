// Copyright (c) James Kassemi, SC, US. All rights reserved.
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to connect to {url}: {source}")]
    Connection {
        url: String,
        #[source]
        source: Box<tokio_tungstenite::tungstenite::Error>,
    },
    #[error("not connected")]
    NotConnected,
    #[error("connection lost")]
    ConnectionLost,
    #[error("server error: {message}")]
    Server { message: String },
    #[error("failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("command must serialize to a JSON object")]
    InvalidCommand,
}

impl ClientError {
    /// Whether the socket is gone; further requests on the same client will
    /// fail the same way.
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            ClientError::Connection { .. } | ClientError::NotConnected | ClientError::ConnectionLost
        )
    }
}
