// Copyright (c) James Kassemi, SC, US. All rights reserved.
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ClientError;

pub const LEDGER_CLOSED_TYPE: &str = "ledgerClosed";
const FALLBACK_ERROR_MESSAGE: &str = "Unknown error";

/// Push notification emitted by a node when a ledger closes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerClosed {
    pub ledger_index: u64,
    pub ledger_hash: Option<String>,
    pub txn_count: Option<u64>,
}

/// Classification of one inbound text frame.
#[derive(Debug)]
pub(crate) enum Inbound {
    Response {
        id: u64,
        outcome: Result<Value, ClientError>,
    },
    LedgerClosed(LedgerClosed),
    /// Valid JSON that is neither a correlated response nor a ledger close.
    Ignored(Option<String>),
    Malformed(String),
}

/// Reads a ledger index that may be encoded as a JSON integer or a numeric
/// string.
pub fn ledger_index_from(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn parse_inbound(text: &str) -> Inbound {
    let message: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(err) => return Inbound::Malformed(format!("invalid json: {err}")),
    };
    if !message.is_object() {
        return Inbound::Malformed("message is not an object".to_string());
    }

    if let Some(id) = message.get("id").and_then(Value::as_u64) {
        let outcome = match message.get("error") {
            Some(error) if !error.is_null() => Err(ClientError::Server {
                message: server_error_message(&message, error),
            }),
            _ => Ok(message),
        };
        return Inbound::Response { id, outcome };
    }

    let kind = message.get("type").and_then(Value::as_str);
    if kind == Some(LEDGER_CLOSED_TYPE) {
        return match message.get("ledger_index").and_then(ledger_index_from) {
            Some(ledger_index) => Inbound::LedgerClosed(LedgerClosed {
                ledger_index,
                ledger_hash: message
                    .get("ledger_hash")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                txn_count: message.get("txn_count").and_then(Value::as_u64),
            }),
            None => Inbound::Malformed("ledgerClosed without a usable ledger_index".to_string()),
        };
    }
    Inbound::Ignored(kind.map(str::to_string))
}

/// Accepts both `{"error": {"error_message": ..}}` and the flat rippled form
/// `{"error": "code", "error_message": ..}`.
fn server_error_message(message: &Value, error: &Value) -> String {
    if let Some(text) = error.get("error_message").and_then(Value::as_str) {
        return text.to_string();
    }
    if let Some(text) = message.get("error_message").and_then(Value::as_str) {
        return text.to_string();
    }
    match error {
        Value::String(code) => code.clone(),
        _ => FALLBACK_ERROR_MESSAGE.to_string(),
    }
}
