// Copyright (c) James Kassemi, SC, US. All rights reserved.
use core_types::UNKNOWN_LABEL;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Metadata containers checked for a result code, in precedence order.
const META_CONTAINERS: [&str; 2] = ["meta", "metaData"];
const RESULT_FIELDS: [&str; 2] = ["TransactionResult", "transaction_result"];
const TYPE_FIELD: &str = "TransactionType";

/// One expanded transaction as returned by a `ledger` command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionRecord(Value);

impl TransactionRecord {
    pub fn new(raw: Value) -> Self {
        Self(raw)
    }

    /// First string found at `meta.TransactionResult`,
    /// `meta.transaction_result`, `metaData.TransactionResult`,
    /// `metaData.transaction_result`; otherwise `"Unknown"`.
    pub fn result_code(&self) -> &str {
        META_CONTAINERS
            .iter()
            .filter_map(|container| self.0.get(container))
            .flat_map(|meta| RESULT_FIELDS.iter().filter_map(move |field| meta.get(field)))
            .find_map(Value::as_str)
            .unwrap_or(UNKNOWN_LABEL)
    }

    /// Top-level `TransactionType`, then `tx.TransactionType`, otherwise
    /// `"Unknown"`.
    pub fn transaction_type(&self) -> &str {
        self.0
            .get(TYPE_FIELD)
            .and_then(Value::as_str)
            .or_else(|| {
                self.0
                    .get("tx")
                    .and_then(|tx| tx.get(TYPE_FIELD))
                    .and_then(Value::as_str)
            })
            .unwrap_or(UNKNOWN_LABEL)
    }
}
