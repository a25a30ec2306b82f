// Copyright (c) James Kassemi, SC, US. All rights reserved.
use serde::{Serialize, Serializer};

pub const LEDGER_STREAM: &str = "ledger";

/// Which ledger a `ledger` command addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerSelector {
    Validated,
    Index(u64),
}

impl Serialize for LedgerSelector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            LedgerSelector::Validated => serializer.serialize_str("validated"),
            LedgerSelector::Index(index) => serializer.serialize_u64(*index),
        }
    }
}

/// Commands issued to a ledger node. The client adds the `id` field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    Ledger {
        ledger_index: LedgerSelector,
        #[serde(skip_serializing_if = "Option::is_none")]
        transactions: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        expand: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        binary: Option<bool>,
    },
    Subscribe {
        streams: Vec<String>,
    },
}

impl Command {
    /// Head lookup; the response carries `result.ledger_index`.
    pub fn validated_ledger() -> Self {
        Command::Ledger {
            ledger_index: LedgerSelector::Validated,
            transactions: None,
            expand: None,
            binary: None,
        }
    }

    /// One ledger with its transactions expanded as JSON.
    pub fn ledger_transactions(index: u64) -> Self {
        Command::Ledger {
            ledger_index: LedgerSelector::Index(index),
            transactions: Some(true),
            expand: Some(true),
            binary: Some(false),
        }
    }

    pub fn subscribe_ledger_stream() -> Self {
        Command::Subscribe {
            streams: vec![LEDGER_STREAM.to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn head_lookup_shape() {
        let value = serde_json::to_value(Command::validated_ledger()).unwrap();
        assert_eq!(
            value,
            json!({"command": "ledger", "ledger_index": "validated"})
        );
    }

    #[test]
    fn ledger_fetch_shape() {
        let value = serde_json::to_value(Command::ledger_transactions(88_000_123)).unwrap();
        assert_eq!(
            value,
            json!({
                "command": "ledger",
                "ledger_index": 88_000_123,
                "transactions": true,
                "expand": true,
                "binary": false
            })
        );
    }

    #[test]
    fn subscribe_shape() {
        let value = serde_json::to_value(Command::subscribe_ledger_stream()).unwrap();
        assert_eq!(value, json!({"command": "subscribe", "streams": ["ledger"]}));
    }
}
