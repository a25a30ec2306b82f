// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Frequency aggregation of ledger transactions by result code and type.

use core_types::{RankedEntry, TransactionStats};
use indexmap::IndexMap;
use ledger::TransactionRecord;
use log::trace;

/// Label counts kept in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct FrequencyTable {
    counts: IndexMap<String, u64>,
    total: u64,
}

impl FrequencyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, label: &str) {
        match self.counts.get_mut(label) {
            Some(count) => *count += 1,
            None => {
                self.counts.insert(label.to_string(), 1);
            }
        }
        self.total += 1;
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn distinct(&self) -> usize {
        self.counts.len()
    }

    pub fn count(&self, label: &str) -> u64 {
        self.counts.get(label).copied().unwrap_or(0)
    }

    /// Descending by count. Equal counts keep first-seen order.
    pub fn ranked(&self) -> Vec<RankedEntry> {
        let mut entries: Vec<RankedEntry> = self
            .counts
            .iter()
            .map(|(label, &count)| RankedEntry {
                label: label.clone(),
                count,
                share: share_of(count, self.total),
            })
            .collect();
        entries.sort_by(|a, b| b.count.cmp(&a.count));
        entries
    }

    /// Mean count per distinct label, 0 when empty.
    pub fn average(&self) -> f64 {
        if self.counts.is_empty() {
            0.0
        } else {
            self.total as f64 / self.counts.len() as f64
        }
    }
}

fn share_of(count: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        100.0 * count as f64 / total as f64
    }
}

/// Streaming aggregator; each transaction is classified exactly once.
#[derive(Debug, Clone, Default)]
pub struct TransactionAggregator {
    result_codes: FrequencyTable,
    transaction_types: FrequencyTable,
}

impl TransactionAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ingest(&mut self, record: &TransactionRecord) {
        self.result_codes.record(record.result_code());
        self.transaction_types.record(record.transaction_type());
    }

    pub fn extend<'a, I>(&mut self, records: I)
    where
        I: IntoIterator<Item = &'a TransactionRecord>,
    {
        for record in records {
            self.ingest(record);
        }
    }

    pub fn result_codes(&self) -> &FrequencyTable {
        &self.result_codes
    }

    pub fn transaction_types(&self) -> &FrequencyTable {
        &self.transaction_types
    }

    pub fn finish(&self) -> TransactionStats {
        let result_codes = self.result_codes.ranked();
        let transaction_types = self.transaction_types.ranked();
        let stats = TransactionStats {
            most_common_result_code: result_codes.first().map(|entry| entry.label.clone()),
            most_common_transaction_type: transaction_types
                .first()
                .map(|entry| entry.label.clone()),
            total_transactions: self.result_codes.total(),
            average_per_result_code: self.result_codes.average(),
            average_per_transaction_type: self.transaction_types.average(),
            result_codes,
            transaction_types,
        };
        trace!(
            "aggregated {} transactions into {} result codes, {} types",
            stats.total_transactions,
            stats.result_codes.len(),
            stats.transaction_types.len()
        );
        stats
    }
}

/// Aggregates a batch of transactions in one pass.
pub fn aggregate<'a, I>(records: I) -> TransactionStats
where
    I: IntoIterator<Item = &'a TransactionRecord>,
{
    let mut aggregator = TransactionAggregator::new();
    aggregator.extend(records);
    aggregator.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::UNKNOWN_LABEL;
    use serde_json::json;

    fn tx(kind: &str, result: &str) -> TransactionRecord {
        TransactionRecord::new(json!({
            "TransactionType": kind,
            "meta": {"TransactionResult": result},
        }))
    }

    fn labels(entries: &[RankedEntry]) -> Vec<&str> {
        entries.iter().map(|entry| entry.label.as_str()).collect()
    }

    #[test]
    fn ranks_result_codes_with_shares() {
        let records = vec![
            tx("Payment", "tesSUCCESS"),
            tx("Payment", "tesSUCCESS"),
            tx("Payment", "tecNO_DST"),
        ];
        let stats = aggregate(&records);

        assert_eq!(stats.total_transactions, 3);
        assert_eq!(labels(&stats.result_codes), vec!["tesSUCCESS", "tecNO_DST"]);
        assert_eq!(stats.result_codes[0].count, 2);
        assert!((stats.result_codes[0].share - 66.666).abs() < 0.01);
        assert!((stats.result_codes[1].share - 33.333).abs() < 0.01);
        assert_eq!(stats.most_common_result_code.as_deref(), Some("tesSUCCESS"));
        assert_eq!(stats.average_per_result_code, 1.5);

        assert_eq!(labels(&stats.transaction_types), vec!["Payment"]);
        assert_eq!(stats.transaction_types[0].share, 100.0);
        assert_eq!(stats.average_per_transaction_type, 3.0);
    }

    #[test]
    fn ties_keep_first_seen_order() {
        let records = vec![
            tx("OfferCreate", "tecKILLED"),
            tx("Payment", "tesSUCCESS"),
            tx("TrustSet", "tecPATH_DRY"),
            tx("Payment", "tesSUCCESS"),
            tx("OfferCreate", "tecKILLED"),
        ];
        let stats = aggregate(&records);
        assert_eq!(
            labels(&stats.result_codes),
            vec!["tecKILLED", "tesSUCCESS", "tecPATH_DRY"]
        );
        assert_eq!(
            labels(&stats.transaction_types),
            vec!["OfferCreate", "Payment", "TrustSet"]
        );
        assert_eq!(stats.most_common_transaction_type.as_deref(), Some("OfferCreate"));
    }

    #[test]
    fn shares_sum_to_one_hundred() {
        let codes = [
            "tesSUCCESS",
            "tecNO_DST",
            "tecPATH_DRY",
            "tefPAST_SEQ",
            "tecKILLED",
            "tesSUCCESS",
            "tecUNFUNDED",
        ];
        let records: Vec<_> = codes.iter().map(|code| tx("Payment", code)).collect();
        let stats = aggregate(&records);
        let sum: f64 = stats.result_codes.iter().map(|entry| entry.share).sum();
        assert!((sum - 100.0).abs() < 1e-9);
        let counted: u64 = stats.result_codes.iter().map(|entry| entry.count).sum();
        assert_eq!(counted, stats.total_transactions);
    }

    #[test]
    fn missing_fields_count_as_unknown() {
        let records = vec![
            TransactionRecord::new(json!({"hash": "AA"})),
            tx("Payment", "tesSUCCESS"),
        ];
        let stats = aggregate(&records);
        assert_eq!(stats.total_transactions, 2);
        let mut aggregator = TransactionAggregator::new();
        aggregator.extend(&records);
        assert_eq!(aggregator.result_codes().count(UNKNOWN_LABEL), 1);
        assert_eq!(aggregator.transaction_types().count(UNKNOWN_LABEL), 1);
        assert_eq!(aggregator.transaction_types().total(), aggregator.result_codes().total());
    }

    #[test]
    fn empty_input_yields_zeroed_stats() {
        let stats = aggregate(std::iter::empty());
        assert_eq!(stats, TransactionStats::default());
        assert!(stats.most_common_result_code.is_none());
        assert_eq!(stats.average_per_result_code, 0.0);
    }
}
