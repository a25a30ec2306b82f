// Copyright (c) James Kassemi, SC, US. All rights reserved.
use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use core_types::{NetworkId, Snapshot};
use parking_lot::RwLock;

/// Issued when a fetch starts. A commit only lands if no fetch issued later
/// for the same network has committed first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    network: NetworkId,
    seq: u64,
}

struct CacheEntry {
    seq: u64,
    snapshot: Arc<Snapshot>,
}

/// Latest snapshot per network. Readers get shared immutable references.
#[derive(Default)]
pub struct SnapshotCache {
    next_seq: AtomicU64,
    entries: RwLock<HashMap<NetworkId, CacheEntry>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ticket(&self, network: NetworkId) -> FetchTicket {
        FetchTicket {
            network,
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed) + 1,
        }
    }

    /// Returns false when the ticket was superseded and the snapshot dropped.
    pub fn commit(&self, ticket: FetchTicket, snapshot: Arc<Snapshot>) -> bool {
        let mut entries = self.entries.write();
        match entries.get(&ticket.network) {
            Some(entry) if entry.seq > ticket.seq => false,
            _ => {
                entries.insert(
                    ticket.network,
                    CacheEntry {
                        seq: ticket.seq,
                        snapshot,
                    },
                );
                true
            }
        }
    }

    pub fn get(&self, network: NetworkId) -> Option<Arc<Snapshot>> {
        self.entries
            .read()
            .get(&network)
            .map(|entry| Arc::clone(&entry.snapshot))
    }

    /// One entry per requested network, `None` where nothing is cached.
    pub fn view(&self, networks: &[NetworkId]) -> BTreeMap<NetworkId, Option<Arc<Snapshot>>> {
        let entries = self.entries.read();
        networks
            .iter()
            .map(|network| {
                let snapshot = entries.get(network).map(|entry| Arc::clone(&entry.snapshot));
                (*network, snapshot)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use core_types::{RefreshMode, TransactionStats};

    fn snapshot(network: NetworkId, latest: u64) -> Arc<Snapshot> {
        Arc::new(Snapshot {
            network,
            network_label: network.label().to_string(),
            mode: RefreshMode::Historical,
            stats: TransactionStats::default(),
            latest_ledger_index: latest,
            ledger_range: format!("{latest} to {latest}"),
            ledgers_scanned: 1,
            ledgers_failed: 0,
            timestamp: Utc::now(),
        })
    }

    #[test]
    fn stale_commit_is_discarded() {
        let cache = SnapshotCache::new();
        let older = cache.ticket(NetworkId::Xrpl);
        let newer = cache.ticket(NetworkId::Xrpl);

        assert!(cache.commit(newer, snapshot(NetworkId::Xrpl, 20)));
        assert!(!cache.commit(older, snapshot(NetworkId::Xrpl, 10)));
        assert_eq!(cache.get(NetworkId::Xrpl).unwrap().latest_ledger_index, 20);
    }

    #[test]
    fn older_ticket_commits_when_newer_never_did() {
        let cache = SnapshotCache::new();
        let older = cache.ticket(NetworkId::Xahau);
        let _failed = cache.ticket(NetworkId::Xahau);
        assert!(cache.commit(older, snapshot(NetworkId::Xahau, 5)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn networks_are_independent() {
        let cache = SnapshotCache::new();
        let xahau = cache.ticket(NetworkId::Xahau);
        let xrpl = cache.ticket(NetworkId::Xrpl);
        assert!(cache.commit(xrpl, snapshot(NetworkId::Xrpl, 7)));
        assert!(cache.commit(xahau, snapshot(NetworkId::Xahau, 3)));

        let view = cache.view(&NetworkId::ALL);
        assert_eq!(view.len(), 2);
        assert!(view.values().all(Option::is_some));
    }

    #[test]
    fn view_reports_missing_networks() {
        let cache = SnapshotCache::new();
        assert!(cache.is_empty());
        let view = cache.view(&NetworkId::ALL);
        assert_eq!(view.get(&NetworkId::Xrpl), Some(&None));
    }
}
