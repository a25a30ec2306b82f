// Copyright (c) James Kassemi, SC, US. All rights reserved.
use std::ops::RangeInclusive;

pub type LedgerIndex = u64;

/// Contiguous range of ledgers ending at the validated head.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LedgerWindow {
    pub start: LedgerIndex,
    pub latest: LedgerIndex,
}

impl LedgerWindow {
    /// `start = max(latest - count + 1, 1)`; a zero count is treated as one.
    pub fn ending_at(latest: LedgerIndex, count: u32) -> Self {
        let span = u64::from(count.max(1)) - 1;
        let start = latest.saturating_sub(span).max(1);
        Self {
            start,
            latest: latest.max(start),
        }
    }

    pub fn len(&self) -> u64 {
        self.latest - self.start + 1
    }

    pub fn range(&self) -> RangeInclusive<LedgerIndex> {
        self.start..=self.latest
    }

    /// Indices from the head down to the start of the window.
    pub fn descending(&self) -> impl Iterator<Item = LedgerIndex> {
        self.range().rev()
    }

    pub fn describe(&self) -> String {
        format!("{} to {}", self.start, self.latest)
    }
}
