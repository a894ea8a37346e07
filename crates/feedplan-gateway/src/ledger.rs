//! Per-invocation token accounting.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;

use crate::types::{Capability, Usage};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UsageTotals {
    pub calls: u64,
    pub prompt_units: u64,
    pub completion_units: u64,
}

impl UsageTotals {
    fn add(&mut self, other: &UsageTotals) {
        self.calls += other.calls;
        self.prompt_units += other.prompt_units;
        self.completion_units += other.completion_units;
    }
}

/// Point-in-time copy of a [`ResourceLedger`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UsageSnapshot {
    pub per_capability: BTreeMap<Capability, UsageTotals>,
    pub total: UsageTotals,
}

impl UsageSnapshot {
    #[must_use]
    pub fn for_capability(&self, capability: Capability) -> UsageTotals {
        self.per_capability
            .get(&capability)
            .copied()
            .unwrap_or_default()
    }
}

/// Accumulates usage per capability. Cloning shares the same counters, so
/// concurrent analysis tasks can all record into one ledger.
#[derive(Debug, Clone, Default)]
pub struct ResourceLedger {
    inner: Arc<Mutex<BTreeMap<Capability, UsageTotals>>>,
}

impl ResourceLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one successful call's usage. Counters only ever grow.
    pub fn record(&self, capability: Capability, usage: Usage) {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        map.entry(capability).or_default().add(&UsageTotals {
            calls: 1,
            prompt_units: usage.prompt_units,
            completion_units: usage.completion_units,
        });
    }

    #[must_use]
    pub fn snapshot(&self) -> UsageSnapshot {
        let map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let mut total = UsageTotals::default();
        for totals in map.values() {
            total.add(totals);
        }
        UsageSnapshot {
            per_capability: map.clone(),
            total,
        }
    }

    #[must_use]
    pub fn total(&self) -> UsageTotals {
        self.snapshot().total
    }

    pub fn reset(&self) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_accumulate_per_capability() {
        let ledger = ResourceLedger::new();
        ledger.record(Capability::Analyze, Usage::new(100, 20));
        ledger.record(Capability::Analyze, Usage::new(50, 5));
        ledger.record(Capability::Write, Usage::new(10, 40));

        let snap = ledger.snapshot();
        assert_eq!(
            snap.for_capability(Capability::Analyze),
            UsageTotals { calls: 2, prompt_units: 150, completion_units: 25 }
        );
        assert_eq!(snap.total.calls, 3);
        assert_eq!(snap.total.prompt_units, 160);
        assert_eq!(snap.total.completion_units, 65);
        assert_eq!(snap.for_capability(Capability::Review), UsageTotals::default());
    }

    #[test]
    fn reset_clears_everything() {
        let ledger = ResourceLedger::new();
        ledger.record(Capability::Plan, Usage::new(1, 1));
        ledger.reset();
        assert_eq!(ledger.total(), UsageTotals::default());
    }

    #[tokio::test]
    async fn concurrent_records_are_additive() {
        let ledger = ResourceLedger::new();
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let ledger = ledger.clone();
                tokio::spawn(async move {
                    for _ in 0..50 {
                        ledger.record(Capability::Analyze, Usage::new(2, 1));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let totals = ledger.total();
        assert_eq!(totals.calls, 800);
        assert_eq!(totals.prompt_units, 1600);
        assert_eq!(totals.completion_units, 800);
    }
}
