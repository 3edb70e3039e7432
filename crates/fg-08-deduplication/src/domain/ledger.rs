//! # Merge Ledger
//!
//! Remembers which entity pairs were already decided so each pair is
//! merged (or rejected) at most once.
//!
//! A pair is *claimed* before the decision is made and either *settled*
//! or *released* afterwards. Concurrent handlers that find the same pair
//! from both sides race for the claim; only one wins.

use parking_lot::Mutex;
use std::collections::HashSet;

type Pair = (String, String);

/// Order a pair so `(a, b)` and `(b, a)` are the same key.
#[must_use]
pub fn ordered_pair(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

#[derive(Debug, Default)]
pub struct MergeLedger {
    inner: Mutex<LedgerState>,
}

#[derive(Debug, Default)]
struct LedgerState {
    decided: HashSet<Pair>,
    /// Ids folded into another entity.
    merged_away: HashSet<String>,
}

impl MergeLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `(a, b)` for a decision.
    ///
    /// Returns `false` if the pair was already claimed or either side has
    /// been merged away.
    pub fn claim(&self, a: &str, b: &str) -> bool {
        let mut state = self.inner.lock();
        if state.merged_away.contains(a) || state.merged_away.contains(b) {
            return false;
        }
        state.decided.insert(ordered_pair(a, b))
    }

    /// Give a claim back so the pair can be decided later.
    pub fn release(&self, a: &str, b: &str) {
        self.inner.lock().decided.remove(&ordered_pair(a, b));
    }

    /// Record that `merged_id` was folded into another entity.
    pub fn record_merge(&self, merged_id: &str) {
        self.inner.lock().merged_away.insert(merged_id.to_string());
    }

    #[must_use]
    pub fn is_merged_away(&self, id: &str) -> bool {
        self.inner.lock().merged_away.contains(id)
    }

    #[must_use]
    pub fn decided_count(&self) -> usize {
        self.inner.lock().decided.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_once_either_order() {
        let ledger = MergeLedger::new();
        assert!(ledger.claim("a", "b"));
        assert!(!ledger.claim("b", "a"));
        assert_eq!(ledger.decided_count(), 1);
    }

    #[test]
    fn test_release_allows_reclaim() {
        let ledger = MergeLedger::new();
        assert!(ledger.claim("a", "b"));
        ledger.release("b", "a");
        assert!(ledger.claim("a", "b"));
    }

    #[test]
    fn test_merged_away_blocks_new_pairs() {
        let ledger = MergeLedger::new();
        ledger.record_merge("b");
        assert!(ledger.is_merged_away("b"));
        assert!(!ledger.claim("b", "c"));
        assert!(ledger.claim("a", "c"));
    }
}
