//! Share accounting (spec §5 "Share accounting", §7 protocol-rejection
//! tracking): accepted/rejected counters plus a bounded histogram of the
//! exact rejection messages a pool has sent back, for telemetry only --
//! nothing here decides whether to resubmit or reconnect.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// How many distinct rejection messages the histogram keeps at once.
const HISTOGRAM_CAPACITY: usize = 10;

/// Accepted/rejected share counters and a top-10 histogram of rejection
/// reasons, keyed by the exact message text the pool sent. Shared between
/// whichever stratum client (V1 or V2) is currently active and anything
/// reporting telemetry, so it's cheap to read from any thread.
pub struct ShareStats {
    accepted: AtomicU64,
    rejected: AtomicU64,
    rejected_reasons: Mutex<HashMap<String, u64>>,
}

impl ShareStats {
    pub fn new() -> Self {
        Self { accepted: AtomicU64::new(0), rejected: AtomicU64::new(0), rejected_reasons: Mutex::new(HashMap::new()) }
    }

    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Records one or more accepted shares (V2's `SubmitSharesSuccess` can
    /// acknowledge a batch in one message; V1 always passes 1).
    pub fn record_accepted(&self, count: u64) {
        self.accepted.fetch_add(count, Ordering::Relaxed);
    }

    /// Records one rejected share and folds `reason` into the histogram.
    pub fn record_rejected(&self, reason: &str) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
        let mut reasons = self.rejected_reasons.lock().expect("rejected-reason histogram mutex poisoned");
        if let Some(count) = reasons.get_mut(reason) {
            *count += 1;
            return;
        }
        if reasons.len() < HISTOGRAM_CAPACITY {
            reasons.insert(reason.to_string(), 1);
            return;
        }
        // Full: only displace the weakest existing entry (lowest count,
        // shortest message on ties) for a reason that would tie it, so the
        // table can't grow unbounded but a message seen only once can still
        // take the spot of another seen only once.
        let weakest = reasons
            .iter()
            .min_by_key(|(message, &count)| (count, std::cmp::Reverse(message.len())))
            .map(|(message, &count)| (message.clone(), count));
        if let Some((weakest_message, weakest_count)) = weakest {
            if weakest_count <= 1 {
                reasons.remove(&weakest_message);
                reasons.insert(reason.to_string(), 1);
            }
        }
    }

    /// The histogram, sorted by count descending, longest message first on
    /// ties (spec §7 "top-10 histogram keyed by exact server message
    /// (longest-first)").
    pub fn top_rejected_reasons(&self) -> Vec<(String, u64)> {
        let reasons = self.rejected_reasons.lock().expect("rejected-reason histogram mutex poisoned");
        let mut entries: Vec<(String, u64)> = reasons.iter().map(|(message, &count)| (message.clone(), count)).collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.len().cmp(&a.0.len())));
        entries
    }
}

impl Default for ShareStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepted_and_rejected_counters_accumulate() {
        let stats = ShareStats::new();
        stats.record_accepted(1);
        stats.record_accepted(3);
        stats.record_rejected("stale-share");
        assert_eq!(stats.accepted(), 4);
        assert_eq!(stats.rejected(), 1);
    }

    #[test]
    fn repeated_reason_increments_the_same_histogram_entry() {
        let stats = ShareStats::new();
        stats.record_rejected("Job not found");
        stats.record_rejected("Job not found");
        stats.record_rejected("Duplicate share");
        let top = stats.top_rejected_reasons();
        assert_eq!(top[0], ("Job not found".to_string(), 2));
        assert_eq!(top[1], ("Duplicate share".to_string(), 1));
    }

    #[test]
    fn histogram_caps_at_ten_distinct_reasons() {
        let stats = ShareStats::new();
        for i in 0..10 {
            stats.record_rejected(&format!("reason-{i}"));
        }
        // An eleventh singleton reason can still displace one of the
        // existing singletons (all tied at count 1).
        stats.record_rejected("reason-10");
        assert_eq!(stats.top_rejected_reasons().len(), 10);
    }

    #[test]
    fn ties_break_longest_message_first() {
        let stats = ShareStats::new();
        stats.record_rejected("short");
        stats.record_rejected("a much longer rejection message");
        let top = stats.top_rejected_reasons();
        assert_eq!(top[0].0, "a much longer rejection message");
        assert_eq!(top[1].0, "short");
    }
}
