// Poll-mode ingestion filter: skip messages already seen or too old to matter.
//
// Polling re-reads the same history window every tick, and after a restart it
// would otherwise re-moderate everything still in that window.

use std::collections::{HashSet, VecDeque};

pub const STALE_AFTER_SECS: i64 = 300;
pub const SEEN_CAP: usize = 1000;
pub const SEEN_KEEP: usize = 500;

pub struct IngestionDedup {
    seen: HashSet<i64>,
    order: VecDeque<i64>,
    stale_after_secs: i64,
    cap: usize,
    keep: usize,
}

impl Default for IngestionDedup {
    fn default() -> Self {
        Self::new(STALE_AFTER_SECS, SEEN_CAP, SEEN_KEEP)
    }
}

impl IngestionDedup {
    pub fn new(stale_after_secs: i64, cap: usize, keep: usize) -> Self {
        Self {
            seen: HashSet::new(),
            order: VecDeque::new(),
            stale_after_secs,
            cap,
            keep: keep.min(cap),
        }
    }

    /// `true` if the message should be processed. Every new id is remembered,
    /// stale ones included, so a stale message is only looked at once.
    ///
    /// `sent_at` and `now` are unix seconds.
    pub fn accept(&mut self, message_id: i64, sent_at: i64, now: i64) -> bool {
        if !self.seen.insert(message_id) {
            return false;
        }
        self.order.push_back(message_id);
        if self.order.len() > self.cap {
            self.trim();
        }

        now - sent_at <= self.stale_after_secs
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Keep only the most recently inserted ids.
    fn trim(&mut self) {
        let drop = self.order.len() - self.keep;
        for id in self.order.drain(..drop) {
            self.seen.remove(&id);
        }
        tracing::debug!(kept = self.order.len(), "Trimmed seen message ids");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    #[test]
    fn test_duplicate_is_skipped() {
        let mut dedup = IngestionDedup::default();
        assert!(dedup.accept(1, NOW, NOW));
        assert!(!dedup.accept(1, NOW, NOW));
    }

    #[test]
    fn test_stale_message_is_skipped_even_if_unseen() {
        let mut dedup = IngestionDedup::default();
        assert!(!dedup.accept(1, NOW - 301, NOW));
        assert!(dedup.accept(2, NOW - 300, NOW));
        assert_eq!(dedup.len(), 2);
    }

    #[test]
    fn test_stale_id_is_remembered() {
        let mut dedup = IngestionDedup::default();
        assert!(!dedup.accept(1, NOW - 301, NOW));
        // Same id on the next poll tick, even with a fresh timestamp.
        assert!(!dedup.accept(1, NOW, NOW + 1));
    }

    #[test]
    fn test_trim_keeps_most_recent() {
        let mut dedup = IngestionDedup::default();
        for id in 0..=1000 {
            assert!(dedup.accept(id, NOW, NOW));
        }
        assert_eq!(dedup.len(), SEEN_KEEP);

        // Oldest ids were forgotten, newest are still known.
        assert!(dedup.accept(0, NOW, NOW));
        assert!(!dedup.accept(1000, NOW, NOW));
    }
}
