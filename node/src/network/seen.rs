//! Seen-message-id deduplication. A flooded `NEW_BLOCK`/`NEW_TRANSACTION`
//! arrives at every connected peer; the node rebroadcasts to everyone except
//! the sender, so each message is seen once per edge. `SeenSet` prevents a
//! cycle from re-processing (and re-broadcasting) the same `msg_id` forever.
//!
//! Entries are forgotten wholesale every GC interval rather than tracked
//! with per-entry expiry — simpler, and a flooded id is only ever useful
//! for a window on the order of one sync round anyway.

use std::collections::HashSet;

#[derive(Default)]
pub struct SeenSet {
    ids: HashSet<String>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `msg_id` and returns whether it had not been seen before.
    pub fn record(&mut self, msg_id: &str) -> bool {
        self.ids.insert(msg_id.to_string())
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sighting_is_new_second_is_not() {
        let mut seen = SeenSet::new();
        assert!(seen.record("msg-1"));
        assert!(!seen.record("msg-1"));
    }

    #[test]
    fn clear_forgets_all_entries() {
        let mut seen = SeenSet::new();
        seen.record("msg-1");
        seen.record("msg-2");
        seen.clear();
        assert!(seen.is_empty());
        assert!(seen.record("msg-1"));
    }
}
