//! Deferred reclamation of user-facing handles.
//!
//! A callback may close the socket (or destroy the timer, or abort the
//! query) it is currently being dispatched on, while the caller still holds
//! the handle and may keep using it for the rest of the callback stack — or
//! long after. Closed slots are therefore tombstoned rather than removed:
//! the slot, and with it the handle's generation, stays resolvable for a
//! grace period so late operations land on the tombstone and degrade into a
//! logged no-op instead of hitting a recycled slot.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Default grace period before a tombstoned slot is reclaimed.
pub(crate) const DEFAULT_GRACE: Duration = Duration::from_secs(60);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Kind {
    Socket,
    Timer,
    Query,
}

#[derive(Debug)]
struct Entry {
    kind: Kind,
    index: usize,
    gen: u32,
    enqueued: Instant,
}

#[derive(Debug)]
pub(crate) struct GarbageCollector {
    enabled: bool,
    grace: Duration,
    // Enqueue order is FIFO on time, so expiry only ever needs to look at
    // the head.
    queue: VecDeque<Entry>,
}

impl GarbageCollector {
    pub(crate) fn new(enabled: bool, grace: Duration) -> GarbageCollector {
        GarbageCollector {
            enabled,
            grace,
            queue: VecDeque::new(),
        }
    }

    /// Queues a tombstoned slot for reclamation. Returns `false` when the
    /// collector is disabled, in which case the caller reclaims immediately.
    pub(crate) fn add(&mut self, kind: Kind, index: usize, gen: u32) -> bool {
        if !self.enabled {
            return false;
        }
        self.queue.push_back(Entry {
            kind,
            index,
            gen,
            enqueued: Instant::now(),
        });
        true
    }

    /// Pops every entry whose grace period has elapsed.
    pub(crate) fn expired(&mut self, now: Instant) -> Vec<(Kind, usize, u32)> {
        let mut out = Vec::new();
        while let Some(head) = self.queue.front() {
            if now.duration_since(head.enqueued) < self.grace {
                break;
            }
            let entry = self.queue.pop_front().unwrap();
            out.push((entry.kind, entry.index, entry.gen));
        }
        out
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn head_expiry_in_fifo_order() {
        let mut gc = GarbageCollector::new(true, Duration::from_millis(0));
        assert!(gc.add(Kind::Socket, 1, 7));
        assert!(gc.add(Kind::Timer, 2, 8));
        let freed = gc.expired(Instant::now() + Duration::from_millis(1));
        assert_eq!(
            freed,
            vec![(Kind::Socket, 1, 7), (Kind::Timer, 2, 8)]
        );
        assert_eq!(gc.len(), 0);
    }

    #[test]
    fn young_entries_stay() {
        let mut gc = GarbageCollector::new(true, Duration::from_secs(60));
        gc.add(Kind::Query, 3, 1);
        assert!(gc.expired(Instant::now()).is_empty());
        assert_eq!(gc.len(), 1);
    }

    #[test]
    fn disabled_frees_immediately() {
        let mut gc = GarbageCollector::new(false, DEFAULT_GRACE);
        assert!(!gc.add(Kind::Socket, 0, 0));
        assert_eq!(gc.len(), 0);
    }
}
