//! Deadline-ordered timer service.
//!
//! Timers live in a slab; the firing order is a `BTreeMap` keyed on
//! `(deadline, sequence)` where the sequence number makes ties fire in
//! insertion order. An auto-reloading timer re-arms by adding its interval
//! to the *stored* deadline, never to the current time, so periodic timers
//! do not drift when a handler runs long. Re-arming happens before dispatch,
//! which keeps it safe for a callback to destroy or reprogram its own timer.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::{Duration, Instant};

use slab::Slab;

use crate::reactor::BoxedTimerCallback;

pub(crate) struct TimerEntry {
    pub(crate) gen: u32,
    /// Destroyed; slot kept as a tombstone until the collector reclaims it.
    pub(crate) dead: bool,
    pub(crate) deadline: Option<Instant>,
    pub(crate) interval: Option<Duration>,
    key: Option<(Instant, u64)>,
    pub(crate) callback: Option<Rc<RefCell<BoxedTimerCallback>>>,
}

impl TimerEntry {
    pub(crate) fn in_list(&self) -> bool {
        self.key.is_some()
    }
}

pub(crate) struct Timers {
    entries: Slab<TimerEntry>,
    queue: BTreeMap<(Instant, u64), usize>,
    seq: u64,
}

impl Timers {
    pub(crate) fn new() -> Timers {
        Timers {
            entries: Slab::new(),
            queue: BTreeMap::new(),
            seq: 0,
        }
    }

    pub(crate) fn insert(&mut self, gen: u32, deadline: Option<Instant>) -> usize {
        let index = self.entries.insert(TimerEntry {
            gen,
            dead: false,
            deadline,
            interval: None,
            key: None,
            callback: None,
        });
        if deadline.is_some() {
            self.arm(index);
        }
        index
    }

    pub(crate) fn get(&self, index: usize) -> Option<&TimerEntry> {
        self.entries.get(index)
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut TimerEntry> {
        self.entries.get_mut(index)
    }

    /// Enqueues the timer at its stored deadline.
    pub(crate) fn arm(&mut self, index: usize) {
        self.disarm(index);
        let seq = self.seq;
        self.seq += 1;
        let entry = &mut self.entries[index];
        let deadline = match entry.deadline {
            Some(deadline) => deadline,
            None => return,
        };
        let key = (deadline, seq);
        entry.key = Some(key);
        self.queue.insert(key, index);
    }

    pub(crate) fn disarm(&mut self, index: usize) {
        if let Some(key) = self.entries[index].key.take() {
            self.queue.remove(&key);
        }
    }

    pub(crate) fn set_timeout(&mut self, index: usize, deadline: Instant) {
        self.entries[index].deadline = Some(deadline);
        self.arm(index);
    }

    /// `Some(interval)` makes the timer periodic; when it is not currently
    /// queued it is armed one interval from now. `None` clears the reload,
    /// leaving the most recent deadline as a one-shot.
    pub(crate) fn set_autoreload(
        &mut self,
        index: usize,
        interval: Option<Duration>,
        now: Instant,
    ) {
        match interval {
            Some(interval) => {
                let armed = self.entries[index].in_list();
                self.entries[index].interval = Some(interval);
                if !armed {
                    self.entries[index].deadline = Some(now + interval);
                    self.arm(index);
                }
            }
            None => self.entries[index].interval = None,
        }
    }

    pub(crate) fn start(&mut self, index: usize) {
        if !self.entries[index].in_list() && self.entries[index].deadline.is_some() {
            self.arm(index);
        }
    }

    /// Tombstones a timer; the slot itself is reclaimed later.
    pub(crate) fn destroy(&mut self, index: usize) {
        self.disarm(index);
        let entry = &mut self.entries[index];
        entry.dead = true;
        entry.callback = None;
    }

    pub(crate) fn remove(&mut self, index: usize) {
        self.disarm(index);
        self.entries.remove(index);
    }

    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.queue.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Pops the head if it is due, re-arming periodic timers before
    /// returning so the caller can dispatch without touching the queue.
    pub(crate) fn pop_expired(&mut self, now: Instant) -> Option<usize> {
        let (&key, &index) = self.queue.iter().next()?;
        if key.0 > now {
            return None;
        }
        self.queue.remove(&key);
        let seq = self.seq;
        self.seq += 1;
        let entry = &mut self.entries[index];
        entry.key = None;
        if let Some(interval) = entry.interval {
            let next = entry.deadline.unwrap_or(now) + interval;
            entry.deadline = Some(next);
            let key = (next, seq);
            entry.key = Some(key);
            self.queue.insert(key, index);
        }
        Some(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_in_deadline_order_ties_by_insertion() {
        let mut timers = Timers::new();
        let now = Instant::now();
        let a = timers.insert(1, Some(now + Duration::from_millis(20)));
        let b = timers.insert(2, Some(now + Duration::from_millis(10)));
        let c = timers.insert(3, Some(now + Duration::from_millis(10)));

        let late = now + Duration::from_millis(30);
        assert_eq!(timers.pop_expired(late), Some(b));
        assert_eq!(timers.pop_expired(late), Some(c));
        assert_eq!(timers.pop_expired(late), Some(a));
        assert_eq!(timers.pop_expired(late), None);
    }

    #[test]
    fn head_is_always_earliest() {
        let mut timers = Timers::new();
        let now = Instant::now();
        timers.insert(1, Some(now + Duration::from_secs(5)));
        timers.insert(2, Some(now + Duration::from_secs(1)));
        assert_eq!(timers.next_deadline(), Some(now + Duration::from_secs(1)));
    }

    #[test]
    fn autoreload_rearms_from_stored_deadline() {
        let mut timers = Timers::new();
        let now = Instant::now();
        let t = timers.insert(1, Some(now + Duration::from_millis(10)));
        timers.set_autoreload(t, Some(Duration::from_millis(10)), now);

        // Fire late: the next deadline is still nominal + interval.
        let late = now + Duration::from_millis(35);
        assert_eq!(timers.pop_expired(late), Some(t));
        assert_eq!(
            timers.get(t).unwrap().deadline,
            Some(now + Duration::from_millis(20))
        );
    }

    #[test]
    fn autoreload_clear_leaves_one_shot() {
        let mut timers = Timers::new();
        let now = Instant::now();
        let t = timers.insert(1, None);
        timers.set_autoreload(t, Some(Duration::from_millis(10)), now);
        timers.set_autoreload(t, None, now);

        let late = now + Duration::from_millis(15);
        assert_eq!(timers.pop_expired(late), Some(t));
        assert!(!timers.get(t).unwrap().in_list());
        assert_eq!(timers.pop_expired(late + Duration::from_millis(20)), None);
    }

    #[test]
    fn destroy_unlinks() {
        let mut timers = Timers::new();
        let now = Instant::now();
        let t = timers.insert(1, Some(now));
        timers.destroy(t);
        assert_eq!(timers.pop_expired(now + Duration::from_secs(1)), None);
        assert!(timers.get(t).unwrap().dead);
    }
}
