use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use crate::ids::TimerId;

/// Timers ordered by deadline, ties broken by insertion order.
pub(crate) struct TimerQueue<T> {
    entries: BTreeMap<(Instant, u64), T>,
    deadlines: HashMap<u64, Instant>,
    next_seq: u64,
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            deadlines: HashMap::new(),
            next_seq: 0,
        }
    }
}

impl<T> TimerQueue<T> {
    pub(crate) fn insert(&mut self, deadline: Instant, value: T) -> TimerId {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert((deadline, seq), value);
        self.deadlines.insert(seq, deadline);
        TimerId::new(seq)
    }

    pub(crate) fn remove(&mut self, id: TimerId) -> Option<T> {
        let deadline = self.deadlines.remove(&id.value())?;
        self.entries.remove(&(deadline, id.value()))
    }

    /// Sequence number of the next insert. Timers at or above a watermark taken
    /// at the start of a TIMERS phase were added during that phase.
    pub(crate) fn watermark(&self) -> u64 {
        self.next_seq
    }

    /// Remove the earliest timer that is due at `now` and older than `watermark`.
    pub(crate) fn pop_due(&mut self, now: Instant, watermark: u64) -> Option<T> {
        let key = self
            .entries
            .keys()
            .take_while(|(deadline, _)| *deadline <= now)
            .find(|(_, seq)| *seq < watermark)
            .copied()?;
        self.deadlines.remove(&key.1);
        self.entries.remove(&key)
    }

    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.entries.keys().next().map(|(deadline, _)| *deadline)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
