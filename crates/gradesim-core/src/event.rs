//! Time-ordered agenda of pending resumptions.

use crate::process::{ProcessId, Wake};
use crate::SimTime;
use std::collections::BTreeMap;

/// Key for ordering events in the agenda.
///
/// Events are ordered by:
/// 1. Time (earlier first)
/// 2. Sequence number (FIFO for the same time)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventKey {
    /// When this event fires.
    pub time: SimTime,
    /// Scheduling order, unique per agenda.
    pub sequence: u64,
}

/// A pending resumption: which process to resume and with what outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct Resumption<I> {
    pub pid: ProcessId,
    pub wake: Wake<I>,
}

/// Clock plus pending set.
///
/// The clock only moves forward, and only when [`Agenda::advance`] pops
/// the next due event.
#[derive(Debug)]
pub struct Agenda<I> {
    now: SimTime,
    sequence: u64,
    pending: BTreeMap<EventKey, Resumption<I>>,
}

impl<I> Default for Agenda<I> {
    fn default() -> Self {
        Self {
            now: 0,
            sequence: 0,
            pending: BTreeMap::new(),
        }
    }
}

impl<I> Agenda<I> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> SimTime {
        self.now
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Enqueue a resumption of `pid` at `now + delay`.
    pub fn schedule(&mut self, delay: SimTime, pid: ProcessId, wake: Wake<I>) -> EventKey {
        let key = EventKey {
            time: self.now.saturating_add(delay),
            sequence: self.sequence,
        };
        self.sequence += 1;
        self.pending.insert(key, Resumption { pid, wake });
        key
    }

    /// Enqueue zero-delay resumptions in the given order.
    pub fn wake_all(&mut self, ready: impl IntoIterator<Item = (ProcessId, Wake<I>)>) {
        for (pid, wake) in ready {
            self.schedule(0, pid, wake);
        }
    }

    /// Time of the earliest pending event.
    pub fn next_time(&self) -> Option<SimTime> {
        self.pending.keys().next().map(|key| key.time)
    }

    /// Pop the earliest event and move the clock to its time.
    pub fn advance(&mut self) -> Option<(EventKey, Resumption<I>)> {
        let (key, resumption) = self.pending.pop_first()?;
        self.now = key.time;
        Some((key, resumption))
    }

    /// Move the clock to `time` without firing anything.
    ///
    /// Used when a run stops at its time limit; the clock never goes back.
    pub fn fast_forward(&mut self, time: SimTime) {
        self.now = self.now.max(time);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_key_orders_by_time_first() {
        let earlier = EventKey {
            time: 1,
            sequence: 9,
        };
        let later = EventKey {
            time: 2,
            sequence: 0,
        };
        assert!(earlier < later);
    }

    #[test]
    fn equal_times_fire_in_scheduling_order() {
        let mut agenda: Agenda<()> = Agenda::new();
        agenda.schedule(5, 2, Wake::Elapsed);
        agenda.schedule(5, 0, Wake::Elapsed);
        agenda.schedule(5, 1, Wake::Elapsed);

        let order: Vec<_> = std::iter::from_fn(|| agenda.advance())
            .map(|(_, resumption)| resumption.pid)
            .collect();
        assert_eq!(order, vec![2, 0, 1]);
    }

    #[test]
    fn advance_moves_clock_monotonically() {
        let mut agenda: Agenda<()> = Agenda::new();
        agenda.schedule(3, 0, Wake::Elapsed);
        agenda.schedule(1, 1, Wake::Elapsed);

        let (key, _) = agenda.advance().unwrap();
        assert_eq!(key.time, 1);
        assert_eq!(agenda.now(), 1);

        // Delays are relative to the current clock.
        agenda.schedule(1, 2, Wake::Elapsed);
        assert_eq!(agenda.next_time(), Some(2));

        agenda.fast_forward(0);
        assert_eq!(agenda.now(), 1);
    }
}
