//! Finite FIFO buffer with waiting puts and filtered gets.

use crate::process::{Matcher, ProcessId, StoreId, Wake};
use std::collections::VecDeque;

/// Bounded store.
///
/// Items keep insertion order. Puts beyond capacity and gets that match
/// nothing are parked and serviced in arrival order by [`Store::settle`].
/// A `capacity` of `None` means unbounded.
#[derive(Debug, Clone)]
pub struct Store<T> {
    id: StoreId,
    capacity: Option<usize>,
    items: VecDeque<T>,
    putters: VecDeque<(ProcessId, T)>,
    getters: VecDeque<(ProcessId, Matcher<T>)>,
}

impl<T: PartialEq> Store<T> {
    pub fn bounded(id: StoreId, capacity: usize) -> Self {
        Self::with_capacity(id, Some(capacity))
    }

    pub fn unbounded(id: StoreId) -> Self {
        Self::with_capacity(id, None)
    }

    fn with_capacity(id: StoreId, capacity: Option<usize>) -> Self {
        Self {
            id,
            capacity,
            items: VecDeque::new(),
            putters: VecDeque::new(),
            getters: VecDeque::new(),
        }
    }

    pub fn id(&self) -> StoreId {
        self.id
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Eager capacity test, used before deciding to put.
    pub fn is_full(&self) -> bool {
        self.capacity
            .map_or(false, |capacity| self.items.len() >= capacity)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn waiting_putters(&self) -> usize {
        self.putters.len()
    }

    pub fn waiting_getters(&self) -> usize {
        self.getters.len()
    }

    /// Register a put by `pid`. Call [`Store::settle`] afterwards.
    pub fn offer(&mut self, pid: ProcessId, item: T) {
        self.putters.push_back((pid, item));
    }

    /// Register a get by `pid`. Call [`Store::settle`] afterwards.
    pub fn demand(&mut self, pid: ProcessId, matcher: Matcher<T>) {
        self.getters.push_back((pid, matcher));
    }

    /// Service every parked put and get that can complete now.
    ///
    /// Puts are admitted head first while there is room; each getter, in
    /// arrival order, takes the first item its matcher accepts. The two
    /// passes repeat until neither makes progress. Returns the processes to
    /// resume, in the order their operations completed.
    pub fn settle(&mut self) -> Vec<(ProcessId, Wake<T>)> {
        let mut ready = Vec::new();
        loop {
            let mut progressed = false;

            while !self.is_full() {
                let Some((pid, item)) = self.putters.pop_front() else {
                    break;
                };
                self.items.push_back(item);
                ready.push((pid, Wake::Stored));
                progressed = true;
            }

            let mut index = 0;
            while index < self.getters.len() {
                let matcher = &self.getters[index].1;
                match self.items.iter().position(|item| matcher.matches(item)) {
                    Some(position) => {
                        let item = self.items.remove(position);
                        let getter = self.getters.remove(index);
                        if let (Some(item), Some((pid, _))) = (item, getter) {
                            ready.push((pid, Wake::Got(item)));
                        }
                        progressed = true;
                    }
                    None => index += 1,
                }
            }

            if !progressed {
                return ready;
            }
        }
    }

    /// Non-suspending put; hands the item back when the store is full or
    /// earlier puts are still parked.
    ///
    /// Does not service parked getters; stores mixing both styles must call
    /// [`Store::settle`] afterwards.
    pub fn try_put(&mut self, item: T) -> Result<(), T> {
        if self.is_full() || !self.putters.is_empty() {
            return Err(item);
        }
        self.items.push_back(item);
        Ok(())
    }

    /// Non-suspending get of the first item the matcher accepts.
    pub fn try_take(&mut self, matcher: &Matcher<T>) -> Option<T> {
        let position = self.items.iter().position(|item| matcher.matches(item))?;
        self.items.remove(position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_within_capacity_completes_immediately() {
        let mut store = Store::bounded(StoreId(0), 2);
        store.offer(1, 'a');
        store.offer(2, 'b');

        assert_eq!(store.settle(), vec![(1, Wake::Stored), (2, Wake::Stored)]);
        assert!(store.is_full());
    }

    #[test]
    fn blocked_putters_resume_in_fifo_order() {
        let mut store = Store::bounded(StoreId(0), 1);
        store.offer(1, 'a');
        store.offer(2, 'b');
        store.offer(3, 'c');
        assert_eq!(store.settle(), vec![(1, Wake::Stored)]);
        assert_eq!(store.waiting_putters(), 2);

        store.demand(9, Matcher::Any);
        let ready = store.settle();
        assert_eq!(
            ready,
            vec![(9, Wake::Got('a')), (2, Wake::Stored)],
            "the freed slot goes to the oldest putter"
        );
        assert_eq!(store.iter().copied().collect::<Vec<_>>(), vec!['b']);
        assert!(store.len() <= 1);
    }

    #[test]
    fn filtered_get_waits_for_matching_item() {
        let mut store = Store::unbounded(StoreId(0));
        store.demand(5, Matcher::Exact(42));
        store.offer(1, 7);
        assert_eq!(store.settle(), vec![(1, Wake::Stored)]);
        assert_eq!(store.waiting_getters(), 1);

        store.offer(2, 42);
        assert_eq!(
            store.settle(),
            vec![(2, Wake::Stored), (5, Wake::Got(42))]
        );
        assert_eq!(store.iter().copied().collect::<Vec<_>>(), vec![7]);
    }

    #[test]
    fn exact_get_removes_first_match_in_insertion_order() {
        let mut store = Store::unbounded(StoreId(0));
        for item in [3, 1, 3] {
            assert!(store.try_put(item).is_ok());
        }

        assert_eq!(store.try_take(&Matcher::Exact(3)), Some(3));
        assert_eq!(store.iter().copied().collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(store.try_take(&Matcher::Exact(8)), None);
    }

    #[test]
    fn zero_capacity_store_admits_nothing() {
        let mut store = Store::bounded(StoreId(1), 0);
        assert!(store.is_full());
        assert_eq!(store.try_put('x'), Err('x'));

        store.offer(1, 'y');
        assert!(store.settle().is_empty());
        assert_eq!(store.len(), 0);
    }
}
