//! Pool of identical servers with a FIFO wait queue.

use crate::error::KernelError;
use crate::process::{ProcessId, ResourceId};
use std::collections::VecDeque;

/// Capacity-bounded resource.
///
/// At most `capacity` processes hold a slot at once; excess requesters
/// wait in arrival order and are granted in that same order.
#[derive(Debug, Clone)]
pub struct Resource {
    id: ResourceId,
    capacity: usize,
    holders: Vec<ProcessId>,
    queue: VecDeque<ProcessId>,
}

impl Resource {
    pub fn new(id: ResourceId, capacity: usize) -> Self {
        Self {
            id,
            capacity,
            holders: Vec::with_capacity(capacity),
            queue: VecDeque::new(),
        }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of busy servers.
    pub fn count(&self) -> usize {
        self.holders.len()
    }

    /// Number of requesters waiting for a slot.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_idle(&self) -> bool {
        self.holders.is_empty() && self.queue.is_empty()
    }

    /// Busy servers over capacity; zero for a zero-capacity pool.
    pub fn utilization(&self) -> f64 {
        if self.capacity == 0 {
            0.0
        } else {
            self.holders.len() as f64 / self.capacity as f64
        }
    }

    /// Returns `true` when the slot is granted immediately, otherwise the
    /// requester is queued.
    pub fn request(&mut self, pid: ProcessId) -> bool {
        if self.holders.len() < self.capacity && self.queue.is_empty() {
            self.holders.push(pid);
            true
        } else {
            self.queue.push_back(pid);
            false
        }
    }

    /// Release the slot held by `pid`, promoting the head of the queue.
    ///
    /// Returns the promoted process, which the caller must resume.
    pub fn release(&mut self, pid: ProcessId) -> Result<Option<ProcessId>, KernelError> {
        let position = self
            .holders
            .iter()
            .position(|holder| *holder == pid)
            .ok_or(KernelError::NotHolder {
                process: pid,
                resource: self.id,
            })?;
        self.holders.remove(position);

        if self.holders.len() < self.capacity {
            if let Some(next) = self.queue.pop_front() {
                self.holders.push(next);
                return Ok(Some(next));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grants_up_to_capacity_then_queues() {
        let mut resource = Resource::new(ResourceId(0), 2);

        assert!(resource.request(10));
        assert!(resource.request(11));
        assert!(!resource.request(12));

        assert_eq!(resource.count(), 2);
        assert_eq!(resource.queue_len(), 1);
        assert_eq!(resource.utilization(), 1.0);
    }

    #[test]
    fn release_promotes_in_fifo_order() {
        let mut resource = Resource::new(ResourceId(0), 1);
        assert!(resource.request(1));
        assert!(!resource.request(2));
        assert!(!resource.request(3));

        assert_eq!(resource.release(1), Ok(Some(2)));
        assert_eq!(resource.release(2), Ok(Some(3)));
        assert_eq!(resource.release(3), Ok(None));
        assert!(resource.is_idle());
    }

    #[test]
    fn release_by_non_holder_is_rejected() {
        let mut resource = Resource::new(ResourceId(4), 1);
        assert!(resource.request(1));

        assert_eq!(
            resource.release(2),
            Err(KernelError::NotHolder {
                process: 2,
                resource: ResourceId(4),
            })
        );
        assert_eq!(resource.count(), 1);
    }
}
