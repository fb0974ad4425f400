// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Bounded handoff queues between submitting threads and the reactor
//!
//! One queue per address family. Any thread may push; the reactor is
//! the sole consumer. A full queue rejects the push rather than
//! blocking the caller or dropping the probe.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use crate::error::PingError;
use crate::target::PingTarget;

/// Bounds memory under producer bursts.
pub(crate) const PENDING_QUEUE_SIZE: usize = 8192;

pub(crate) struct PendingQueue {
    inner: Mutex<VecDeque<PingTarget>>,
    capacity: usize,
}

impl PendingQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            capacity,
        }
    }

    pub fn push(&self, target: PingTarget) -> Result<(), PingError> {
        let mut queue = self.lock();
        if queue.len() >= self.capacity {
            return Err(PingError::QueueFull);
        }
        queue.push_back(target);
        Ok(())
    }

    /// Requeues a target whose send hit a transient error. Bypasses the
    /// capacity check: the target already held a slot.
    pub fn push_front(&self, target: PingTarget) {
        self.lock().push_front(target);
    }

    pub fn pop(&self) -> Option<PingTarget> {
        self.lock().pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    // Nothing panics while the lock is held (handler callbacks run with
    // no lock taken), so a poisoned queue is still consistent.
    fn lock(&self) -> MutexGuard<'_, VecDeque<PingTarget>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Arc;
    use std::thread;

    fn target() -> PingTarget {
        PingTarget::new(IpAddr::V4(Ipv4Addr::LOCALHOST))
    }

    #[test]
    fn fifo_order() {
        let queue = PendingQueue::new(4);
        for id in 0..3u16 {
            let mut t = target();
            t.id = id;
            queue.push(t).unwrap();
        }
        assert_eq!(0, queue.pop().unwrap().id);
        assert_eq!(1, queue.pop().unwrap().id);
        assert_eq!(2, queue.pop().unwrap().id);
        assert!(queue.pop().is_none());
    }

    #[test]
    fn rejects_when_full() {
        let queue = PendingQueue::new(2);
        queue.push(target()).unwrap();
        queue.push(target()).unwrap();
        assert!(matches!(queue.push(target()), Err(PingError::QueueFull)));

        queue.pop().unwrap();
        queue.push(target()).unwrap();
    }

    #[test]
    fn push_front_bypasses_capacity() {
        let queue = PendingQueue::new(1);
        queue.push(target()).unwrap();

        let mut requeued = target();
        requeued.id = 7;
        queue.push_front(requeued);
        assert_eq!(2, queue.len());
        assert_eq!(7, queue.pop().unwrap().id);
    }

    #[test]
    fn concurrent_producers() {
        let queue = Arc::new(PendingQueue::new(PENDING_QUEUE_SIZE));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let queue = Arc::clone(&queue);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    queue.push(target()).unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(400, queue.len());
    }
}
