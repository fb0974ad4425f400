// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Deadline-ordered registry of in-flight probes
//!
//! Two indexes over one set of owned targets: a map keyed by sequence
//! number for the reply path and a min-heap of (deadline, sequence) for
//! the expiry path. Whichever side completes a target first removes it
//! from the map; the heap entry it leaves behind is a tombstone that is
//! discarded the next time the heap front is examined. Only the reactor
//! thread touches this structure.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::Instant;

use crate::target::PingTarget;

#[derive(PartialEq, Eq, PartialOrd, Ord)]
struct DeadlineEntry {
    deadline: Instant,
    sequence: u16,
}

pub(crate) struct WaitingTargets {
    by_sequence: HashMap<u16, PingTarget>,
    by_deadline: BinaryHeap<Reverse<DeadlineEntry>>,
}

impl WaitingTargets {
    pub fn new() -> Self {
        Self {
            by_sequence: HashMap::new(),
            by_deadline: BinaryHeap::new(),
        }
    }

    /// Inserts a transmitted target under its sequence number.
    pub fn add(&mut self, target: PingTarget) {
        self.by_deadline.push(Reverse(DeadlineEntry {
            deadline: target.deadline,
            sequence: target.sequence,
        }));
        self.by_sequence.insert(target.sequence, target);
    }

    /// Removes a target on the reply path. The heap entry stays behind
    /// as a tombstone.
    pub fn remove(&mut self, sequence: u16) -> Option<PingTarget> {
        let mut target = self.by_sequence.remove(&sequence)?;
        target.complete = true;
        Some(target)
    }

    /// Deadline of the first live entry, discarding tombstones at the
    /// front. The deadline is rechecked against the mapped target so a
    /// wrapped sequence number cannot resurrect a stale entry.
    pub fn peek_next_deadline(&mut self) -> Option<Instant> {
        while let Some(Reverse(entry)) = self.by_deadline.peek() {
            match self.by_sequence.get(&entry.sequence) {
                Some(target) if !target.complete && target.deadline == entry.deadline => {
                    return Some(entry.deadline);
                }
                _ => {
                    self.by_deadline.pop();
                }
            }
        }
        None
    }

    /// Pops the front entry, known live from a preceding peek.
    pub fn take_expired(&mut self) -> Option<PingTarget> {
        let Reverse(entry) = self.by_deadline.pop()?;
        let mut target = self.by_sequence.remove(&entry.sequence)?;
        target.complete = true;
        Some(target)
    }

    pub fn is_empty(&self) -> bool {
        self.by_sequence.is_empty()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.by_sequence.len()
    }
}
