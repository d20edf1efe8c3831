//! Tick scheduler: "run this after N ticks", without threads.
//!
//! A [`TickQueue`] is a min-heap of `(due_tick, sequence)`. Tasks that fall
//! due on the same tick come out in submission order.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::types::EntityId;

pub trait TickScheduler<T> {
    /// Current tick.
    fn now(&self) -> u64;

    /// Run `task` once `delay_ticks` ticks have passed. A delay of zero runs
    /// it on the next [`TickQueue::advance`].
    fn schedule(&mut self, delay_ticks: u64, task: T);
}

/// One link of an entity's telemetry poll chain.
///
/// `epoch` identifies the Active session that scheduled it; a task whose
/// epoch no longer matches the entity's session is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTask {
    pub entity: EntityId,
    pub epoch: u64,
}

#[derive(Debug)]
struct Slot<T> {
    due: u64,
    seq: u64,
    task: T,
}

impl<T> PartialEq for Slot<T> {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl<T> Eq for Slot<T> {}

impl<T> PartialOrd for Slot<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Slot<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.due
            .cmp(&other.due)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

#[derive(Debug)]
pub struct TickQueue<T> {
    heap: BinaryHeap<Reverse<Slot<T>>>,
    now: u64,
    next_seq: u64,
}

impl<T> TickQueue<T> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            now: 0,
            next_seq: 0,
        }
    }

    /// Move the clock forward one tick and drain every task now due.
    pub fn advance(&mut self) -> Vec<T> {
        self.now += 1;
        let mut due = Vec::new();
        while let Some(Reverse(slot)) = self.heap.peek() {
            if slot.due > self.now {
                break;
            }
            if let Some(Reverse(slot)) = self.heap.pop() {
                due.push(slot.task);
            }
        }
        due
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

impl<T> Default for TickQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TickScheduler<T> for TickQueue<T> {
    fn now(&self) -> u64 {
        self.now
    }

    fn schedule(&mut self, delay_ticks: u64, task: T) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(Slot {
            due: self.now + delay_ticks,
            seq,
            task,
        }));
    }
}
