//! Cancellable delayed tasks on a millisecond clock.
//!
//! The `TaskScheduler` is a priority queue of tasks keyed by due time. Nothing
//! sleeps: the owner advances the clock and pops whatever is due. Ties on the
//! due time resolve in scheduling order.
//!
//! Cancellation removes the task id from the pending set; a cancelled task
//! is discarded when it reaches the front of the queue and never fires.

use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeSet, BinaryHeap};

pub type TaskId = u64;

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledTask<T> {
    pub task_id: TaskId,
    pub due_ms: u64,
    pub payload: T,
}

/// Ordering: (due_ms ASC, task_id ASC). Wrapped in `Reverse` so the heap
/// yields the earliest task first.
#[derive(Debug)]
struct OrderedTask<T>(ScheduledTask<T>);

impl<T> OrderedTask<T> {
    fn key(&self) -> (u64, TaskId) {
        (self.0.due_ms, self.0.task_id)
    }
}

impl<T> PartialEq for OrderedTask<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl<T> Eq for OrderedTask<T> {}

impl<T> PartialOrd for OrderedTask<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for OrderedTask<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

#[derive(Debug)]
pub struct TaskScheduler<T> {
    queue: BinaryHeap<Reverse<OrderedTask<T>>>,
    pending: BTreeSet<TaskId>,
    next_task_id: TaskId,
    now_ms: u64,
}

impl<T> Default for TaskScheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TaskScheduler<T> {
    pub fn new() -> Self {
        Self {
            queue: BinaryHeap::new(),
            pending: BTreeSet::new(),
            next_task_id: 1,
            now_ms: 0,
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    /// Moves the clock forward. Going backwards is ignored.
    pub fn advance_clock(&mut self, now_ms: u64) {
        if now_ms > self.now_ms {
            self.now_ms = now_ms;
        }
    }

    /// Schedule `payload` to fire `delay_ms` after the current clock.
    pub fn schedule(&mut self, delay_ms: u64, payload: T) -> TaskId {
        self.schedule_at(self.now_ms.saturating_add(delay_ms), payload)
    }

    pub fn schedule_at(&mut self, due_ms: u64, payload: T) -> TaskId {
        let task_id = self.next_task_id;
        self.next_task_id += 1;
        self.pending.insert(task_id);
        self.queue.push(Reverse(OrderedTask(ScheduledTask {
            task_id,
            due_ms,
            payload,
        })));
        task_id
    }

    /// Returns `true` if the task was still pending.
    pub fn cancel(&mut self, task_id: TaskId) -> bool {
        self.pending.remove(&task_id)
    }

    /// Pop the next task due at or before the current clock.
    pub fn pop_due(&mut self) -> Option<ScheduledTask<T>> {
        loop {
            let next = self.queue.peek()?;
            if next.0 .0.due_ms > self.now_ms {
                return None;
            }
            let Reverse(OrderedTask(task)) = self.queue.pop()?;
            if self.pending.remove(&task.task_id) {
                return Some(task);
            }
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Drop every task, e.g. when the participant disconnects.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.pending.clear();
    }
}
