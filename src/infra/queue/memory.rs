//! In-memory FIFO queue for pending work items.

use std::collections::VecDeque;

/// Unbounded in-memory FIFO queue.
///
/// One instance backs each model's pending-item list in the registry. The
/// drain loop pops with `try_dequeue` so a sweep never blocks on an empty
/// queue; arrivals during a sweep stay queued for the next pass.
pub struct InMemoryWorkQueue<T> {
    items: VecDeque<T>,
}

impl<T> InMemoryWorkQueue<T> {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }

    /// Append an item at the tail.
    pub fn enqueue(&mut self, item: T) {
        self.items.push_back(item);
    }

    /// Pop the head item without waiting; `None` when nothing is queued.
    pub fn try_dequeue(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    /// Current depth.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the queue holds no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> Default for InMemoryWorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
