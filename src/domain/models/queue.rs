use std::cmp::Ordering;
use std::collections::VecDeque;

use crate::domain::errors::{DomainError, DomainResult};

/// Priority queue item wrapper
///
/// Higher priority values are dequeued first.
#[derive(Debug, Clone)]
pub struct QueueItem<T> {
    /// Priority value (higher values = higher priority)
    pub priority: i32,
    /// The wrapped item
    pub item: T,
}

impl<T> PartialEq for QueueItem<T> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority
    }
}

impl<T> Eq for QueueItem<T> {}

impl<T> PartialOrd for QueueItem<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for QueueItem<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher priority comes first (reverse ordering)
        other.priority.cmp(&self.priority)
    }
}

/// Bounded priority queue for analysis jobs
///
/// Items with higher priority values are dequeued before items with lower
/// priority values. Items with equal priority are dequeued in FIFO order.
/// Once `max_depth` items are queued, further enqueues are rejected and the
/// queue is left unchanged.
///
/// # Examples
///
/// ```
/// use cadence::domain::models::JobQueue;
///
/// let mut queue = JobQueue::bounded(10);
/// queue.try_enqueue("low priority", 1).unwrap();
/// queue.try_enqueue("high priority", 10).unwrap();
/// queue.try_enqueue("urgent", i32::MAX).unwrap();
///
/// assert_eq!(queue.dequeue(), Some("urgent"));
/// assert_eq!(queue.dequeue(), Some("high priority"));
/// assert_eq!(queue.dequeue(), Some("low priority"));
/// ```
#[derive(Debug, Clone)]
pub struct JobQueue<T> {
    items: VecDeque<QueueItem<T>>,
    max_depth: usize,
}

impl<T> JobQueue<T> {
    /// Creates an empty queue that never rejects
    pub fn new() -> Self {
        Self::bounded(usize::MAX)
    }

    /// Creates an empty queue holding at most `max_depth` items
    pub fn bounded(max_depth: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(max_depth.min(1024)),
            max_depth,
        }
    }

    /// Adds an item, keeping priority order and FIFO within a priority band
    ///
    /// Returns `QueueFull` without modifying the queue when at capacity.
    pub fn try_enqueue(&mut self, item: T, priority: i32) -> DomainResult<()> {
        if self.items.len() >= self.max_depth {
            return Err(DomainError::QueueFull {
                depth: self.items.len(),
                max_depth: self.max_depth,
            });
        }

        let queue_item = QueueItem { priority, item };

        // Insert before the first strictly lower priority item
        let position = self
            .items
            .iter()
            .position(|existing| queue_item < *existing)
            .unwrap_or(self.items.len());

        self.items.insert(position, queue_item);
        Ok(())
    }

    /// Removes and returns the highest priority item
    pub fn dequeue(&mut self) -> Option<T> {
        self.items.pop_front().map(|queue_item| queue_item.item)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Removes all items, returning them in priority order
    pub fn drain(&mut self) -> Vec<T> {
        self.items.drain(..).map(|queue_item| queue_item.item).collect()
    }

    /// Removes and returns the first item matching a predicate
    pub fn remove_first<F>(&mut self, predicate: F) -> Option<T>
    where
        F: Fn(&T) -> bool,
    {
        let index = self.items.iter().position(|queue_item| predicate(&queue_item.item))?;
        self.items.remove(index).map(|queue_item| queue_item.item)
    }
}

impl<T> Default for JobQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
