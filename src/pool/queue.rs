//! Priority-ordered task queue
//!
//! Strictly higher priorities dequeue first; equal priorities keep insertion
//! (FIFO) order via a monotonic sequence number. Single-consumer discipline
//! is the dispatcher's job, not the queue's.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::task::Task;

#[derive(Debug)]
struct QueuedTask {
    task: Task,
    seq: u64,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for QueuedTask {}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: higher priority wins, then the lower sequence number
        self.task
            .priority
            .cmp(&other.task.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default)]
pub struct TaskQueue {
    heap: BinaryHeap<QueuedTask>,
    next_seq: u64,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, task: Task) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(QueuedTask { task, seq });
    }

    /// Remove and return the highest-priority pending task, if any.
    pub fn dequeue(&mut self) -> Option<Task> {
        self.heap.pop().map(|queued| queued.task)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Drain everything still queued, highest priority first.
    pub fn drain(&mut self) -> Vec<Task> {
        let mut tasks = Vec::with_capacity(self.heap.len());
        while let Some(task) = self.dequeue() {
            tasks.push(task);
        }
        tasks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn task(id: &str, priority: i64) -> Task {
        Task::new(id, "noop", Value::Null).with_priority(priority)
    }

    #[test]
    fn higher_priority_dequeues_first() {
        let mut queue = TaskQueue::new();
        queue.enqueue(task("low", 1));
        queue.enqueue(task("high", 10));
        queue.enqueue(task("mid", 5));

        assert_eq!(queue.dequeue().unwrap().id, "high");
        assert_eq!(queue.dequeue().unwrap().id, "mid");
        assert_eq!(queue.dequeue().unwrap().id, "low");
        assert!(queue.dequeue().is_none());
    }

    #[test]
    fn equal_priority_preserves_insertion_order() {
        let mut queue = TaskQueue::new();
        for id in ["a", "b", "c", "d"] {
            queue.enqueue(task(id, 0));
        }

        let order: Vec<String> = std::iter::from_fn(|| queue.dequeue())
            .map(|t| t.id)
            .collect();
        assert_eq!(order, ["a", "b", "c", "d"]);
    }

    #[test]
    fn negative_priorities_sort_below_default() {
        let mut queue = TaskQueue::new();
        queue.enqueue(task("deferred", -5));
        queue.enqueue(task("normal", 0));

        assert_eq!(queue.dequeue().unwrap().id, "normal");
        assert_eq!(queue.dequeue().unwrap().id, "deferred");
    }

    #[test]
    fn dequeue_on_empty_returns_none() {
        let mut queue = TaskQueue::new();
        assert!(queue.is_empty());
        assert!(queue.dequeue().is_none());
    }

    #[test]
    fn drain_empties_the_queue_in_priority_order() {
        let mut queue = TaskQueue::new();
        queue.enqueue(task("b", 1));
        queue.enqueue(task("a", 9));
        let drained: Vec<String> = queue.drain().into_iter().map(|t| t.id).collect();

        assert_eq!(drained, ["a", "b"]);
        assert!(queue.is_empty());
    }
}
