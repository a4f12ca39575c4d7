//! Bounded FIFO work queue (spec §4.3), shared between the Stratum V1/V2
//! clients and the job builder. Capacity fixed at 12, matching the
//! original firmware's `work_queue.h` ring buffer.

use std::collections::VecDeque;
use tokio::sync::{Mutex, Notify};
use tokio::time::{timeout, Duration};

pub const CAPACITY: usize = 12;

struct Inner<T> {
    items: VecDeque<T>,
}

/// Async bounded queue with blocking (task-suspending, not OS-thread
/// blocking) enqueue/dequeue, matching the original's semantics on top of
/// `tokio` rather than a raw RTOS queue.
pub struct WorkQueue<T> {
    inner: Mutex<Inner<T>>,
    not_empty: Notify,
    not_full: Notify,
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner { items: VecDeque::with_capacity(CAPACITY) }),
            not_empty: Notify::new(),
            not_full: Notify::new(),
        }
    }

    /// Exact snapshot of the current length.
    pub async fn count(&self) -> usize {
        self.inner.lock().await.items.len()
    }

    /// Suspends while the queue is full.
    pub async fn enqueue(&self, item: T) {
        loop {
            {
                let mut guard = self.inner.lock().await;
                if guard.items.len() < CAPACITY {
                    guard.items.push_back(item);
                    drop(guard);
                    self.not_empty.notify_one();
                    return;
                }
            }
            self.not_full.notified().await;
        }
    }

    /// Suspends while the queue is empty.
    pub async fn dequeue(&self) -> T {
        loop {
            {
                let mut guard = self.inner.lock().await;
                if let Some(item) = guard.items.pop_front() {
                    drop(guard);
                    self.not_full.notify_one();
                    return item;
                }
            }
            self.not_empty.notified().await;
        }
    }

    /// Returns `None` if nothing arrives within `wait`.
    pub async fn dequeue_timeout(&self, wait: Duration) -> Option<T> {
        timeout(wait, self.dequeue()).await.ok()
    }

    /// Pops every item, applying `destructor` to each (the "free differently
    /// per protocol" behavior spec §4.3 calls out), atomically with respect
    /// to concurrent enqueue/dequeue: the mutex is held for the whole drain.
    pub async fn clear(&self, mut destructor: impl FnMut(T)) {
        let mut guard = self.inner.lock().await;
        while let Some(item) = guard.items.pop_front() {
            destructor(item);
        }
        drop(guard);
        self.not_full.notify_waiters();
    }
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn fifo_order_is_preserved() {
        let queue: WorkQueue<u32> = WorkQueue::new();
        queue.enqueue(1).await;
        queue.enqueue(2).await;
        queue.enqueue(3).await;
        assert_eq!(queue.count().await, 3);
        assert_eq!(queue.dequeue().await, 1);
        assert_eq!(queue.dequeue().await, 2);
        assert_eq!(queue.dequeue().await, 3);
    }

    #[tokio::test]
    async fn dequeue_timeout_returns_none_when_empty() {
        let queue: WorkQueue<u32> = WorkQueue::new();
        let result = queue.dequeue_timeout(Duration::from_millis(20)).await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn enqueue_blocks_until_capacity_frees_up() {
        let queue = Arc::new(WorkQueue::new());
        for i in 0..CAPACITY as u32 {
            queue.enqueue(i).await;
        }
        assert_eq!(queue.count().await, CAPACITY);

        let producer_queue = queue.clone();
        let producer = tokio::spawn(async move {
            producer_queue.enqueue(999).await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!producer.is_finished());

        let popped = queue.dequeue().await;
        assert_eq!(popped, 0);

        producer.await.unwrap();
        assert_eq!(queue.count().await, CAPACITY);
    }

    #[tokio::test]
    async fn clear_runs_destructor_on_every_item_and_empties_queue() {
        let queue: WorkQueue<u32> = WorkQueue::new();
        queue.enqueue(10).await;
        queue.enqueue(20).await;
        let mut freed = Vec::new();
        queue.clear(|item| freed.push(item)).await;
        assert_eq!(freed, vec![10, 20]);
        assert_eq!(queue.count().await, 0);
    }
}
