use std::collections::VecDeque;
use tokio::sync::{watch, Mutex};

/// FIFO work queue with asyncio-style drain accounting: every `push` adds an
/// outstanding task that a consumer must balance with `task_done`, and
/// `join` waits until the count reaches zero.
///
/// Queues never fail, they only starve: `push` always succeeds and popping
/// reports emptiness, not errors.
pub struct TaskQueue<T> {
    inner: Mutex<Inner<T>>,
    changed: watch::Sender<()>,
}

struct Inner<T> {
    items: VecDeque<T>,
    outstanding: usize,
    closed: bool,
}

impl<T> Default for TaskQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TaskQueue<T> {
    pub fn new() -> Self {
        let (changed, _) = watch::channel(());
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                outstanding: 0,
                closed: false,
            }),
            changed,
        }
    }

    pub async fn push(&self, item: T) {
        {
            let mut inner = self.inner.lock().await;
            inner.items.push_back(item);
            inner.outstanding += 1;
        }
        self.changed.send_replace(());
    }

    /// Non-blocking pop; `None` signals an empty queue so draining workers
    /// can exit cleanly.
    pub async fn try_pop(&self) -> Option<T> {
        self.inner.lock().await.items.pop_front()
    }

    /// Blocking pop. Returns `None` only once the queue is closed and fully
    /// drained.
    pub async fn pop(&self) -> Option<T> {
        let mut rx = self.changed.subscribe();
        loop {
            {
                let mut inner = self.inner.lock().await;
                if let Some(item) = inner.items.pop_front() {
                    return Some(item);
                }
                if inner.closed {
                    return None;
                }
            }
            let _ = rx.changed().await;
        }
    }

    pub async fn task_done(&self) {
        {
            let mut inner = self.inner.lock().await;
            inner.outstanding = inner.outstanding.saturating_sub(1);
        }
        self.changed.send_replace(());
    }

    /// Wait until every pushed item has been balanced by `task_done`.
    pub async fn join(&self) {
        let mut rx = self.changed.subscribe();
        loop {
            {
                let inner = self.inner.lock().await;
                if inner.outstanding == 0 {
                    return;
                }
            }
            let _ = rx.changed().await;
        }
    }

    /// Close the queue; blocked `pop` calls return `None` once drained.
    pub async fn close(&self) {
        {
            let mut inner = self.inner.lock().await;
            inner.closed = true;
        }
        self.changed.send_replace(());
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.items.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn pops_in_fifo_order() {
        let queue = TaskQueue::new();
        for i in 0..3 {
            queue.push(i).await;
        }
        assert_eq!(queue.try_pop().await, Some(0));
        assert_eq!(queue.try_pop().await, Some(1));
        assert_eq!(queue.try_pop().await, Some(2));
        assert_eq!(queue.try_pop().await, None);
    }

    #[tokio::test]
    async fn join_waits_for_task_done() {
        let queue = Arc::new(TaskQueue::new());
        queue.push("a").await;
        queue.push("b").await;

        let worker_queue = queue.clone();
        let worker = tokio::spawn(async move {
            while let Some(_item) = worker_queue.try_pop().await {
                tokio::time::sleep(Duration::from_millis(5)).await;
                worker_queue.task_done().await;
            }
        });

        queue.join().await;
        assert!(queue.is_empty().await);
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn blocking_pop_wakes_on_push() {
        let queue = Arc::new(TaskQueue::new());
        let consumer_queue = queue.clone();
        let consumer = tokio::spawn(async move { consumer_queue.pop().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.push(7).await;
        assert_eq!(consumer.await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn close_releases_blocked_consumers() {
        let queue: Arc<TaskQueue<u32>> = Arc::new(TaskQueue::new());
        let consumer_queue = queue.clone();
        let consumer = tokio::spawn(async move { consumer_queue.pop().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.close().await;
        assert_eq!(consumer.await.unwrap(), None);
    }

    #[tokio::test]
    async fn closed_queue_drains_remaining_items_first() {
        let queue = TaskQueue::new();
        queue.push(1).await;
        queue.push(2).await;
        queue.close().await;

        assert_eq!(queue.pop().await, Some(1));
        assert_eq!(queue.pop().await, Some(2));
        assert_eq!(queue.pop().await, None);
    }
}
