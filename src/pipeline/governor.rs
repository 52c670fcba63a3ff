use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex};

/// Shared admission state. Only ever observed or mutated under the
/// governor's lock.
#[derive(Debug, Clone, Copy)]
pub struct ConcurrencyState {
    pub current_limit: usize,
    pub active_count: usize,
    /// `None` until the controller makes its first adjustment.
    pub last_change: Option<Instant>,
}

/// Monitor-style gate enforcing the dynamic concurrency limit.
///
/// Workers `acquire` a slot before collecting and `release` it afterwards;
/// the controller moves `current_limit` within `[min_limit, max_limit]`.
/// Every release and limit change wakes all waiters, since a raised limit
/// may admit several of them and a lowered one re-contends the slots.
pub struct Governor {
    state: Mutex<ConcurrencyState>,
    min_limit: usize,
    max_limit: usize,
    changed: watch::Sender<()>,
}

impl Governor {
    pub fn new(initial_limit: usize, min_limit: usize, max_limit: usize) -> Self {
        let (changed, _) = watch::channel(());
        Self {
            state: Mutex::new(ConcurrencyState {
                current_limit: initial_limit.clamp(min_limit, max_limit),
                active_count: 0,
                last_change: None,
            }),
            min_limit,
            max_limit,
            changed,
        }
    }

    /// Block until a slot is free, then claim it. The admission condition is
    /// re-checked after every wakeup so a lowered limit is respected even if
    /// this task was already waiting.
    pub async fn acquire(&self) {
        let mut rx = self.changed.subscribe();
        loop {
            {
                let mut state = self.state.lock().await;
                if state.active_count < state.current_limit {
                    state.active_count += 1;
                    return;
                }
            }
            let _ = rx.changed().await;
        }
    }

    /// Give the slot back and wake all waiters. Never blocks beyond the
    /// state lock.
    pub async fn release(&self) {
        {
            let mut state = self.state.lock().await;
            state.active_count = state.active_count.saturating_sub(1);
        }
        self.changed.send_replace(());
    }

    /// Move the limit to `target`, clamped to the configured bounds. Stamps
    /// the change time and wakes all waiters. Returns the limit actually in
    /// effect.
    pub async fn set_limit(&self, target: usize) -> usize {
        let applied = {
            let mut state = self.state.lock().await;
            state.current_limit = target.clamp(self.min_limit, self.max_limit);
            state.last_change = Some(Instant::now());
            state.current_limit
        };
        self.changed.send_replace(());
        applied
    }

    pub async fn limit(&self) -> usize {
        self.state.lock().await.current_limit
    }

    /// Atomic view of `(active_count, current_limit)` for invariant checks.
    pub async fn observe(&self) -> (usize, usize) {
        let state = self.state.lock().await;
        (state.active_count, state.current_limit)
    }

    /// Time since the last limit change; `Duration::MAX` if it never changed,
    /// so the first adjustment is never blocked by the cooldown.
    pub async fn elapsed_since_change(&self) -> Duration {
        match self.state.lock().await.last_change {
            Some(at) => at.elapsed(),
            None => Duration::MAX,
        }
    }

    pub fn min_limit(&self) -> usize {
        self.min_limit
    }

    pub fn max_limit(&self) -> usize {
        self.max_limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn initial_limit_is_clamped_to_bounds() {
        let governor = Governor::new(50, 1, 10);
        assert_eq!(governor.limit().await, 10);
        let governor = Governor::new(0, 2, 10);
        assert_eq!(governor.limit().await, 2);
    }

    #[tokio::test]
    async fn active_count_never_exceeds_limit() {
        let governor = Arc::new(Governor::new(3, 1, 10));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..20 {
            let governor = governor.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                governor.acquire().await;
                let (active, limit) = governor.observe().await;
                assert!(active <= limit);
                peak.fetch_max(active, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                governor.release().await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(governor.observe().await.0, 0);
    }

    #[tokio::test]
    async fn raising_the_limit_admits_waiters() {
        let governor = Arc::new(Governor::new(1, 1, 10));
        governor.acquire().await;

        let waiter_governor = governor.clone();
        let waiter = tokio::spawn(async move {
            waiter_governor.acquire().await;
            waiter_governor.release().await;
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        governor.set_limit(2).await;
        waiter.await.unwrap();
        governor.release().await;
    }

    #[tokio::test]
    async fn lowered_limit_is_respected_by_new_acquires() {
        let governor = Arc::new(Governor::new(4, 1, 10));
        governor.acquire().await;
        governor.acquire().await;

        assert_eq!(governor.set_limit(1).await, 1);

        // Both slots stay held; a new acquire must wait until the active
        // count drops below the lowered limit.
        let waiter_governor = governor.clone();
        let waiter = tokio::spawn(async move {
            waiter_governor.acquire().await;
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        governor.release().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        governor.release().await;
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn set_limit_clamps_and_stamps() {
        let governor = Governor::new(5, 2, 8);
        assert_eq!(governor.elapsed_since_change().await, Duration::MAX);
        assert_eq!(governor.set_limit(100).await, 8);
        assert_eq!(governor.set_limit(0).await, 2);
        assert!(governor.elapsed_since_change().await < Duration::from_secs(1));
    }
}
