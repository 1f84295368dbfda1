//! Overlap guard: at most one run of a job at a time.
//!
//! With [`OverlapPolicy::Skip`] a tick that finds the job running is dropped.
//! With [`OverlapPolicy::Queue`] one tick may wait for the running one to
//! finish; any tick beyond that is dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use refresh_types::OverlapPolicy;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Tracks whether a job is running and whether a tick is waiting.
pub struct OverlapGuard {
    running: Arc<Semaphore>,
    waiting: AtomicBool,
    policy: OverlapPolicy,
}

impl OverlapGuard {
    pub fn new(policy: OverlapPolicy) -> Self {
        Self {
            running: Arc::new(Semaphore::new(1)),
            waiting: AtomicBool::new(false),
            policy,
        }
    }

    /// Get permission to run, or `None` if this tick must be skipped.
    ///
    /// Under `Queue` the first contended caller waits here for the running
    /// job to release its guard.
    pub async fn acquire(&self) -> Option<RunGuard> {
        if let Ok(permit) = Arc::clone(&self.running).try_acquire_owned() {
            return Some(RunGuard { _permit: permit });
        }

        match self.policy {
            OverlapPolicy::Skip => None,
            OverlapPolicy::Queue => {
                if self
                    .waiting
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
                {
                    return None;
                }
                // clears the flag even if this future is dropped while waiting
                let _slot = WaitingSlot(&self.waiting);
                let permit = Arc::clone(&self.running).acquire_owned().await.ok();
                permit.map(|p| RunGuard { _permit: p })
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.available_permits() == 0
    }

    /// True while a queued tick waits for the running one.
    pub fn has_waiter(&self) -> bool {
        self.waiting.load(Ordering::SeqCst)
    }

    pub fn policy(&self) -> OverlapPolicy {
        self.policy
    }
}

/// Held for the duration of one run; released on drop, including on panic.
pub struct RunGuard {
    _permit: OwnedSemaphorePermit,
}

struct WaitingSlot<'a>(&'a AtomicBool);

impl Drop for WaitingSlot<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_skip_drops_contended_tick() {
        let guard = OverlapGuard::new(OverlapPolicy::Skip);

        let first = guard.acquire().await;
        assert!(first.is_some());
        assert!(guard.is_running());
        assert!(guard.acquire().await.is_none());

        drop(first);
        assert!(!guard.is_running());
        assert!(guard.acquire().await.is_some());
    }

    #[tokio::test]
    async fn test_queue_admits_one_waiter() {
        let guard = Arc::new(OverlapGuard::new(OverlapPolicy::Queue));
        let first = guard.acquire().await.unwrap();

        let waiter = Arc::clone(&guard);
        let queued = tokio::spawn(async move { waiter.acquire().await.is_some() });
        while !guard.has_waiter() {
            tokio::task::yield_now().await;
        }

        // a third tick while one is already queued is dropped
        assert!(guard.acquire().await.is_none());

        drop(first);
        assert!(queued.await.unwrap());
        assert!(!guard.has_waiter());
        assert!(!guard.is_running());
    }

    #[tokio::test]
    async fn test_abandoned_waiter_frees_the_queue_slot() {
        let guard = Arc::new(OverlapGuard::new(OverlapPolicy::Queue));
        let _first = guard.acquire().await.unwrap();

        let waiter = Arc::clone(&guard);
        let queued = tokio::spawn(async move {
            let _ = waiter.acquire().await;
        });
        while !guard.has_waiter() {
            tokio::task::yield_now().await;
        }
        queued.abort();
        let _ = queued.await;

        assert!(!guard.has_waiter());
    }

    #[tokio::test]
    async fn test_guard_released_when_run_panics() {
        let guard = Arc::new(OverlapGuard::new(OverlapPolicy::Skip));
        let inner = Arc::clone(&guard);
        let result = tokio::spawn(async move {
            let _run = inner.acquire().await.unwrap();
            panic!("job failed hard");
        })
        .await;

        assert!(result.is_err());
        assert!(!guard.is_running());
    }

    #[test]
    fn test_policy_accessor() {
        assert_eq!(
            OverlapGuard::new(OverlapPolicy::Queue).policy(),
            OverlapPolicy::Queue
        );
    }
}
