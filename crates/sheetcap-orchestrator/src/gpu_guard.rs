//! GPU context serialization (§5: "at most one job may hold the GPU
//! upscale context at a time; a job waiting past `gpu_lock_timeout` falls
//! back to CPU"). Shaped after the teacher's `CircuitBreaker` -- a small
//! state machine guarding access to a flaky shared resource with a timeout
//! fallback -- but here the state is "who holds the context", not a
//! failure count.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// Held while a job's upscale stage is actually running GPU work. Dropping
/// it releases the context to the next waiter.
pub struct GpuPermit {
    _guard: OwnedMutexGuard<()>,
}

/// Process-wide GPU context guard. One instance is shared across every
/// running job via `Arc`.
#[derive(Clone)]
pub struct GpuGuard {
    lock: Arc<Mutex<()>>,
    timeout: Duration,
}

/// What `GpuGuard::acquire` decided for a given job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuDecision {
    /// The GPU context was acquired within `timeout`.
    Granted,
    /// Another job held the context past `timeout`; caller should use the
    /// CPU path instead.
    FallbackToCpu,
}

impl GpuGuard {
    pub fn new(timeout: Duration) -> Self {
        Self { lock: Arc::new(Mutex::new(())), timeout }
    }

    /// Try to acquire exclusive GPU access, waiting up to `timeout` before
    /// giving up in favor of the CPU fallback path.
    pub async fn acquire(&self) -> (GpuDecision, Option<GpuPermit>) {
        match tokio::time::timeout(self.timeout, self.lock.clone().lock_owned()).await {
            Ok(guard) => (GpuDecision::Granted, Some(GpuPermit { _guard: guard })),
            Err(_) => {
                debug!(timeout_secs = self.timeout.as_secs(), "GPU context busy past timeout, falling back to CPU");
                (GpuDecision::FallbackToCpu, None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquires_immediately_when_uncontended() {
        let guard = GpuGuard::new(Duration::from_millis(50));
        let (decision, permit) = guard.acquire().await;
        assert_eq!(decision, GpuDecision::Granted);
        assert!(permit.is_some());
    }

    #[tokio::test]
    async fn falls_back_to_cpu_when_held_past_timeout() {
        let guard = GpuGuard::new(Duration::from_millis(20));
        let (first_decision, held) = guard.acquire().await;
        assert_eq!(first_decision, GpuDecision::Granted);

        let (second_decision, second_permit) = guard.acquire().await;
        assert_eq!(second_decision, GpuDecision::FallbackToCpu);
        assert!(second_permit.is_none());

        drop(held);
    }

    #[tokio::test]
    async fn releases_for_next_waiter_after_drop() {
        let guard = GpuGuard::new(Duration::from_millis(200));
        let (_, held) = guard.acquire().await;
        drop(held);

        let (decision, permit) = guard.acquire().await;
        assert_eq!(decision, GpuDecision::Granted);
        assert!(permit.is_some());
    }
}
