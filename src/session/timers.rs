//! One-shot timer slot with replace semantics
//!
//! Scheduling into an occupied slot aborts the previous timer, so at most
//! one pending fire exists per slot at any time.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

/// A named slot holding at most one pending timer task
#[derive(Debug)]
pub struct TimerSlot {
    name: &'static str,
    handle: Option<JoinHandle<()>>,
}

impl TimerSlot {
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self { name, handle: None }
    }

    /// Schedule `action` to run after `delay`, replacing any pending timer
    pub fn schedule<F>(&mut self, delay: Duration, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        debug!(timer = self.name, delay_ms = delay.as_millis() as u64, "timer scheduled");

        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            action.await;
        }));
    }

    /// Abort any pending timer
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            if !handle.is_finished() {
                debug!(timer = self.name, "timer cancelled");
            }
            handle.abort();
        }
    }

    /// Whether a timer is scheduled and has not yet fired
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_schedule_replaces_pending() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut slot = TimerSlot::new("test");

        for _ in 0..3 {
            let fired = Arc::clone(&fired);
            slot.schedule(Duration::from_secs(10), async move {
                fired.fetch_add(1, Ordering::SeqCst);
            });
        }

        tokio::time::sleep(Duration::from_secs(30)).await;
        // Replaced timers never fire
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_fire() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut slot = TimerSlot::new("test");

        let fired_clone = Arc::clone(&fired);
        slot.schedule(Duration::from_secs(5), async move {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert!(slot.is_pending());
        slot.cancel();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(!slot.is_pending());
    }
}
