//! Timer Fabric (C8): cancelable delayed callbacks backing the action
//! timeout, inter-hand delay, and abandonment grace period (§4.8, §4.9).

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

/// A single scheduled callback. Cancelling after the callback has already
/// started running is a no-op for that firing — idempotency is the
/// caller's job (force-folding an already-folded seat is itself a no-op).
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

impl TimerHandle {
    pub fn cancel(self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.join.abort();
    }
}

/// Runs `callback` after `delay` unless cancelled first. The cancellation
/// flag is checked right before invocation, closing the race where
/// `cancel` is called just as the sleep completes.
pub fn schedule<F, Fut>(delay: Duration, callback: F) -> TimerHandle
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = cancelled.clone();
    let join = tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if !flag.load(Ordering::SeqCst) {
            callback().await;
        }
    });
    TimerHandle { cancelled, join }
}
