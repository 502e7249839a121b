//! Paces repeated entries into an async operation.

use std::future::Future;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;

/// Spaces successive entries by at least `interval`; when `serialized`, also
/// allows at most one wrapped call at a time across all holders of the gate.
///
/// A single mutex protects the last-entry instant. Waiting callers suspend on
/// the mutex or the sleep, never spin. Dropping the future while it sleeps
/// never records an entry, so a cancelled caller does not consume the slot.
pub struct RateGate {
    interval: Duration,
    serialized: bool,
    last_entry: Mutex<Option<Instant>>,
}

impl RateGate {
    #[must_use]
    pub fn new(interval: Duration, serialized: bool) -> Self {
        Self {
            interval,
            serialized,
            last_entry: Mutex::new(None),
        }
    }

    /// Wait for the gap since the previous entry, then run `f`. When the
    /// gate is serialized the internal lock is held for the whole call.
    pub async fn run<F, T>(&self, f: F) -> T
    where
        F: Future<Output = T>,
    {
        let guard = self.pace().await;
        if self.serialized {
            let out = f.await;
            drop(guard);
            out
        } else {
            drop(guard);
            f.await
        }
    }

    /// Sleep out the remaining gap and record the entry. The returned guard
    /// keeps the gate locked; non-serialized callers drop it immediately.
    async fn pace(&self) -> MutexGuard<'_, Option<Instant>> {
        let mut last = self.last_entry.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.interval {
                tokio::time::sleep(self.interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
        last
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn entries_are_spaced() {
        let gate = RateGate::new(Duration::from_secs(5), false);

        let t0 = Instant::now();
        gate.run(async {}).await;
        assert!(t0.elapsed() < Duration::from_millis(10));

        gate.run(async {}).await;
        assert!(t0.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn serialized_gate_admits_one_at_a_time() {
        let gate = Arc::new(RateGate::new(Duration::ZERO, true));
        let active = Arc::new(AtomicU32::new(0));
        let peak = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let gate = Arc::clone(&gate);
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                gate.run(async {
                    let n = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(n, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                })
                .await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_wait_does_not_consume_the_slot() {
        let gate = Arc::new(RateGate::new(Duration::from_secs(60), false));
        gate.run(async {}).await;

        // A caller that gives up mid-sleep must not push the window out.
        let g = Arc::clone(&gate);
        let waiting = tokio::spawn(async move { g.run(async {}).await });
        tokio::time::sleep(Duration::from_secs(1)).await;
        waiting.abort();
        assert!(waiting.await.is_err());

        let t0 = Instant::now();
        gate.run(async {}).await;
        // 60s window started at the first entry, ~1s already elapsed.
        assert!(t0.elapsed() <= Duration::from_secs(60));
    }
}
