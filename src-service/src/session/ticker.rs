//! Periodic elapsed-time ticker.

use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Calls a callback once per period until stopped.
///
/// The first call happens one full period after `start`. The callback
/// decides whether the tick counts; returning `Break` ends the task.
#[derive(Debug)]
pub struct ElapsedTicker {
    period: Duration,
    task: Option<JoinHandle<()>>,
}

impl ElapsedTicker {
    pub fn new(period: Duration) -> Self {
        Self { period, task: None }
    }

    pub fn start<F, Fut>(&mut self, mut on_tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send + 'static,
    {
        self.stop();
        let period = self.period;
        self.task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if on_tick().await.is_break() {
                    break;
                }
            }
        }));
    }

    /// Stop ticking. Safe to call when not running.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for ElapsedTicker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    fn counting(ticker: &mut ElapsedTicker, limit: u64) -> Arc<AtomicU64> {
        let count = Arc::new(AtomicU64::new(0));
        let counter = count.clone();
        ticker.start(move || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n >= limit {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            }
        });
        count
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_once_per_period() {
        let mut ticker = ElapsedTicker::new(Duration::from_secs(1));
        let count = counting(&mut ticker, u64::MAX);

        tokio::time::sleep(Duration::from_millis(999)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(2501)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert!(ticker.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_halts_ticks() {
        let mut ticker = ElapsedTicker::new(Duration::from_secs(1));
        let count = counting(&mut ticker, u64::MAX);

        tokio::time::sleep(Duration::from_millis(2500)).await;
        ticker.stop();
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(!ticker.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_break_ends_task() {
        let mut ticker = ElapsedTicker::new(Duration::from_secs(1));
        let count = counting(&mut ticker, 2);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(!ticker.is_running());
    }
}
