//! Cancellable pre-recording countdown.

use std::time::Duration;
use tokio::sync::oneshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownResult {
    Elapsed,
    Cancelled,
}

/// Cancels the paired [`Countdown`]. Dropping it cancels as well.
#[derive(Debug)]
pub struct CountdownCancel(oneshot::Sender<()>);

impl CountdownCancel {
    pub fn cancel(self) {
        let _ = self.0.send(());
    }
}

#[derive(Debug)]
pub struct Countdown {
    seconds: u32,
    step: Duration,
    cancelled: oneshot::Receiver<()>,
}

/// Create a countdown of `seconds` steps, each `step` long.
pub fn countdown(seconds: u32, step: Duration) -> (CountdownCancel, Countdown) {
    let (tx, rx) = oneshot::channel();
    (
        CountdownCancel(tx),
        Countdown {
            seconds,
            step,
            cancelled: rx,
        },
    )
}

impl Countdown {
    /// Run to completion, reporting the remaining seconds before each step.
    pub async fn run<F: FnMut(u32)>(mut self, mut on_step: F) -> CountdownResult {
        for remaining in (1..=self.seconds).rev() {
            on_step(remaining);
            tokio::select! {
                _ = tokio::time::sleep(self.step) => {}
                _ = &mut self.cancelled => return CountdownResult::Cancelled,
            }
        }
        CountdownResult::Elapsed
    }
}
