//! Session events and presentation callbacks.

use crate::error::SessionError;
use std::path::{Path, PathBuf};
use stitchcap_common::SessionState;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::warn;

/// Capacity of the controller's event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Events broadcast by the session controller.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Public state changed
    StateChanged(SessionState),
    /// Countdown step, sent once per second before recording
    Countdown { remaining: u32 },
    /// An encoder started writing a new segment
    SegmentStarted { index: u32, path: PathBuf },
    /// Elapsed recording time (sent every second while recording)
    Tick {
        elapsed_seconds: u64,
        state: SessionState,
    },
    /// The session reached Idle after recording; exactly one of the fields
    /// is set
    Finished {
        final_path: Option<PathBuf>,
        error: Option<SessionError>,
    },
}

/// Presentation callbacks. All methods default to no-ops.
pub trait SessionObserver: Send + 'static {
    fn on_tick(&mut self, _elapsed_seconds: u64, _state: SessionState) {}
    fn on_state_changed(&mut self, _state: SessionState) {}
    fn on_finished(&mut self, _final_path: Option<&Path>, _error: Option<&SessionError>) {}
    fn on_countdown(&mut self, _remaining: u32) {}
    fn on_segment_started(&mut self, _index: u32, _path: &Path) {}
}

/// Route one event to the matching callback.
pub fn dispatch<O: SessionObserver + ?Sized>(observer: &mut O, event: &SessionEvent) {
    match event {
        SessionEvent::StateChanged(state) => observer.on_state_changed(*state),
        SessionEvent::Countdown { remaining } => observer.on_countdown(*remaining),
        SessionEvent::SegmentStarted { index, path } => observer.on_segment_started(*index, path),
        SessionEvent::Tick {
            elapsed_seconds,
            state,
        } => observer.on_tick(*elapsed_seconds, *state),
        SessionEvent::Finished { final_path, error } => {
            observer.on_finished(final_path.as_deref(), error.as_ref())
        }
    }
}

/// Feed events from `rx` into `observer` until the channel closes. The
/// observer is handed back when the task ends.
pub fn spawn_observer<O: SessionObserver>(
    mut rx: broadcast::Receiver<SessionEvent>,
    mut observer: O,
) -> JoinHandle<O> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => dispatch(&mut observer, &event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Session observer lagged, skipped {} events", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        observer
    })
}
