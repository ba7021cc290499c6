//! Recording session controller.
//!
//! A session records one or more segments (one encoder process each) and
//! merges them into a single file on stop. Pausing ends the current encoder;
//! resuming starts a new one writing the next segment.
//!
//! All session data sits behind one async mutex. The lock is taken only to
//! read or flip state: process spawns, waits and the merge happen with the
//! lock released, and the phase is re-checked afterwards.

mod countdown;
pub mod events;
pub mod indicator;
pub mod segments;
mod state;
pub mod ticker;


pub use countdown::CountdownResult;
pub use events::{dispatch, spawn_observer, SessionEvent, SessionObserver, EVENT_CHANNEL_CAPACITY};
pub use indicator::{format_elapsed, Affordances, Indicator, IndicatorIcon};
pub use segments::{SegmentDescriptor, SegmentStore, SessionId};

use crate::config::SessionConfig;
use crate::encoder::{CaptureLauncher, EncoderExit, EncoderHandle, ProcessGroup};
use crate::error::SessionError;
use crate::merge::ConcatMerger;
use crate::storage::StorageRoot;
use chrono::Local;
use countdown::Countdown;
use state::{ActiveEncoder, ExitIntent, Phase, Session};
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use stitchcap_common::{CaptureParams, SessionState};
use ticker::ElapsedTicker;
use tokio::sync::{broadcast, watch, Mutex, Notify};
use tracing::{debug, error, info, warn};

/// Extra time given to an encoder after SIGTERM before giving up on it.
const FORCE_STOP_GRACE: Duration = Duration::from_secs(2);

/// What to do with a session whose encoder exited without being asked.
enum SelfExit {
    Discard(SessionError, SegmentStore),
    Finalize(SegmentStore),
}

/// Timing knobs for the controller.
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    /// Countdown length before the first segment starts
    pub countdown_secs: u32,
    /// Length of one countdown step
    pub countdown_step: Duration,
    /// Elapsed-time tick period
    pub tick_period: Duration,
    /// How long a graceful stop may take before the group is terminated
    pub stop_timeout: Duration,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            countdown_secs: 3,
            countdown_step: Duration::from_secs(1),
            tick_period: Duration::from_secs(1),
            stop_timeout: Duration::from_secs(10),
        }
    }
}

impl ControllerOptions {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            countdown_secs: config.countdown_secs,
            stop_timeout: config.stop_timeout(),
            ..Self::default()
        }
    }
}

/// Result of a start request that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// The first segment is recording
    Recording,
    /// The countdown was cancelled
    Cancelled,
}

/// Point-in-time view of the session.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub elapsed_seconds: u64,
    /// Number of segments allocated in the current session
    pub segment_index: u32,
    pub segments: Vec<PathBuf>,
    pub manifest_path: Option<PathBuf>,
    pub encoder_pid: Option<u32>,
    pub last_error: Option<SessionError>,
}

struct Shared {
    session: Mutex<Session>,
    launcher: Arc<dyn CaptureLauncher>,
    merger: ConcatMerger,
    storage: Arc<dyn StorageRoot>,
    options: ControllerOptions,
    events: broadcast::Sender<SessionEvent>,
    /// Woken whenever an encoder launch leaves `Phase::Launching`
    launch_settled: Notify,
}

/// Drives recording sessions. Cheap to clone; clones share the session.
#[derive(Clone)]
pub struct SessionController {
    shared: Arc<Shared>,
}

impl SessionController {
    pub fn new(
        launcher: Arc<dyn CaptureLauncher>,
        merger: ConcatMerger,
        storage: Arc<dyn StorageRoot>,
        params: CaptureParams,
        options: ControllerOptions,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let ticker = ElapsedTicker::new(options.tick_period);
        Self {
            shared: Arc::new(Shared {
                session: Mutex::new(Session::new(params, ticker)),
                launcher,
                merger,
                storage,
                options,
                events,
                launch_settled: Notify::new(),
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    pub async fn state(&self) -> SessionState {
        self.shared.session.lock().await.state()
    }

    /// Seconds spent recording in the current (or last) session.
    pub async fn elapsed_seconds(&self) -> u64 {
        self.shared.session.lock().await.elapsed_seconds
    }

    pub async fn last_error(&self) -> Option<SessionError> {
        self.shared.session.lock().await.last_error.clone()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let session = self.shared.session.lock().await;
        let store = session.phase.store();
        SessionSnapshot {
            state: session.state(),
            elapsed_seconds: session.elapsed_seconds,
            segment_index: store.map_or(0, |s| s.segment_index()),
            segments: store.map(|s| s.segment_paths()).unwrap_or_default(),
            manifest_path: store.map(|s| s.manifest_path().to_path_buf()),
            encoder_pid: session.encoder.as_ref().map(|e| e.group.pid()),
            last_error: session.last_error.clone(),
        }
    }

    pub async fn capture_params(&self) -> CaptureParams {
        self.shared.session.lock().await.params.clone()
    }

    /// Replace the capture parameters. Only allowed while idle since all
    /// segments of a session must be encoded identically.
    pub async fn set_capture_params(&self, params: CaptureParams) -> Result<(), SessionError> {
        let mut session = self.shared.session.lock().await;
        if session.state() != SessionState::Idle {
            return Err(SessionError::Busy);
        }
        session.params = params;
        Ok(())
    }

    /// Start a new session: count down, then launch the first segment.
    ///
    /// Resolves once the first encoder is running, the countdown was
    /// cancelled, or the launch failed.
    pub async fn request_start(&self) -> Result<StartOutcome, SessionError> {
        let (attempt, countdown) = {
            let mut session = self.shared.session.lock().await;
            if !matches!(session.phase, Phase::Idle) {
                let state = session.state();
                info!("Start ignored, session is {}", state);
                return Err(SessionError::AlreadyInProgress(state));
            }
            let attempt = session.next_attempt();
            let (cancel, countdown) = countdown::countdown(
                self.shared.options.countdown_secs,
                self.shared.options.countdown_step,
            );
            session.phase = Phase::CountingDown { attempt, cancel };
            session.last_error = None;
            session.elapsed_seconds = 0;
            (attempt, countdown)
        };
        info!(
            "Recording starts in {}s",
            self.shared.options.countdown_secs
        );
        self.shared
            .emit(SessionEvent::StateChanged(SessionState::CountingDown));

        // Runs detached so a dropped caller cannot strand the session
        // between phases.
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move { shared.run_start(attempt, countdown).await })
            .await
            .map_err(|e| SessionError::Internal(e.to_string()))?
    }

    /// Abort the countdown and return to idle.
    pub async fn cancel_countdown(&self) -> Result<(), SessionError> {
        let cancel = {
            let mut session = self.shared.session.lock().await;
            match std::mem::replace(&mut session.phase, Phase::Idle) {
                Phase::CountingDown { cancel, .. } => cancel,
                other => {
                    session.phase = other;
                    return Err(SessionError::InvalidState {
                        action: "cancel countdown",
                        state: session.state(),
                    });
                }
            }
        };
        cancel.cancel();
        info!("Countdown cancelled");
        self.shared
            .emit(SessionEvent::StateChanged(SessionState::Idle));
        Ok(())
    }

    /// Pause: end the current segment. Returns once the encoder has exited.
    pub async fn request_pause(&self) -> Result<(), SessionError> {
        let (group, mut exited) = {
            let mut session = self.shared.session.lock().await;
            let state = session.state();
            let rejected = SessionError::InvalidState {
                action: "pause",
                state,
            };
            if !matches!(session.phase, Phase::Recording { .. }) {
                return Err(rejected);
            }
            let Some(active) = session
                .encoder
                .as_mut()
                .filter(|e| e.intent == ExitIntent::None)
            else {
                return Err(rejected);
            };
            active.intent = ExitIntent::Pause;
            let drain = (active.group, active.exited.clone());

            if let Phase::Recording { store } = std::mem::replace(&mut session.phase, Phase::Idle) {
                session.phase = Phase::Pausing { store };
            }
            session.ticker.stop();
            drain
        };

        info!("Pausing, interrupting encoder (pid {})", group.pid());
        if let Err(e) = group.interrupt() {
            warn!("Failed to interrupt encoder (pid {}): {}", group.pid(), e);
        }
        self.shared.await_exit(group, &mut exited).await;

        let paused = {
            let mut session = self.shared.session.lock().await;
            match std::mem::replace(&mut session.phase, Phase::Idle) {
                Phase::Pausing { store } => {
                    session.phase = Phase::Paused { store };
                    true
                }
                other => {
                    // A stop took over while the encoder was draining
                    session.phase = other;
                    false
                }
            }
        };
        if paused {
            info!("Recording paused");
            self.shared
                .emit(SessionEvent::StateChanged(SessionState::Paused));
        }
        Ok(())
    }

    /// Resume: launch a new encoder writing the next segment.
    pub async fn request_resume(&self) -> Result<(), SessionError> {
        let (segment, params, generation) = {
            let mut session = self.shared.session.lock().await;
            let state = session.state();
            let mut store = match std::mem::replace(&mut session.phase, Phase::Idle) {
                Phase::Paused { store } => store,
                other => {
                    session.phase = other;
                    return Err(SessionError::InvalidState {
                        action: "resume",
                        state,
                    });
                }
            };
            let segment = store.allocate_next().clone();
            session.phase = Phase::Launching {
                store,
                resuming: true,
            };
            (segment, session.params.clone(), session.next_generation())
        };

        info!(
            "Resuming with segment {} -> {}",
            segment.index(),
            segment.path().display()
        );
        let result = match self.shared.launcher.launch(segment.path(), &params) {
            Ok(handle) => self.shared.register_encoder(handle, generation, segment).await,
            Err(e) => {
                error!("Failed to launch encoder on resume: {}", e);
                let err = SessionError::Launch(e);
                let mut session = self.shared.session.lock().await;
                match std::mem::replace(&mut session.phase, Phase::Idle) {
                    Phase::Launching { mut store, .. } => {
                        store.discard_last();
                        session.phase = Phase::Paused { store };
                    }
                    other => session.phase = other,
                }
                session.last_error = Some(err.clone());
                Err(err)
            }
        };
        self.shared.launch_settled.notify_waiters();
        result
    }

    /// Stop: end the current segment if any, merge all segments and return
    /// the final file. A stop issued while an encoder is launching waits for
    /// the launch to settle first.
    pub async fn request_stop(&self) -> Result<PathBuf, SessionError> {
        self.shared.stop().await
    }

    /// Bring the session down for process exit. Stops (and merges) an active
    /// recording within `grace`, then terminates any encoder group that is
    /// still known.
    pub async fn shutdown(&self, grace: Duration) -> Option<PathBuf> {
        // A launch in flight becomes a recording that the stop below can
        // finalize
        if tokio::time::timeout(grace, self.shared.settle_launch())
            .await
            .is_err()
        {
            warn!("Encoder launch still in flight after {:?}", grace);
        }
        self.shared.session.lock().await.closed = true;

        let (state, before) = {
            let session = self.shared.session.lock().await;
            (session.state(), session.encoder.as_ref().map(|e| e.group))
        };

        let mut saved = None;
        match state {
            SessionState::CountingDown => {
                let _ = self.cancel_countdown().await;
            }
            SessionState::Recording | SessionState::Paused => {
                let controller = self.clone();
                let stop = tokio::spawn(async move { controller.request_stop().await });
                match tokio::time::timeout(grace, stop).await {
                    Ok(Ok(Ok(path))) => saved = Some(path),
                    Ok(Ok(Err(e))) => warn!("Stop during shutdown failed: {}", e),
                    Ok(Err(e)) => error!("Stop task failed: {}", e),
                    Err(_) => warn!("Recording not finalized within {:?}", grace),
                }
            }
            SessionState::Idle | SessionState::Finalizing => {}
        }

        let after = {
            let session = self.shared.session.lock().await;
            session.encoder.as_ref().map(|e| e.group)
        };
        for group in before.into_iter().chain(after) {
            debug!("Terminating encoder group {}", group.pid());
            if let Err(e) = group.terminate() {
                warn!("Failed to terminate encoder group {}: {}", group.pid(), e);
            }
        }
        saved
    }
}

impl Shared {
    fn emit(&self, event: SessionEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }

    /// Wait until no encoder launch is in flight.
    async fn settle_launch(&self) {
        loop {
            let settled = self.launch_settled.notified();
            if !matches!(self.session.lock().await.phase, Phase::Launching { .. }) {
                return;
            }
            settled.await;
        }
    }

    async fn stop(&self) -> Result<PathBuf, SessionError> {
        let (store, drain) = loop {
            let settled = self.launch_settled.notified();
            let mut session = self.session.lock().await;
            let state = session.state();
            match std::mem::replace(&mut session.phase, Phase::Finalizing) {
                Phase::Recording { store } => {
                    session.ticker.stop();
                    let drain = session.encoder.as_mut().map(|active| {
                        active.intent = ExitIntent::Stop;
                        (active.group, active.exited.clone(), true)
                    });
                    break (store, drain);
                }
                Phase::Pausing { store } => {
                    // Already interrupted by the pause; just wait for it
                    let drain = session.encoder.as_mut().map(|active| {
                        active.intent = ExitIntent::Stop;
                        (active.group, active.exited.clone(), false)
                    });
                    break (store, drain);
                }
                Phase::Paused { store } => break (store, None),
                launching @ Phase::Launching { .. } => {
                    session.phase = launching;
                    drop(session);
                    debug!("Stop waits for the encoder launch to settle");
                    settled.await;
                }
                other => {
                    session.phase = other;
                    info!("Stop ignored, session is {}", state);
                    return Err(SessionError::InvalidState {
                        action: "stop",
                        state,
                    });
                }
            }
        };
        info!("Stopping recording");
        self.emit(SessionEvent::StateChanged(SessionState::Finalizing));

        if let Some((group, mut exited, interrupt)) = drain {
            if interrupt {
                if let Err(e) = group.interrupt() {
                    warn!("Failed to interrupt encoder (pid {}): {}", group.pid(), e);
                }
            }
            self.await_exit(group, &mut exited).await;
        }
        self.finalize(store).await
    }

    /// Merge the session's segments and return to idle. The phase must
    /// already be `Finalizing` and the encoder gone.
    async fn finalize(&self, store: SegmentStore) -> Result<PathBuf, SessionError> {
        let output = segments::final_output_path(store.dir(), store.container(), Local::now());
        info!(
            "Merging {} segment(s) into {}",
            store.segment_index(),
            output.display()
        );
        let result = self
            .merger
            .merge_blocking(
                store.segment_paths(),
                store.manifest_path().to_path_buf(),
                output,
            )
            .await
            .map_err(SessionError::from);

        {
            let mut session = self.session.lock().await;
            session.phase = Phase::Idle;
            session.last_error = result.as_ref().err().cloned();
        }
        match &result {
            Ok(path) => info!("Recording saved to {}", path.display()),
            Err(e) => error!(
                "Failed to merge recording, segments kept in {}: {}",
                store.dir().display(),
                e
            ),
        }
        self.emit(SessionEvent::StateChanged(SessionState::Idle));
        self.emit(SessionEvent::Finished {
            final_path: result.as_ref().ok().cloned(),
            error: result.as_ref().err().cloned(),
        });
        result
    }

    async fn run_start(
        self: Arc<Self>,
        attempt: u64,
        countdown: Countdown,
    ) -> Result<StartOutcome, SessionError> {
        let events = self.events.clone();
        let result = countdown
            .run(|remaining| {
                debug!("Recording starts in {}", remaining);
                let _ = events.send(SessionEvent::Countdown { remaining });
            })
            .await;
        if result == CountdownResult::Cancelled {
            return Ok(StartOutcome::Cancelled);
        }

        let dir = match self.storage.ensure_dir() {
            Ok(dir) => dir,
            Err(e) => {
                error!("Output directory unavailable: {}", e);
                return self
                    .fail_start(Some(attempt), SessionError::Storage(Arc::new(e)))
                    .await;
            }
        };

        let (segment, params, generation) = {
            let mut session = self.session.lock().await;
            match &session.phase {
                Phase::CountingDown {
                    attempt: current, ..
                } if *current == attempt => {}
                _ => return Ok(StartOutcome::Cancelled),
            }
            let mut store = SegmentStore::new(dir, SessionId::new(), session.params.container);
            let segment = store.allocate_next().clone();
            session.phase = Phase::Launching {
                store,
                resuming: false,
            };
            (segment, session.params.clone(), session.next_generation())
        };

        info!(
            "Starting segment {} -> {}",
            segment.index(),
            segment.path().display()
        );
        let result = match self.launcher.launch(segment.path(), &params) {
            Ok(handle) => self
                .register_encoder(handle, generation, segment)
                .await
                .map(|()| StartOutcome::Recording),
            Err(e) => {
                error!("Failed to launch encoder: {}", e);
                self.fail_start(None, SessionError::Launch(e)).await
            }
        };
        self.launch_settled.notify_waiters();
        result
    }

    /// Return a failed start to idle. `attempt` identifies a countdown that
    /// must still be current; `None` means the first launch was in flight.
    async fn fail_start(
        &self,
        attempt: Option<u64>,
        err: SessionError,
    ) -> Result<StartOutcome, SessionError> {
        {
            let mut session = self.session.lock().await;
            let current = match &session.phase {
                Phase::CountingDown {
                    attempt: current, ..
                } => Some(*current) == attempt,
                Phase::Launching {
                    resuming: false, ..
                } => attempt.is_none(),
                _ => false,
            };
            if !current {
                return Ok(StartOutcome::Cancelled);
            }
            session.phase = Phase::Idle;
            session.last_error = Some(err.clone());
        }
        self.emit(SessionEvent::StateChanged(SessionState::Idle));
        self.emit(SessionEvent::Finished {
            final_path: None,
            error: Some(err.clone()),
        });
        Err(err)
    }

    /// Record a freshly launched encoder, move to Recording and start
    /// supervising it.
    async fn register_encoder(
        self: &Arc<Self>,
        handle: EncoderHandle,
        generation: u64,
        segment: SegmentDescriptor,
    ) -> Result<(), SessionError> {
        let group = handle.process_group();
        let (exit_tx, exit_rx) = watch::channel(false);
        {
            let mut session = self.session.lock().await;
            let store = match std::mem::replace(&mut session.phase, Phase::Idle) {
                Phase::Launching { store, .. } if !session.closed => store,
                Phase::Launching { .. } => {
                    drop(session);
                    warn!("Controller shut down, terminating encoder (pid {})", group.pid());
                    let _ = group.terminate();
                    self.emit(SessionEvent::StateChanged(SessionState::Idle));
                    return Err(SessionError::Internal(
                        "controller shut down while the encoder was launching".to_string(),
                    ));
                }
                other => {
                    session.phase = other;
                    drop(session);
                    warn!("Launch superseded, terminating encoder (pid {})", group.pid());
                    let _ = group.terminate();
                    return Err(SessionError::Internal(
                        "session changed while the encoder was launching".to_string(),
                    ));
                }
            };
            session.phase = Phase::Recording { store };
            session.encoder = Some(ActiveEncoder {
                generation,
                group,
                intent: ExitIntent::None,
                exited: exit_rx,
            });
            self.start_ticker(&mut session.ticker, generation);
        }

        info!(
            "Recording segment {} (encoder pid {})",
            segment.index(),
            group.pid()
        );
        self.emit(SessionEvent::StateChanged(SessionState::Recording));
        self.emit(SessionEvent::SegmentStarted {
            index: segment.index(),
            path: segment.path().to_path_buf(),
        });

        let shared = Arc::clone(self);
        tokio::spawn(async move {
            let exit = handle.wait().await;
            shared.on_encoder_exit(generation, exit, exit_tx).await;
        });
        Ok(())
    }

    fn start_ticker(self: &Arc<Self>, ticker: &mut ElapsedTicker, generation: u64) {
        let shared = Arc::downgrade(self);
        ticker.start(move || {
            let shared = shared.clone();
            async move {
                match shared.upgrade() {
                    Some(shared) => shared.tick(generation).await,
                    None => ControlFlow::Break(()),
                }
            }
        });
    }

    async fn tick(&self, generation: u64) -> ControlFlow<()> {
        let elapsed_seconds = {
            let mut session = self.session.lock().await;
            if !session.is_live(generation) {
                return ControlFlow::Break(());
            }
            session.elapsed_seconds += 1;
            session.elapsed_seconds
        };
        self.emit(SessionEvent::Tick {
            elapsed_seconds,
            state: SessionState::Recording,
        });
        ControlFlow::Continue(())
    }

    /// Called by the supervisor task when encoder `generation` exits. Clears
    /// the encoder slot before waking anyone waiting on the exit.
    ///
    /// An unrequested exit with a failure status discards the session. A
    /// clean one (the encoder reached its duration cap) finalizes it.
    async fn on_encoder_exit(
        &self,
        generation: u64,
        exit: EncoderExit,
        exit_tx: watch::Sender<bool>,
    ) {
        let outcome = {
            let mut session = self.session.lock().await;
            let current = session
                .encoder
                .as_ref()
                .is_some_and(|e| e.generation == generation);
            if !current {
                None
            } else {
                let intent = session
                    .encoder
                    .take()
                    .map_or(ExitIntent::None, |e| e.intent);
                match intent {
                    ExitIntent::Pause | ExitIntent::Stop => {
                        debug!("Encoder exited on request: {}", exit.describe());
                        None
                    }
                    ExitIntent::None => match std::mem::replace(&mut session.phase, Phase::Idle) {
                        Phase::Recording { store } if exit.success() => {
                            session.ticker.stop();
                            session.phase = Phase::Finalizing;
                            Some(SelfExit::Finalize(store))
                        }
                        Phase::Recording { store } => {
                            session.ticker.stop();
                            let err = SessionError::AbnormalExit(exit.describe());
                            session.last_error = Some(err.clone());
                            Some(SelfExit::Discard(err, store))
                        }
                        other => {
                            session.phase = other;
                            None
                        }
                    },
                }
            }
        };
        exit_tx.send_replace(true);

        match outcome {
            Some(SelfExit::Discard(err, store)) => {
                error!("Encoder exited unexpectedly: {}", exit.describe());
                warn!(
                    "Session discarded without merge, {} segment file(s) left in {}",
                    store.segment_index(),
                    store.dir().display()
                );
                for path in store.segment_paths() {
                    debug!("Unmerged segment: {}", path.display());
                }
                self.emit(SessionEvent::StateChanged(SessionState::Idle));
                self.emit(SessionEvent::Finished {
                    final_path: None,
                    error: Some(err),
                });
            }
            Some(SelfExit::Finalize(store)) => {
                info!("Encoder finished on its own, finalizing recording");
                self.emit(SessionEvent::StateChanged(SessionState::Finalizing));
                // Reported through the Finished event
                let _ = self.finalize(store).await;
            }
            None => {}
        }
    }

    /// Wait for an interrupted encoder to exit, escalating to SIGTERM after
    /// the stop timeout.
    async fn await_exit(&self, group: ProcessGroup, exited: &mut watch::Receiver<bool>) {
        let timeout = self.options.stop_timeout;
        if tokio::time::timeout(timeout, exited.wait_for(|done| *done))
            .await
            .is_ok()
        {
            return;
        }

        warn!(
            "Encoder (pid {}) still running after {:?}, terminating its process group",
            group.pid(),
            timeout
        );
        if let Err(e) = group.terminate() {
            warn!("Failed to terminate encoder group {}: {}", group.pid(), e);
        }
        if tokio::time::timeout(FORCE_STOP_GRACE, exited.wait_for(|done| *done))
            .await
            .is_err()
        {
            error!("Encoder (pid {}) did not exit after SIGTERM", group.pid());
        }
    }
}
