//! Internal session record guarded by the controller lock.

use super::countdown::CountdownCancel;
use super::segments::SegmentStore;
use super::ticker::ElapsedTicker;
use crate::encoder::ProcessGroup;
use crate::error::SessionError;
use stitchcap_common::{CaptureParams, SessionState};
use tokio::sync::watch;

/// Controller phase. Finer grained than [`SessionState`]: it also tracks the
/// windows where an encoder is being launched or drained.
#[derive(Debug)]
pub(crate) enum Phase {
    Idle,
    CountingDown {
        attempt: u64,
        cancel: CountdownCancel,
    },
    /// Encoder spawn in flight, lock released
    Launching {
        store: SegmentStore,
        resuming: bool,
    },
    Recording {
        store: SegmentStore,
    },
    /// Pause requested, waiting for the encoder to exit
    Pausing {
        store: SegmentStore,
    },
    Paused {
        store: SegmentStore,
    },
    Finalizing,
}

impl Phase {
    pub fn public_state(&self) -> SessionState {
        match self {
            Phase::Idle => SessionState::Idle,
            Phase::CountingDown { .. } => SessionState::CountingDown,
            Phase::Launching { resuming: false, .. } => SessionState::CountingDown,
            Phase::Launching { resuming: true, .. } => SessionState::Paused,
            Phase::Recording { .. } | Phase::Pausing { .. } => SessionState::Recording,
            Phase::Paused { .. } => SessionState::Paused,
            Phase::Finalizing => SessionState::Finalizing,
        }
    }

    pub fn store(&self) -> Option<&SegmentStore> {
        match self {
            Phase::Launching { store, .. }
            | Phase::Recording { store }
            | Phase::Pausing { store }
            | Phase::Paused { store } => Some(store),
            Phase::Idle | Phase::CountingDown { .. } | Phase::Finalizing => None,
        }
    }
}

/// Why the current encoder is expected to exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExitIntent {
    None,
    Pause,
    Stop,
}

/// The running encoder, if any.
#[derive(Debug)]
pub(crate) struct ActiveEncoder {
    pub generation: u64,
    pub group: ProcessGroup,
    pub intent: ExitIntent,
    /// Flips to `true` after the slot has been cleared
    pub exited: watch::Receiver<bool>,
}

#[derive(Debug)]
pub(crate) struct Session {
    pub phase: Phase,
    pub encoder: Option<ActiveEncoder>,
    pub elapsed_seconds: u64,
    pub last_error: Option<SessionError>,
    pub params: CaptureParams,
    pub ticker: ElapsedTicker,
    /// Set by shutdown; encoders that finish launching afterwards are
    /// terminated
    pub closed: bool,
    next_generation: u64,
    next_attempt: u64,
}

impl Session {
    pub fn new(params: CaptureParams, ticker: ElapsedTicker) -> Self {
        Self {
            phase: Phase::Idle,
            encoder: None,
            elapsed_seconds: 0,
            last_error: None,
            params,
            ticker,
            closed: false,
            next_generation: 0,
            next_attempt: 0,
        }
    }

    /// Id for the next encoder launch.
    pub fn next_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    /// Id for the next start request.
    pub fn next_attempt(&mut self) -> u64 {
        self.next_attempt += 1;
        self.next_attempt
    }

    pub fn state(&self) -> SessionState {
        self.phase.public_state()
    }

    /// Whether the given encoder is the live, unrequested one.
    pub fn is_live(&self, generation: u64) -> bool {
        matches!(self.phase, Phase::Recording { .. })
            && self
                .encoder
                .as_ref()
                .is_some_and(|e| e.generation == generation && e.intent == ExitIntent::None)
    }
}
