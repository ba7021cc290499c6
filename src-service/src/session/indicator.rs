//! Status-indicator model for tray or terminal front-ends.
//!
//! Folds controller events into what an indicator should show: an icon that
//! blinks while recording, a short status line, and which actions are
//! currently offered.

use super::events::SessionObserver;
use crate::error::SessionError;
use std::path::{Path, PathBuf};
use stitchcap_common::SessionState;

/// Ticks the "resumed" icon stays up after a resume.
pub const RESUME_ICON_TICKS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorIcon {
    Idle,
    Countdown,
    /// Recording, blink phase on
    RecordingOn,
    /// Recording, blink phase off
    RecordingOff,
    /// Recording again just after a resume
    Resumed,
    Paused,
    Finalizing,
}

/// Which controls an indicator should enable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Affordances {
    pub start: bool,
    pub cancel: bool,
    pub pause: bool,
    pub resume: bool,
    pub stop: bool,
}

impl Affordances {
    pub fn for_state(state: SessionState) -> Self {
        Self {
            start: state.can_start(),
            cancel: state == SessionState::CountingDown,
            pause: state.can_pause(),
            resume: state.can_resume(),
            stop: state.can_stop(),
        }
    }
}

/// Format seconds as `MM:SS`; minutes are not wrapped into hours.
pub fn format_elapsed(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

#[derive(Debug, Clone, Default)]
pub struct Indicator {
    state: SessionState,
    elapsed_seconds: u64,
    countdown: Option<u32>,
    blink_on: bool,
    resume_ticks: u32,
    last_output: Option<PathBuf>,
    last_error: Option<String>,
}

impl Indicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.elapsed_seconds
    }

    pub fn last_output(&self) -> Option<&Path> {
        self.last_output.as_deref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn affordances(&self) -> Affordances {
        Affordances::for_state(self.state)
    }

    pub fn icon(&self) -> IndicatorIcon {
        match self.state {
            SessionState::Idle => IndicatorIcon::Idle,
            SessionState::CountingDown => IndicatorIcon::Countdown,
            SessionState::Recording if self.resume_ticks > 0 => IndicatorIcon::Resumed,
            SessionState::Recording if self.blink_on => IndicatorIcon::RecordingOn,
            SessionState::Recording => IndicatorIcon::RecordingOff,
            SessionState::Paused => IndicatorIcon::Paused,
            SessionState::Finalizing => IndicatorIcon::Finalizing,
        }
    }

    pub fn status_text(&self) -> String {
        match self.state {
            SessionState::Idle => match (&self.last_error, &self.last_output) {
                (Some(error), _) => format!("Idle (last recording failed: {error})"),
                (None, Some(path)) => format!("Idle (saved {})", path.display()),
                (None, None) => "Idle".to_string(),
            },
            SessionState::CountingDown => match self.countdown {
                Some(n) => format!("Starting in {n}..."),
                None => "Starting...".to_string(),
            },
            SessionState::Recording => {
                format!("Recording {}", format_elapsed(self.elapsed_seconds))
            }
            SessionState::Paused => format!("Paused {}", format_elapsed(self.elapsed_seconds)),
            SessionState::Finalizing => "Saving recording...".to_string(),
        }
    }
}

impl SessionObserver for Indicator {
    fn on_state_changed(&mut self, state: SessionState) {
        match state {
            SessionState::CountingDown => {
                self.elapsed_seconds = 0;
                self.countdown = None;
                self.last_output = None;
                self.last_error = None;
            }
            SessionState::Recording if self.state == SessionState::Paused => {
                self.resume_ticks = RESUME_ICON_TICKS;
            }
            SessionState::Recording => self.blink_on = true,
            _ => self.resume_ticks = 0,
        }
        self.state = state;
    }

    fn on_countdown(&mut self, remaining: u32) {
        self.countdown = Some(remaining);
    }

    fn on_tick(&mut self, elapsed_seconds: u64, _state: SessionState) {
        self.elapsed_seconds = elapsed_seconds;
        if self.resume_ticks > 0 {
            self.resume_ticks -= 1;
        } else {
            self.blink_on = !self.blink_on;
        }
    }

    fn on_finished(&mut self, final_path: Option<&Path>, error: Option<&SessionError>) {
        self.last_output = final_path.map(Path::to_path_buf);
        self.last_error = error.map(|e| e.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(indicator: &mut Indicator, elapsed: u64) {
        indicator.on_tick(elapsed, SessionState::Recording);
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(0), "00:00");
        assert_eq!(format_elapsed(65), "01:05");
        assert_eq!(format_elapsed(3725), "62:05");
    }

    #[test]
    fn test_affordances_follow_state() {
        let idle = Affordances::for_state(SessionState::Idle);
        assert!(idle.start && !idle.stop && !idle.pause);

        let recording = Affordances::for_state(SessionState::Recording);
        assert!(recording.pause && recording.stop && !recording.start && !recording.resume);

        let paused = Affordances::for_state(SessionState::Paused);
        assert!(paused.resume && paused.stop && !paused.pause);

        let counting = Affordances::for_state(SessionState::CountingDown);
        assert!(counting.cancel && !counting.stop);

        assert_eq!(
            Affordances::for_state(SessionState::Finalizing),
            Affordances::default()
        );
    }

    #[test]
    fn test_icon_blinks_while_recording() {
        let mut indicator = Indicator::new();
        indicator.on_state_changed(SessionState::CountingDown);
        indicator.on_countdown(2);
        assert_eq!(indicator.status_text(), "Starting in 2...");

        indicator.on_state_changed(SessionState::Recording);
        assert_eq!(indicator.icon(), IndicatorIcon::RecordingOn);
        tick(&mut indicator, 1);
        assert_eq!(indicator.icon(), IndicatorIcon::RecordingOff);
        tick(&mut indicator, 2);
        assert_eq!(indicator.icon(), IndicatorIcon::RecordingOn);
        assert_eq!(indicator.status_text(), "Recording 00:02");
    }

    #[test]
    fn test_resume_shows_play_icon_for_a_few_ticks() {
        let mut indicator = Indicator::new();
        indicator.on_state_changed(SessionState::Recording);
        tick(&mut indicator, 1);
        indicator.on_state_changed(SessionState::Paused);
        assert_eq!(indicator.icon(), IndicatorIcon::Paused);
        assert_eq!(indicator.status_text(), "Paused 00:01");

        indicator.on_state_changed(SessionState::Recording);
        for elapsed in 2..2 + u64::from(RESUME_ICON_TICKS) {
            assert_eq!(indicator.icon(), IndicatorIcon::Resumed);
            tick(&mut indicator, elapsed);
        }
        assert_ne!(indicator.icon(), IndicatorIcon::Resumed);
    }

    #[test]
    fn test_finished_reported_when_idle() {
        let mut indicator = Indicator::new();
        indicator.on_state_changed(SessionState::Finalizing);
        indicator.on_finished(Some(Path::new("/v/recording.mp4")), None);
        indicator.on_state_changed(SessionState::Idle);
        assert_eq!(indicator.status_text(), "Idle (saved /v/recording.mp4)");

        indicator.on_finished(None, Some(&SessionError::AbnormalExit("signal: 9".into())));
        assert!(indicator
            .status_text()
            .contains("recording ended unexpectedly: signal: 9"));
    }
}
