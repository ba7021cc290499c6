//! Exit codes for the CLI.
//!
//! These codes enable scripting integration by providing structured
//! feedback about operation results.

use stitchcap_service::{ErrorKind, SessionError};

/// Exit codes for CLI operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Operation completed successfully
    Success = 0,
    /// General/unspecified error
    GeneralError = 1,
    /// Invalid command-line arguments
    InvalidArguments = 2,
    /// No usable encoder binary
    EncoderUnavailable = 3,
    /// Recording failed to start
    RecordingFailedToStart = 4,
    /// Encoder died while recording (segments left on disk)
    RecordingFailedDuringCapture = 5,
    /// Merging segments failed (segments and manifest preserved)
    MergeFailed = 6,
    /// Countdown cancelled before recording started
    UserCancelled = 7,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Exit code for a controller error.
    pub fn for_error(err: &SessionError) -> Self {
        match err.kind() {
            ErrorKind::LaunchFailure | ErrorKind::Storage => ExitCode::RecordingFailedToStart,
            ErrorKind::AbnormalExit => ExitCode::RecordingFailedDuringCapture,
            ErrorKind::MergeFailure => ExitCode::MergeFailed,
            ErrorKind::Rejected | ErrorKind::Internal => ExitCode::GeneralError,
        }
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitCode::Success => write!(f, "success"),
            ExitCode::GeneralError => write!(f, "general error"),
            ExitCode::InvalidArguments => write!(f, "invalid arguments"),
            ExitCode::EncoderUnavailable => write!(f, "encoder unavailable"),
            ExitCode::RecordingFailedToStart => write!(f, "recording failed to start"),
            ExitCode::RecordingFailedDuringCapture => write!(f, "recording failed during capture"),
            ExitCode::MergeFailed => write!(f, "merge failed"),
            ExitCode::UserCancelled => write!(f, "user cancelled"),
        }
    }
}
