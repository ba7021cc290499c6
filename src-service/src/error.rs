//! Error types for the recording service.

use std::path::PathBuf;
use std::sync::Arc;
use stitchcap_common::SessionState;
use thiserror::Error;

/// Failure to start an encoder process.
#[derive(Debug, Clone, Error)]
pub enum LaunchError {
    /// No usable encoder binary could be located
    #[error("encoder binary not found: {0}")]
    BinaryNotFound(String),
    /// The capture parameters cannot be expressed for this launcher
    #[error("invalid capture parameters: {0}")]
    InvalidParameters(String),
    /// The operating system refused to start the process
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: Arc<std::io::Error>,
    },
}

/// Failure while merging segments into the final file.
#[derive(Debug, Clone, Error)]
pub enum MergeError {
    /// The merger was handed an empty segment list
    #[error("no recorded segments to merge")]
    NoSegments,
    /// A segment file listed for the merge does not exist
    #[error("missing segment: {}", .0.display())]
    MissingSegment(PathBuf),
    /// The manifest could not be written or read
    #[error("manifest {}: {source}", .path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },
    /// The concat tool could not be started
    #[error("failed to start concat tool: {0}")]
    ToolUnavailable(#[source] Arc<std::io::Error>),
    /// The concat tool ran and failed; `diagnostic` is its output verbatim
    #[error("concat failed ({status}):\n{diagnostic}")]
    ToolFailed { status: String, diagnostic: String },
    /// The blocking merge task did not complete
    #[error("merge task aborted: {0}")]
    Aborted(String),
}

/// Classification of controller-level failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Encoder could not be started
    LaunchFailure,
    /// Encoder exited without being asked to
    AbnormalExit,
    /// Segments could not be merged
    MergeFailure,
    /// Storage root could not be prepared
    Storage,
    /// The request does not apply in the current state
    Rejected,
    /// A controller task died
    Internal,
}

/// Errors surfaced at the session controller boundary.
///
/// Cloneable so the same error can be returned to the caller, kept as the
/// session's last error and broadcast to observers.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    #[error("recording already in progress ({0})")]
    AlreadyInProgress(SessionState),
    #[error("cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: SessionState,
    },
    #[error("capture parameters can only be changed while idle")]
    Busy,
    #[error("failed to launch encoder: {0}")]
    Launch(#[from] LaunchError),
    #[error("recording ended unexpectedly: {0}")]
    AbnormalExit(String),
    #[error(transparent)]
    Merge(#[from] MergeError),
    #[error("output directory unavailable: {0}")]
    Storage(#[source] Arc<std::io::Error>),
    #[error("controller task failed: {0}")]
    Internal(String),
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::AlreadyInProgress(_)
            | SessionError::InvalidState { .. }
            | SessionError::Busy => ErrorKind::Rejected,
            SessionError::Launch(_) => ErrorKind::LaunchFailure,
            SessionError::AbnormalExit(_) => ErrorKind::AbnormalExit,
            SessionError::Merge(_) => ErrorKind::MergeFailure,
            SessionError::Storage(_) => ErrorKind::Storage,
            SessionError::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// Error type for configuration persistence.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine config directory")]
    NoConfigDir,
    #[error("failed to write config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),
}
