//! stitchcap recording service.
//!
//! Records the screen as a series of segments, one external encoder process
//! per segment, and stream-copies them into a single file when the session
//! stops. Pausing ends a segment; resuming starts the next one.

pub mod config;
pub mod encoder;
pub mod error;
pub mod merge;
pub mod session;
pub mod storage;

pub use error::{ConfigError, ErrorKind, LaunchError, MergeError, SessionError};
pub use session::{
    ControllerOptions, SessionController, SessionEvent, SessionObserver, SessionSnapshot,
    StartOutcome,
};
