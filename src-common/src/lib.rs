//! stitchcap common library
//!
//! Shared types used by the recording service and its front-ends.

pub mod logging;
pub mod types;

pub use types::*;
