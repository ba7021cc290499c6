//! Shared types for recording sessions and capture parameters.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Public state of a recording session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Not recording, ready to start
    #[default]
    Idle,
    /// Pre-start grace period, cancellable
    CountingDown,
    /// An encoder is capturing the current segment
    Recording,
    /// Between segments, no encoder running
    Paused,
    /// Segments are being merged into the final file
    Finalizing,
}

impl SessionState {
    /// Whether a session occupies the controller (anything but idle).
    pub fn is_active(&self) -> bool {
        !matches!(self, SessionState::Idle)
    }

    pub fn can_start(&self) -> bool {
        matches!(self, SessionState::Idle)
    }

    pub fn can_pause(&self) -> bool {
        matches!(self, SessionState::Recording)
    }

    pub fn can_resume(&self) -> bool {
        matches!(self, SessionState::Paused)
    }

    pub fn can_stop(&self) -> bool {
        matches!(self, SessionState::Recording | SessionState::Paused)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::CountingDown => "counting down",
            SessionState::Recording => "recording",
            SessionState::Paused => "paused",
            SessionState::Finalizing => "finalizing",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Container used for segments and the merged output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    /// MP4 with faststart
    #[default]
    Mp4,
    /// Matroska
    Mkv,
}

impl Container {
    /// Get the file extension for this container.
    pub fn extension(&self) -> &'static str {
        match self {
            Container::Mp4 => "mp4",
            Container::Mkv => "mkv",
        }
    }

    /// Muxer name as understood by ffmpeg's `-f`.
    pub fn muxer(&self) -> &'static str {
        match self {
            Container::Mp4 => "mp4",
            Container::Mkv => "matroska",
        }
    }

    /// Parse from string (case-insensitive).
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "mp4" => Some(Container::Mp4),
            "mkv" | "matroska" => Some(Container::Mkv),
            _ => None,
        }
    }
}

/// Error returned when a region string is not `WxH+X+Y`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid region '{0}', expected WxH+X+Y")]
pub struct RegionParseError(pub String);

/// Rectangular capture area in display pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRegion {
    pub width: u32,
    pub height: u32,
    pub x: i32,
    pub y: i32,
}

impl CaptureRegion {
    /// `WxH` part, as used for `-video_size`.
    pub fn size(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

impl FromStr for CaptureRegion {
    type Err = RegionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || RegionParseError(s.to_string());
        let (size, offset) = s.trim().split_once('+').ok_or_else(err)?;
        let (w, h) = size.split_once('x').ok_or_else(err)?;
        let (x, y) = offset.split_once('+').ok_or_else(err)?;

        let region = CaptureRegion {
            width: w.parse().map_err(|_| err())?,
            height: h.parse().map_err(|_| err())?,
            x: x.parse().map_err(|_| err())?,
            y: y.parse().map_err(|_| err())?,
        };
        if region.width == 0 || region.height == 0 {
            return Err(err());
        }
        Ok(region)
    }
}

impl fmt::Display for CaptureRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

/// Declarative capture parameters handed to the encoder launcher.
///
/// The session controller treats this as opaque; only launchers interpret it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureParams {
    /// Capture area. None records the full display.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<CaptureRegion>,
    /// Frames per second
    #[serde(default = "default_fps")]
    pub fps: u32,
    /// Target video bitrate in kbit/s (ignored when `qp` is set)
    #[serde(default = "default_bitrate")]
    pub bitrate_kbps: u32,
    /// Constant quantizer. Takes precedence over bitrate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qp: Option<u32>,
    /// Record audio alongside video
    #[serde(default = "default_true")]
    pub audio: bool,
    /// Audio source name (PulseAudio source)
    #[serde(default = "default_audio_source")]
    pub audio_source: String,
    /// Draw the mouse cursor
    #[serde(default = "default_true")]
    pub cursor: bool,
    #[serde(default)]
    pub container: Container,
    /// Per-segment duration cap in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_duration_secs: Option<u64>,
    /// Encoder threads, 0 lets the encoder decide
    #[serde(default)]
    pub threads: u32,
    /// Scheduling priority adjustment for the encoder process
    #[serde(default)]
    pub nice: i32,
}

fn default_fps() -> u32 {
    30
}

fn default_bitrate() -> u32 {
    4000
}

fn default_true() -> bool {
    true
}

fn default_audio_source() -> String {
    "default".to_string()
}

impl Default for CaptureParams {
    fn default() -> Self {
        Self {
            region: None,
            fps: default_fps(),
            bitrate_kbps: default_bitrate(),
            qp: None,
            audio: true,
            audio_source: default_audio_source(),
            cursor: true,
            container: Container::Mp4,
            max_duration_secs: None,
            threads: 0,
            nice: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_parse() {
        let region: CaptureRegion = "1920x1080+0+0".parse().unwrap();
        assert_eq!(region.width, 1920);
        assert_eq!(region.height, 1080);
        assert_eq!(region.size(), "1920x1080");
        assert_eq!(region.to_string(), "1920x1080+0+0");

        let offset: CaptureRegion = "800x600+100+50".parse().unwrap();
        assert_eq!((offset.x, offset.y), (100, 50));
    }

    #[test]
    fn test_region_parse_rejects_garbage() {
        assert!("1920x1080".parse::<CaptureRegion>().is_err());
        assert!("axb+1+2".parse::<CaptureRegion>().is_err());
        assert!("0x10+0+0".parse::<CaptureRegion>().is_err());
        assert!("".parse::<CaptureRegion>().is_err());
    }

    #[test]
    fn test_state_guards() {
        assert!(SessionState::Idle.can_start());
        assert!(!SessionState::Finalizing.can_start());
        assert!(SessionState::Recording.can_pause());
        assert!(!SessionState::Paused.can_pause());
        assert!(SessionState::Paused.can_resume());
        assert!(SessionState::Paused.can_stop());
        assert!(!SessionState::CountingDown.can_stop());
        assert!(!SessionState::Idle.is_active());
    }

    #[test]
    fn test_container_from_str() {
        assert_eq!(Container::from_str("MP4"), Some(Container::Mp4));
        assert_eq!(Container::from_str("matroska"), Some(Container::Mkv));
        assert_eq!(Container::from_str("avi"), None);
        assert_eq!(Container::Mkv.muxer(), "matroska");
    }

    #[test]
    fn test_capture_params_backward_compatible() {
        let parsed: CaptureParams = serde_json::from_str(r#"{"fps": 15}"#).unwrap();
        assert_eq!(parsed.fps, 15);
        assert_eq!(parsed.bitrate_kbps, 4000);
        assert!(parsed.audio);
        assert_eq!(parsed.audio_source, "default");
        assert_eq!(parsed.container, Container::Mp4);
    }
}
