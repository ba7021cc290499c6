//! FFmpeg screen-capture encoder.
//!
//! Captures an X11 display with `x11grab`, optionally a PulseAudio source,
//! and writes one H.264 segment per launch. Segments are stream-copy merged
//! later, so every launch must use the same codec settings.

use super::{nice_wrapped, CaptureLauncher, EncoderHandle};
use crate::error::LaunchError;
use ffmpeg_sidecar::command::FfmpegCommand;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use stitchcap_common::{CaptureParams, Container};
use tracing::{debug, info, warn};

/// Environment variable pointing at a specific ffmpeg binary.
pub const FFMPEG_ENV: &str = "STITCHCAP_FFMPEG";

/// Resolve the ffmpeg binary.
///
/// Order: the configured path, `STITCHCAP_FFMPEG`, `ffmpeg` on PATH, then the
/// location ffmpeg-sidecar downloads to (next to our executable).
pub fn resolve_ffmpeg_path(configured: Option<&str>) -> Result<PathBuf, LaunchError> {
    if let Some(path) = configured.filter(|p| !p.is_empty()) {
        let path = shellexpand::tilde(path).into_owned();
        return which::which(&path).map_err(|_| LaunchError::BinaryNotFound(path));
    }
    if let Ok(path) = std::env::var(FFMPEG_ENV) {
        if !path.is_empty() {
            return which::which(&path).map_err(|_| LaunchError::BinaryNotFound(path));
        }
    }
    if let Ok(path) = which::which("ffmpeg") {
        return Ok(path);
    }
    let sidecar = ffmpeg_sidecar::paths::ffmpeg_path();
    if sidecar.is_file() {
        return Ok(sidecar);
    }
    Err(LaunchError::BinaryNotFound("ffmpeg".to_string()))
}

/// Check that the binary runs. Called once at startup so a broken install
/// is reported before the user presses record.
pub fn ensure_ffmpeg_blocking(binary: &Path) -> Result<String, String> {
    let output = Command::new(binary)
        .arg("-version")
        .stdin(Stdio::null())
        .output()
        .map_err(|e| format!("Failed to run {}: {}", binary.display(), e))?;

    if !output.status.success() {
        return Err(format!(
            "{} -version exited with {}",
            binary.display(),
            output.status
        ));
    }

    let version = String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .unwrap_or_default()
        .to_string();
    info!("Using {}", version);
    Ok(version)
}

/// X display to capture, from `$DISPLAY`.
pub fn default_display() -> String {
    std::env::var("DISPLAY")
        .ok()
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| ":0.0".to_string())
}

/// Build the argument list for one capture segment.
pub fn capture_args(output: &Path, params: &CaptureParams, display: &str) -> Vec<String> {
    let mut args: Vec<String> = vec!["-nostdin".into(), "-y".into()];

    // Video input
    if let Some(region) = &params.region {
        args.extend(["-video_size".into(), region.size()]);
    }
    if params.fps > 0 {
        args.extend(["-framerate".into(), params.fps.to_string()]);
    }
    args.extend(["-thread_queue_size".into(), "512".into()]);
    args.extend([
        "-draw_mouse".into(),
        if params.cursor { "1" } else { "0" }.into(),
    ]);
    let input = match &params.region {
        Some(region) => format!("{}+{},{}", display, region.x, region.y),
        None => display.to_string(),
    };
    args.extend(["-f".into(), "x11grab".into(), "-i".into(), input]);

    // Audio input
    if params.audio {
        let source = if params.audio_source.is_empty() {
            "default"
        } else {
            params.audio_source.as_str()
        };
        args.extend([
            "-thread_queue_size".into(),
            "512".into(),
            "-f".into(),
            "pulse".into(),
            "-i".into(),
            source.into(),
        ]);
    }

    // Video encoding, tuned for low latency so a SIGINT flushes quickly
    args.extend(
        [
            "-c:v",
            "libx264",
            "-preset",
            "veryfast",
            "-tune",
            "zerolatency",
            "-profile:v",
            "baseline",
        ]
        .map(String::from),
    );
    if params.threads > 0 {
        args.extend(["-threads".into(), params.threads.to_string()]);
    }
    match params.qp {
        Some(qp) => args.extend(["-qp".into(), qp.to_string()]),
        None => {
            let kbps = params.bitrate_kbps.max(1);
            args.extend([
                "-b:v".into(),
                format!("{kbps}k"),
                "-maxrate".into(),
                format!("{kbps}k"),
                "-bufsize".into(),
                format!("{}k", kbps * 2),
                "-rc-lookahead".into(),
                "0".into(),
            ]);
        }
    }
    args.extend(["-pix_fmt".into(), "yuv420p".into()]);

    if params.audio {
        args.extend(
            ["-c:a", "aac", "-b:a", "128k", "-ar", "44100", "-ac", "2"].map(String::from),
        );
    }

    args.extend(["-f".into(), params.container.muxer().into()]);
    if params.container == Container::Mp4 {
        args.extend(["-movflags".into(), "+faststart".into()]);
    }
    if let Some(secs) = params.max_duration_secs.filter(|s| *s > 0) {
        args.extend(["-t".into(), secs.to_string()]);
    }

    args.push(output.to_string_lossy().into_owned());
    args
}

/// Launches one ffmpeg process per segment.
#[derive(Debug, Clone)]
pub struct FfmpegLauncher {
    binary: PathBuf,
    display: String,
}

impl FfmpegLauncher {
    pub fn new(binary: PathBuf) -> Self {
        Self {
            binary,
            display: default_display(),
        }
    }

    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display = display.into();
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

impl CaptureLauncher for FfmpegLauncher {
    fn launch(&self, output: &Path, params: &CaptureParams) -> Result<EncoderHandle, LaunchError> {
        if let Some(region) = &params.region {
            if region.width % 2 != 0 || region.height % 2 != 0 {
                // yuv420p needs even dimensions
                return Err(LaunchError::InvalidParameters(format!(
                    "capture size {} must have even dimensions",
                    region.size()
                )));
            }
        }

        let args = capture_args(output, params, &self.display);
        debug!("ffmpeg {}", args.join(" "));

        // Built through ffmpeg-sidecar so the invocation matches the concat step
        let mut ffmpeg = FfmpegCommand::new_with_path(&self.binary);
        ffmpeg.args(&args);
        let inner = ffmpeg.as_inner_mut();
        let program = inner.get_program().to_string_lossy().into_owned();
        let argv: Vec<String> = inner
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        if params.nice != 0 && cfg!(not(unix)) {
            warn!("Process priority adjustment is not supported on this platform");
        }
        let command = nice_wrapped(&program, &argv, params.nice);
        EncoderHandle::spawn(command, &program, output)
    }
}
