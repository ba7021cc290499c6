//! CLI command implementations.

use crate::colors;
use crate::exit_codes::ExitCode;
use crate::RecordOptions;
use chrono::Local;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use stitchcap_common::logging::log_dir;
use stitchcap_common::{Container, SessionState};
use stitchcap_service::config::{get_config_path, load_config, save_config_to, AppConfig};
use stitchcap_service::encoder::{self, ffmpeg};
use stitchcap_service::merge::{read_manifest, ConcatMerger};
use stitchcap_service::session::segments::final_output_path;
use stitchcap_service::session::{spawn_observer, Indicator, IndicatorIcon};
use stitchcap_service::storage::{FixedDir, StorageRoot, VideosDir};
use stitchcap_service::{
    ControllerOptions, ErrorKind, LaunchError, SessionController, SessionError, SessionEvent,
    SessionObserver, StartOutcome,
};
use tokio::io::AsyncBufReadExt;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Instant, Sleep};
use tracing::{debug, warn};

/// How long a signal-triggered shutdown may spend finalizing the recording.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

const INTERACTIVE_HELP: &str = "Commands: p = pause, r = resume, s = stop, c = cancel countdown, ? = status, h = help";

/// Commands read from stdin while recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interactive {
    Pause,
    Resume,
    Stop,
    Cancel,
    Status,
    Help,
}

/// Parse one line typed during a recording.
pub fn parse_command(line: &str) -> Option<Interactive> {
    match line.trim().to_lowercase().as_str() {
        "p" | "pause" => Some(Interactive::Pause),
        "r" | "resume" => Some(Interactive::Resume),
        "s" | "stop" | "q" | "quit" => Some(Interactive::Stop),
        "c" | "cancel" => Some(Interactive::Cancel),
        "?" | "status" => Some(Interactive::Status),
        "h" | "help" => Some(Interactive::Help),
        _ => None,
    }
}

/// Apply command-line options on top of the loaded configuration.
pub fn apply_overrides(config: &mut AppConfig, options: &RecordOptions) -> Result<(), String> {
    if let Some(countdown) = options.countdown {
        config.session.countdown_secs = countdown;
    }

    let capture = &mut config.capture;
    if let Some(region) = options.region {
        capture.region = Some(region);
    }
    if let Some(fps) = options.fps {
        if fps == 0 || fps > 240 {
            return Err(format!("invalid frame rate {}, expected 1-240", fps));
        }
        capture.fps = fps;
    }
    if let Some(bitrate) = options.bitrate {
        if bitrate == 0 {
            return Err("bitrate must be greater than zero".to_string());
        }
        capture.bitrate_kbps = bitrate;
        capture.qp = None;
    }
    if let Some(qp) = options.qp {
        capture.qp = Some(qp);
    }
    if options.no_audio {
        capture.audio = false;
    }
    if let Some(source) = &options.audio_source {
        capture.audio = true;
        capture.audio_source = source.clone();
    }
    if options.no_cursor {
        capture.cursor = false;
    }
    if let Some(format) = &options.format {
        capture.container = Container::from_str(format)
            .ok_or_else(|| format!("invalid format '{}', expected mp4 or mkv", format))?;
    }
    Ok(())
}

/// Wire up a controller for the configuration. Returns the controller and
/// the ffmpeg binary used for merging.
pub fn build_controller(
    config: &AppConfig,
    output_dir: Option<&Path>,
) -> Result<(SessionController, PathBuf), LaunchError> {
    let ffmpeg_path = ffmpeg::resolve_ffmpeg_path(config.encoder.binary.as_deref())?;
    let launcher = encoder::launcher_from_config(config)?;
    let storage: Arc<dyn StorageRoot> = match output_dir {
        Some(dir) => Arc::new(FixedDir(dir.to_path_buf())),
        None => Arc::new(VideosDir::new(config.output.directory.clone())),
    };
    let controller = SessionController::new(
        launcher,
        ConcatMerger::ffmpeg(ffmpeg_path.clone()),
        storage,
        config.capture.clone(),
        ControllerOptions::from_config(&config.session),
    );
    Ok((controller, ffmpeg_path))
}

/// Prints session progress to the terminal (or JSON lines).
struct TerminalObserver {
    json: bool,
    quiet: bool,
    indicator: Indicator,
}

impl TerminalObserver {
    fn new(json: bool, quiet: bool) -> Self {
        Self {
            json,
            quiet,
            indicator: Indicator::new(),
        }
    }

    fn emit_json(&self, value: serde_json::Value) {
        println!("{}", value);
    }

    fn show(&self) -> bool {
        !self.quiet && !self.json
    }
}

impl SessionObserver for TerminalObserver {
    fn on_countdown(&mut self, remaining: u32) {
        self.indicator.on_countdown(remaining);
        if self.json {
            self.emit_json(serde_json::json!({ "event": "countdown", "remaining": remaining }));
        } else if self.show() {
            print!("\r{}", colors::info(&self.indicator.status_text()));
            std::io::stdout().flush().ok();
        }
    }

    fn on_state_changed(&mut self, state: SessionState) {
        self.indicator.on_state_changed(state);
        if self.json {
            self.emit_json(serde_json::json!({ "event": "state", "state": state }));
            return;
        }
        if !self.show() {
            return;
        }
        match state {
            SessionState::Recording | SessionState::Paused | SessionState::Finalizing => {
                println!("\n{} {}", colors::state(state), colors::dim(&self.indicator.status_text()));
            }
            SessionState::CountingDown | SessionState::Idle => {}
        }
    }

    fn on_segment_started(&mut self, index: u32, path: &Path) {
        self.indicator.on_segment_started(index, path);
        if self.json {
            self.emit_json(serde_json::json!({
                "event": "segment_started",
                "index": index,
                "path": path,
            }));
        }
        debug!("Segment {} -> {}", index, path.display());
    }

    fn on_tick(&mut self, elapsed_seconds: u64, state: SessionState) {
        self.indicator.on_tick(elapsed_seconds, state);
        if self.json {
            self.emit_json(serde_json::json!({ "event": "tick", "elapsed_seconds": elapsed_seconds }));
        } else if self.show() && colors::is_interactive() {
            let lit = self.indicator.icon() != IndicatorIcon::RecordingOff;
            print!(
                "\r{} {}",
                colors::recording_dot(lit),
                colors::elapsed_time(elapsed_seconds)
            );
            std::io::stdout().flush().ok();
        }
    }

    fn on_finished(&mut self, final_path: Option<&Path>, error: Option<&SessionError>) {
        self.indicator.on_finished(final_path, error);
        if self.json {
            self.emit_json(serde_json::json!({
                "event": "finished",
                "file_path": final_path,
                "error": error.map(|e| e.to_string()),
            }));
        }
    }
}

/// Resolves on SIGINT or SIGTERM (Ctrl+C elsewhere).
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match (
            signal(SignalKind::interrupt()),
            signal(SignalKind::terminate()),
        ) {
            (Ok(mut sigint), Ok(mut sigterm)) => {
                tokio::select! {
                    _ = sigint.recv() => {}
                    _ = sigterm.recv() => {}
                }
                return;
            }
            (Err(e), _) | (_, Err(e)) => warn!("Failed to install signal handlers: {}", e),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Forward stdin lines to the record loop until stdin closes.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    debug!("stdin closed: {}", e);
                    break;
                }
            }
        }
    });
    rx
}

fn report_error(quiet: bool, json: bool, msg: &str) {
    if json {
        println!("{}", serde_json::json!({ "status": "error", "error": msg }));
    } else if !quiet {
        eprintln!("{}", colors::error(msg));
    }
}

/// Record a session, controlled from stdin.
pub async fn record(options: RecordOptions, json: bool, quiet: bool) -> ExitCode {
    let mut config = load_config();
    if let Err(msg) = apply_overrides(&mut config, &options) {
        report_error(quiet, json, &msg);
        return ExitCode::InvalidArguments;
    }

    let (controller, ffmpeg_path) = match build_controller(&config, options.output_dir.as_deref())
    {
        Ok(built) => built,
        Err(e) => {
            report_error(quiet, json, &e.to_string());
            if !json && !quiet {
                eprintln!(
                    "Install ffmpeg or set {} to its location.",
                    ffmpeg::FFMPEG_ENV
                );
            }
            return ExitCode::EncoderUnavailable;
        }
    };

    let check = tokio::task::spawn_blocking(move || ffmpeg::ensure_ffmpeg_blocking(&ffmpeg_path))
        .await
        .unwrap_or_else(|e| Err(e.to_string()));
    if let Err(msg) = check {
        report_error(quiet, json, &msg);
        return ExitCode::EncoderUnavailable;
    }

    let mut events = controller.subscribe();
    let observer = spawn_observer(controller.subscribe(), TerminalObserver::new(json, quiet));
    let mut commands = spawn_stdin_reader();
    let mut stdin_open = true;

    if !json && !quiet {
        println!("{}", colors::dim(INTERACTIVE_HELP));
    }

    let mut start = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.request_start().await })
    };
    let mut started = false;

    let limit = options.duration.map(Duration::from_secs);
    let deadline = tokio::time::sleep(Duration::ZERO);
    tokio::pin!(deadline);
    let mut deadline_armed = false;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let mut segments: Vec<PathBuf> = Vec::new();
    let mut manifest: Option<PathBuf> = None;

    let code = loop {
        tokio::select! {
            result = &mut start, if !started => {
                match result {
                    Ok(Ok(StartOutcome::Recording)) => {
                        started = true;
                        manifest = controller.snapshot().await.manifest_path;
                        deadline_armed = arm_duration_limit(deadline.as_mut(), limit);
                    }
                    Ok(Ok(StartOutcome::Cancelled)) => {
                        if json {
                            println!("{}", serde_json::json!({ "status": "cancelled" }));
                        } else if !quiet {
                            println!("\n{}", colors::info("Recording cancelled."));
                        }
                        break ExitCode::UserCancelled;
                    }
                    Ok(Err(e)) => {
                        report_error(quiet, json, &format!("Error starting recording: {}", e));
                        break ExitCode::for_error(&e);
                    }
                    Err(e) => {
                        report_error(quiet, json, &format!("Start task failed: {}", e));
                        break ExitCode::GeneralError;
                    }
                }
            }

            line = commands.recv(), if stdin_open => {
                let Some(line) = line else {
                    stdin_open = false;
                    continue;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_command(&line) {
                    Some(Interactive::Stop) => {
                        if started {
                            break finish(&controller, json, quiet).await;
                        }
                        cancel(&controller, quiet, json).await;
                    }
                    Some(Interactive::Cancel) => cancel(&controller, quiet, json).await,
                    Some(Interactive::Pause) => {
                        let controller = controller.clone();
                        tokio::spawn(async move {
                            if let Err(e) = controller.request_pause().await {
                                report_rejection(quiet, json, &e);
                            }
                        });
                    }
                    Some(Interactive::Resume) => {
                        let controller = controller.clone();
                        tokio::spawn(async move {
                            if let Err(e) = controller.request_resume().await {
                                report_rejection(quiet, json, &e);
                            }
                        });
                    }
                    Some(Interactive::Status) => print_status(&controller, json).await,
                    Some(Interactive::Help) => println!("{}", INTERACTIVE_HELP),
                    None => {
                        if !json && !quiet {
                            eprintln!("{}", colors::warning(&format!("Unknown command '{}'", line.trim())));
                        }
                    }
                }
            }

            _ = &mut deadline, if deadline_armed => {
                deadline_armed = false;
                if !json && !quiet {
                    println!("\n{}", colors::info("Duration limit reached. Stopping recording..."));
                }
                break finish(&controller, json, quiet).await;
            }

            event = events.recv() => match event {
                Ok(SessionEvent::SegmentStarted { path, .. }) => segments.push(path),
                Ok(SessionEvent::Finished { error: Some(e), .. }) if e.kind() == ErrorKind::AbnormalExit => {
                    report_error(quiet, json, &e.to_string());
                    if !json && !quiet && !segments.is_empty() {
                        eprintln!("Unmerged segments left on disk:");
                        for path in &segments {
                            eprintln!("  {}", colors::path(&path.display().to_string()));
                        }
                    }
                    break ExitCode::RecordingFailedDuringCapture;
                }
                // The encoder ended on its own (duration cap) and the
                // session was finalized without a stop request
                Ok(SessionEvent::Finished { final_path: Some(path), .. }) => {
                    print_saved(&path, json, quiet);
                    break ExitCode::Success;
                }
                Ok(SessionEvent::Finished { error: Some(e), .. }) if started && e.kind() == ErrorKind::MergeFailure => {
                    report_error(quiet, json, &e.to_string());
                    print_recovery_hint(&e, manifest.as_deref(), json, quiet);
                    break ExitCode::for_error(&e);
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => debug!("Record loop skipped {} events", n),
                Err(broadcast::error::RecvError::Closed) => break ExitCode::GeneralError,
            },

            _ = &mut shutdown => {
                if !json && !quiet {
                    eprintln!("\n{}", colors::info("Stopping recording..."));
                }
                let manifest = controller.snapshot().await.manifest_path;
                match controller.shutdown(SHUTDOWN_GRACE).await {
                    Some(path) => {
                        print_saved(&path, json, quiet);
                        break ExitCode::Success;
                    }
                    None => match controller.last_error().await {
                        Some(e) => {
                            report_error(quiet, json, &e.to_string());
                            print_recovery_hint(&e, manifest.as_deref(), json, quiet);
                            break ExitCode::for_error(&e);
                        }
                        None if started => break ExitCode::GeneralError,
                        None => break ExitCode::UserCancelled,
                    },
                }
            }
        }
    };

    // Drop the controller so the observer sees the channel close
    drop(events);
    drop(controller);
    start.abort();
    // An encoder left running after a timed-out shutdown still holds a
    // sender, so don't wait on the observer indefinitely
    match tokio::time::timeout(Duration::from_secs(1), observer).await {
        Ok(Err(e)) => debug!("Observer task ended abnormally: {}", e),
        Ok(Ok(_)) | Err(_) => {}
    }
    code
}

/// Point the `--duration` timer at `limit` from now. Called once the first
/// segment records so the countdown does not eat into the limit.
fn arm_duration_limit(deadline: Pin<&mut Sleep>, limit: Option<Duration>) -> bool {
    match limit {
        Some(limit) => {
            deadline.reset(Instant::now() + limit);
            true
        }
        None => false,
    }
}

async fn cancel(controller: &SessionController, quiet: bool, json: bool) {
    if let Err(e) = controller.cancel_countdown().await {
        report_rejection(quiet, json, &e);
    }
}

fn report_rejection(quiet: bool, json: bool, err: &SessionError) {
    if json {
        println!(
            "{}",
            serde_json::json!({ "event": "rejected", "error": err.to_string() })
        );
    } else if !quiet {
        eprintln!("\n{}", colors::warning(&err.to_string()));
    }
}

/// Stop the session and report the merged file.
async fn finish(controller: &SessionController, json: bool, quiet: bool) -> ExitCode {
    let manifest = controller.snapshot().await.manifest_path;
    match controller.request_stop().await {
        Ok(path) => {
            print_saved(&path, json, quiet);
            ExitCode::Success
        }
        Err(e) if e.kind() == ErrorKind::Rejected => {
            // Lost a race with an encoder crash; report that instead
            let err = controller.last_error().await.unwrap_or(e);
            report_error(quiet, json, &err.to_string());
            ExitCode::for_error(&err)
        }
        Err(e) => {
            report_error(quiet, json, &format!("Error stopping recording: {}", e));
            print_recovery_hint(&e, manifest.as_deref(), json, quiet);
            ExitCode::for_error(&e)
        }
    }
}

fn print_saved(path: &Path, json: bool, quiet: bool) {
    if json {
        println!(
            "{}",
            serde_json::json!({ "status": "recording_saved", "file_path": path })
        );
    } else if quiet {
        // Scripts read the bare path
        println!("{}", path.display());
    } else {
        println!(
            "\n{} {}",
            colors::success("Recording saved:"),
            colors::path(&path.display().to_string())
        );
    }
}

fn print_recovery_hint(err: &SessionError, manifest: Option<&Path>, json: bool, quiet: bool) {
    if json || quiet || err.kind() != ErrorKind::MergeFailure {
        return;
    }
    if let Some(manifest) = manifest.filter(|m| m.exists()) {
        eprintln!(
            "Segments were kept. Retry with: stitchcap merge {}",
            manifest.display()
        );
    }
}

async fn print_status(controller: &SessionController, json: bool) {
    let snapshot = controller.snapshot().await;
    if json {
        println!(
            "{}",
            serde_json::json!({
                "event": "status",
                "state": snapshot.state,
                "elapsed_seconds": snapshot.elapsed_seconds,
                "segments": snapshot.segments,
                "encoder_pid": snapshot.encoder_pid,
                "last_error": snapshot.last_error.map(|e| e.to_string()),
            })
        );
        return;
    }

    println!();
    println!("{} {}", colors::header("State:"), colors::state(snapshot.state));
    println!(
        "{} {}",
        colors::header("Elapsed:"),
        colors::elapsed_time(snapshot.elapsed_seconds)
    );
    println!("{} {}", colors::header("Segments:"), snapshot.segment_index);
    if let Some(pid) = snapshot.encoder_pid {
        println!("{} {}", colors::header("Encoder pid:"), pid);
    }
    if let Some(err) = snapshot.last_error {
        println!("{} {}", colors::header("Last error:"), err);
    }
}

/// Output path for `stitchcap merge` when none was given: a fresh
/// `recording_*` file next to the manifest, in the segments' container.
fn default_merge_output(manifest: &Path, segments: &[PathBuf]) -> PathBuf {
    let dir = manifest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let container = segments
        .first()
        .and_then(|s| s.extension())
        .and_then(|e| e.to_str())
        .and_then(Container::from_str)
        .unwrap_or_default();
    final_output_path(dir, container, Local::now())
}

/// Merge the segments listed in a manifest left behind by a failed stop.
pub async fn merge(manifest: PathBuf, output: Option<PathBuf>, json: bool, quiet: bool) -> ExitCode {
    let segments = match read_manifest(&manifest) {
        Ok(segments) => segments,
        Err(e) => {
            report_error(quiet, json, &e.to_string());
            return ExitCode::MergeFailed;
        }
    };

    let config = load_config();
    let ffmpeg_path = match ffmpeg::resolve_ffmpeg_path(config.encoder.binary.as_deref()) {
        Ok(path) => path,
        Err(e) => {
            report_error(quiet, json, &e.to_string());
            return ExitCode::EncoderUnavailable;
        }
    };

    let output = output.unwrap_or_else(|| default_merge_output(&manifest, &segments));
    if !json && !quiet {
        println!(
            "{}",
            colors::info(&format!("Merging {} segment(s)...", segments.len()))
        );
    }

    match ConcatMerger::ffmpeg(ffmpeg_path)
        .merge_blocking(segments, manifest, output)
        .await
    {
        Ok(path) => {
            print_saved(&path, json, quiet);
            ExitCode::Success
        }
        Err(e) => {
            report_error(quiet, json, &e.to_string());
            ExitCode::MergeFailed
        }
    }
}

/// Show the effective configuration, optionally writing it out first.
pub fn show_config(init: bool, json: bool) -> ExitCode {
    let config = load_config();
    let path = match get_config_path() {
        Ok(path) => Some(path),
        Err(e) => {
            warn!("{}", e);
            None
        }
    };

    if init {
        match &path {
            Some(path) if path.exists() => {
                if !json {
                    println!("{}", colors::dim("Config file already exists, leaving it unchanged."));
                }
            }
            Some(path) => {
                if let Err(e) = save_config_to(&config, path) {
                    report_error(false, json, &e.to_string());
                    return ExitCode::GeneralError;
                }
                if !json {
                    println!(
                        "{} {}",
                        colors::success("Wrote"),
                        colors::path(&path.display().to_string())
                    );
                }
            }
            None => {
                report_error(false, json, "could not determine config directory");
                return ExitCode::GeneralError;
            }
        }
    }

    if json {
        match serde_json::to_value(&config) {
            Ok(value) => println!(
                "{}",
                serde_json::json!({ "config_path": path, "config": value })
            ),
            Err(e) => {
                report_error(false, json, &e.to_string());
                return ExitCode::GeneralError;
            }
        }
        return ExitCode::Success;
    }

    let capture = &config.capture;
    let display_path = path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(unavailable)".to_string());
    println!("{} {}", colors::header("Config file:"), colors::path(&display_path));
    println!(
        "{} {}",
        colors::header("Output dir:"),
        config
            .output
            .directory
            .as_deref()
            .unwrap_or("(videos folder)")
    );
    println!(
        "{} {}",
        colors::header("Encoder:"),
        match (&config.encoder.command, &config.encoder.binary) {
            (Some(command), _) => command.join(" "),
            (None, Some(binary)) => binary.clone(),
            (None, None) => "ffmpeg (auto)".to_string(),
        }
    );
    println!(
        "{} {}",
        colors::header("Region:"),
        capture
            .region
            .map(|r| r.to_string())
            .unwrap_or_else(|| "full display".to_string())
    );
    println!(
        "{} {} fps, {}, {}",
        colors::header("Video:"),
        capture.fps,
        match capture.qp {
            Some(qp) => format!("qp {}", qp),
            None => format!("{} kbit/s", capture.bitrate_kbps),
        },
        capture.container.extension()
    );
    println!(
        "{} {}",
        colors::header("Audio:"),
        if capture.audio {
            capture.audio_source.as_str()
        } else {
            "off"
        }
    );
    println!(
        "{} {}s countdown, {}s stop timeout",
        colors::header("Session:"),
        config.session.countdown_secs,
        config.session.stop_timeout_secs
    );
    println!(
        "{} {}",
        colors::header("Logs:"),
        colors::path(&log_dir().display().to_string())
    );
    ExitCode::Success
}

/// Show version information.
pub fn version(json: bool) {
    let version = env!("CARGO_PKG_VERSION");
    if json {
        println!("{}", serde_json::json!({ "version": version }));
    } else {
        println!("{} {}", colors::header("stitchcap"), version);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stitchcap_common::CaptureRegion;

    #[tokio::test(start_paused = true)]
    async fn duration_limit_starts_after_countdown() {
        let deadline = tokio::time::sleep(Duration::ZERO);
        tokio::pin!(deadline);

        // Countdown runs before the first segment
        tokio::time::advance(Duration::from_secs(3)).await;
        let armed_at = Instant::now();
        assert!(arm_duration_limit(deadline.as_mut(), Some(Duration::from_secs(10))));
        assert_eq!(deadline.deadline(), armed_at + Duration::from_secs(10));

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(!deadline.is_elapsed());
        tokio::time::advance(Duration::from_secs(1)).await;
        (&mut deadline).await;
    }

    #[tokio::test]
    async fn unlimited_recording_leaves_timer_disarmed() {
        let deadline = tokio::time::sleep(Duration::ZERO);
        tokio::pin!(deadline);
        assert!(!arm_duration_limit(deadline.as_mut(), None));
    }

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("p"), Some(Interactive::Pause));
        assert_eq!(parse_command("  Resume \n"), Some(Interactive::Resume));
        assert_eq!(parse_command("q"), Some(Interactive::Stop));
        assert_eq!(parse_command("c"), Some(Interactive::Cancel));
        assert_eq!(parse_command("?"), Some(Interactive::Status));
        assert_eq!(parse_command("help"), Some(Interactive::Help));
        assert_eq!(parse_command("record"), None);
        assert_eq!(parse_command(""), None);
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = AppConfig::default();
        config.capture.qp = Some(20);
        let options = RecordOptions {
            region: Some(CaptureRegion {
                width: 640,
                height: 480,
                x: 5,
                y: 6,
            }),
            bitrate: Some(2500),
            no_cursor: true,
            audio_source: Some("alsa_input.usb".to_string()),
            format: Some("MKV".to_string()),
            countdown: Some(0),
            ..RecordOptions::default()
        };
        apply_overrides(&mut config, &options).unwrap();

        assert_eq!(config.capture.region.map(|r| r.width), Some(640));
        assert_eq!(config.capture.bitrate_kbps, 2500);
        assert_eq!(config.capture.qp, None);
        assert!(!config.capture.cursor);
        assert!(config.capture.audio);
        assert_eq!(config.capture.audio_source, "alsa_input.usb");
        assert_eq!(config.capture.container, Container::Mkv);
        assert_eq!(config.session.countdown_secs, 0);
    }

    #[test]
    fn test_apply_overrides_rejects_bad_values() {
        let mut config = AppConfig::default();
        let options = RecordOptions {
            format: Some("avi".to_string()),
            ..RecordOptions::default()
        };
        let err = apply_overrides(&mut config, &options).unwrap_err();
        assert!(err.contains("avi"));

        let options = RecordOptions {
            fps: Some(0),
            ..RecordOptions::default()
        };
        assert!(apply_overrides(&mut config, &options).is_err());
    }

    #[test]
    fn test_no_audio_override() {
        let mut config = AppConfig::default();
        let options = RecordOptions {
            no_audio: true,
            ..RecordOptions::default()
        };
        apply_overrides(&mut config, &options).unwrap();
        assert!(!config.capture.audio);
    }

    #[test]
    fn test_default_merge_output_follows_segments() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("stitchcap_concat_1.txt");
        let segments = vec![dir.path().join("stitchcap_1_segment_1.mkv")];

        let output = default_merge_output(&manifest, &segments);
        assert_eq!(output.parent(), Some(dir.path()));
        assert_eq!(output.extension().and_then(|e| e.to_str()), Some("mkv"));
        let name = output.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("recording_"));
    }
}
