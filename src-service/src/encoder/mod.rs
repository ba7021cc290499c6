//! Encoder processes.
//!
//! A [`CaptureLauncher`] starts one external encoder per segment. The
//! controller only ever talks to the returned [`EncoderHandle`].

pub mod ffmpeg;
mod process;

pub use ffmpeg::FfmpegLauncher;
pub use process::{EncoderExit, EncoderHandle, ProcessGroup};

use crate::config::AppConfig;
use crate::error::LaunchError;
use std::path::Path;
use std::sync::Arc;
use stitchcap_common::CaptureParams;
use tokio::process::Command;

/// Starts an encoder writing a single segment.
///
/// `launch` must return as soon as the process is running; it is called
/// without any controller lock held but still on the async runtime.
pub trait CaptureLauncher: Send + Sync + 'static {
    fn launch(&self, output: &Path, params: &CaptureParams) -> Result<EncoderHandle, LaunchError>;
}

/// Runs an arbitrary command line, substituting `{output}` with the segment
/// path. Configured through `encoder.command`.
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    program: String,
    args: Vec<String>,
}

impl CommandLauncher {
    pub const OUTPUT_PLACEHOLDER: &'static str = "{output}";

    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build from a full command line, program first.
    pub fn from_template(template: &[String]) -> Result<Self, LaunchError> {
        match template.split_first() {
            Some((program, args)) if !program.is_empty() => {
                if !args.iter().any(|a| a.contains(Self::OUTPUT_PLACEHOLDER)) {
                    return Err(LaunchError::InvalidParameters(format!(
                        "encoder command must contain {}",
                        Self::OUTPUT_PLACEHOLDER
                    )));
                }
                Ok(Self::new(program.clone(), args.to_vec()))
            }
            _ => Err(LaunchError::InvalidParameters(
                "encoder command is empty".to_string(),
            )),
        }
    }
}

impl CaptureLauncher for CommandLauncher {
    fn launch(&self, output: &Path, params: &CaptureParams) -> Result<EncoderHandle, LaunchError> {
        // Resolve up front so a missing program fails the launch instead of
        // surfacing later as an exit from the nice wrapper.
        let program = which::which(&self.program)
            .map_err(|_| LaunchError::BinaryNotFound(self.program.clone()))?;
        let program = program.to_string_lossy().into_owned();

        let output_arg = output.to_string_lossy();
        let args: Vec<String> = self
            .args
            .iter()
            .map(|a| a.replace(Self::OUTPUT_PLACEHOLDER, &output_arg))
            .collect();

        EncoderHandle::spawn(nice_wrapped(&program, &args, params.nice), &program, output)
    }
}

/// Build the process command, under `nice -n` when a priority change is
/// requested.
pub(crate) fn nice_wrapped(program: &str, args: &[String], nice: i32) -> Command {
    if nice != 0 && cfg!(unix) {
        let mut command = Command::new("nice");
        command.arg("-n").arg(nice.to_string()).arg(program).args(args);
        command
    } else {
        let mut command = Command::new(program);
        command.args(args);
        command
    }
}

/// Pick the launcher described by the configuration.
pub fn launcher_from_config(config: &AppConfig) -> Result<Arc<dyn CaptureLauncher>, LaunchError> {
    match config.encoder.command.as_deref() {
        Some(template) if !template.is_empty() => Ok(Arc::new(CommandLauncher::from_template(template)?)),
        _ => {
            let binary = ffmpeg::resolve_ffmpeg_path(config.encoder.binary.as_deref())?;
            Ok(Arc::new(FfmpegLauncher::new(binary)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_requires_output_placeholder() {
        let err = CommandLauncher::from_template(&["wf-recorder".to_string()]).unwrap_err();
        assert!(matches!(err, LaunchError::InvalidParameters(_)));

        let err = CommandLauncher::from_template(&[]).unwrap_err();
        assert!(matches!(err, LaunchError::InvalidParameters(_)));

        let launcher = CommandLauncher::from_template(&[
            "wf-recorder".to_string(),
            "-f".to_string(),
            "{output}".to_string(),
        ])
        .unwrap();
        assert_eq!(launcher.program, "wf-recorder");
    }

    #[test]
    fn test_nice_wrapper() {
        let args = vec!["-i".to_string(), ":0".to_string()];
        let plain = nice_wrapped("ffmpeg", &args, 0);
        assert_eq!(plain.as_std().get_program(), "ffmpeg");

        #[cfg(unix)]
        {
            let wrapped = nice_wrapped("ffmpeg", &args, 10);
            let std = wrapped.as_std();
            assert_eq!(std.get_program(), "nice");
            let argv: Vec<_> = std.get_args().collect();
            assert_eq!(argv, ["-n", "10", "ffmpeg", "-i", ":0"]);
        }
    }

    #[test]
    fn test_missing_program_fails_launch() {
        let launcher = CommandLauncher::new("stitchcap-no-such-recorder", vec!["{output}".into()]);
        let err = launcher
            .launch(Path::new("/tmp/out.mp4"), &CaptureParams::default())
            .unwrap_err();
        assert!(matches!(err, LaunchError::BinaryNotFound(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_output_placeholder_substituted() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("seg 1.mp4");
        let launcher = CommandLauncher::new(
            "sh",
            vec!["-c".into(), "printf data > \"$0\"".into(), "{output}".into()],
        );
        let handle = launcher.launch(&output, &CaptureParams::default()).unwrap();
        assert!(handle.wait().await.success());
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "data");
    }
}
