//! stitchcap command-line interface.
//!
//! Records the screen in pausable segments and merges them into one file
//! when the recording stops.

mod colors;
mod commands;
mod exit_codes;
mod logging;

use clap::{Args, Parser, Subcommand};
use exit_codes::ExitCode;
use std::path::PathBuf;
use stitchcap_common::CaptureRegion;

/// stitchcap - pausable screen recorder
#[derive(Parser, Debug)]
#[command(name = "stitchcap")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output in JSON format for scripting
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Record the screen; control with p/r/s on stdin
    Record(RecordOptions),
    /// Merge the segments listed in a concat manifest (recover a failed stop)
    Merge {
        /// Manifest left behind by a failed merge
        manifest: PathBuf,

        /// Output file (default: a new recording_*.ext next to the manifest)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show the effective configuration
    Config {
        /// Write the configuration file with current values if it is missing
        #[arg(long)]
        init: bool,
    },
    /// Show version information
    Version,
}

#[derive(Args, Debug, Clone, Default)]
pub struct RecordOptions {
    /// Capture area as WxH+X+Y (default: whole display)
    #[arg(long, value_name = "WxH+X+Y")]
    pub region: Option<CaptureRegion>,

    /// Frames per second
    #[arg(long)]
    pub fps: Option<u32>,

    /// Video bitrate in kbit/s
    #[arg(long, conflicts_with = "qp")]
    pub bitrate: Option<u32>,

    /// Constant quantizer instead of a bitrate (0-51)
    #[arg(long, value_parser = clap::value_parser!(u32).range(0..=51))]
    pub qp: Option<u32>,

    /// Do not record audio
    #[arg(long)]
    pub no_audio: bool,

    /// PulseAudio source to record
    #[arg(long, conflicts_with = "no_audio")]
    pub audio_source: Option<String>,

    /// Hide the mouse cursor
    #[arg(long)]
    pub no_cursor: bool,

    /// Container: mp4 or mkv
    #[arg(short, long)]
    pub format: Option<String>,

    /// Countdown before recording starts (seconds)
    #[arg(long)]
    pub countdown: Option<u32>,

    /// Auto-stop after this much wall-clock time (seconds)
    #[arg(short, long)]
    pub duration: Option<u64>,

    /// Directory for segments and the final recording
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();
    let log_guard = logging::init(cli.verbose, cli.quiet);

    // Build the async runtime
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!(
                "{}",
                colors::error(&format!("Failed to create Tokio runtime: {}", e))
            );
            std::process::exit(ExitCode::GeneralError.as_i32());
        }
    };

    let exit_code = runtime.block_on(run(cli));
    // process::exit skips destructors; flush the log file first
    drop(log_guard);
    std::process::exit(exit_code.as_i32());
}

async fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Commands::Record(options) => commands::record(options, cli.json, cli.quiet).await,
        Commands::Merge { manifest, output } => {
            commands::merge(manifest, output, cli.json, cli.quiet).await
        }
        Commands::Config { init } => commands::show_config(init, cli.json),
        Commands::Version => {
            commands::version(cli.json);
            ExitCode::Success
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    /// Verify the CLI definition is valid
    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_record_defaults() {
        let cli = Cli::try_parse_from(["stitchcap", "record"]).unwrap();
        assert!(!cli.json);
        assert!(!cli.quiet);
        match cli.command {
            Commands::Record(options) => {
                assert!(options.region.is_none());
                assert!(options.duration.is_none());
                assert!(!options.no_audio);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parse_record_with_options() {
        let cli = Cli::try_parse_from([
            "stitchcap",
            "--json",
            "record",
            "--region",
            "1280x720+0+40",
            "--fps",
            "60",
            "--qp",
            "20",
            "--no-audio",
            "-f",
            "mkv",
            "-d",
            "90",
            "-o",
            "/tmp/rec",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Record(options) => {
                assert_eq!(
                    options.region,
                    Some(CaptureRegion {
                        width: 1280,
                        height: 720,
                        x: 0,
                        y: 40
                    })
                );
                assert_eq!(options.fps, Some(60));
                assert_eq!(options.qp, Some(20));
                assert!(options.no_audio);
                assert_eq!(options.format.as_deref(), Some("mkv"));
                assert_eq!(options.duration, Some(90));
                assert_eq!(options.output_dir, Some(PathBuf::from("/tmp/rec")));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parse_record_rejects_bad_region() {
        assert!(Cli::try_parse_from(["stitchcap", "record", "--region", "wide"]).is_err());
    }

    #[test]
    fn parse_record_rejects_conflicts() {
        assert!(Cli::try_parse_from([
            "stitchcap",
            "record",
            "--bitrate",
            "3000",
            "--qp",
            "20"
        ])
        .is_err());
        assert!(Cli::try_parse_from([
            "stitchcap",
            "record",
            "--no-audio",
            "--audio-source",
            "mic"
        ])
        .is_err());
        assert!(Cli::try_parse_from(["stitchcap", "record", "--qp", "60"]).is_err());
    }

    #[test]
    fn parse_merge() {
        let cli =
            Cli::try_parse_from(["stitchcap", "merge", "/v/stitchcap_concat_1.txt", "-o", "out.mp4"])
                .unwrap();
        match cli.command {
            Commands::Merge { manifest, output } => {
                assert_eq!(manifest, PathBuf::from("/v/stitchcap_concat_1.txt"));
                assert_eq!(output, Some(PathBuf::from("out.mp4")));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parse_config_and_version() {
        let cli = Cli::try_parse_from(["stitchcap", "-q", "config", "--init"]).unwrap();
        assert!(cli.quiet);
        assert!(matches!(cli.command, Commands::Config { init: true }));

        let cli = Cli::try_parse_from(["stitchcap", "version"]).unwrap();
        assert!(matches!(cli.command, Commands::Version));
    }
}
