//! Platform-specific logging directory resolution.

use std::path::{Path, PathBuf};

/// Returns the platform-appropriate directory for log files.
///
/// | Platform | Directory |
/// |----------|-----------|
/// | Linux | `$XDG_STATE_HOME/stitchcap/logs` or `~/.local/state/stitchcap/logs` |
/// | macOS | `~/Library/Logs/stitchcap` |
/// | Windows | `%LOCALAPPDATA%\stitchcap\logs` |
///
/// Falls back to `<tmp>/stitchcap/logs` when no home directory is known.
pub fn log_dir() -> PathBuf {
    let Some(base) = directories::ProjectDirs::from("", "", "stitchcap") else {
        return std::env::temp_dir().join("stitchcap").join("logs");
    };

    #[cfg(target_os = "linux")]
    {
        base.state_dir()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| base.data_local_dir().join("state"))
            .join("logs")
    }

    #[cfg(target_os = "macos")]
    {
        // data_local_dir is ~/Library/Application Support/stitchcap; logs
        // belong in ~/Library/Logs/stitchcap.
        let library = base
            .data_local_dir()
            .parent()
            .and_then(|p| p.parent())
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| base.data_local_dir().to_path_buf());
        library.join("Logs").join("stitchcap")
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        base.data_local_dir().join("logs")
    }
}

/// Ensures the log directory exists, creating it if necessary.
pub fn ensure_log_dir() -> Result<PathBuf, std::io::Error> {
    let dir = log_dir();
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// File name prefix for the rolling CLI log
/// (the appender adds the date, e.g. `stitchcap.log.2026-03-01`).
pub const LOG_FILE_PREFIX: &str = "stitchcap.log";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_dir_is_namespaced() {
        let dir = log_dir();
        assert!(dir.to_string_lossy().contains("stitchcap"));
        assert!(dir.ends_with("logs") || dir.ends_with("stitchcap"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_linux_logs_live_under_state_dir() {
        let dir = log_dir();
        assert!(dir.ends_with("logs"));
        let parent = dir.parent().unwrap();
        assert!(parent.ends_with("stitchcap") || parent.ends_with("state"));
    }
}
