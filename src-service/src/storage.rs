//! Output directory resolution.
//!
//! Segments, the concat manifest and the merged recording all live in one
//! directory. The controller only asks for it to exist.

use directories::UserDirs;
use std::io;
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing::info;

/// Environment variable overriding the output directory.
pub const VIDEOS_DIR_ENV: &str = "STITCHCAP_VIDEOS_DIR";

/// Supplies the directory recordings are written to.
pub trait StorageRoot: Send + Sync + 'static {
    /// Ensure the directory exists and return its absolute path.
    fn ensure_dir(&self) -> io::Result<PathBuf>;
}

/// A fixed directory, created on demand.
#[derive(Debug, Clone)]
pub struct FixedDir(pub PathBuf);

impl StorageRoot for FixedDir {
    fn ensure_dir(&self) -> io::Result<PathBuf> {
        std::fs::create_dir_all(&self.0)?;
        std::path::absolute(&self.0)
    }
}

/// The user's videos directory, resolved once per process.
///
/// Lookup order: `STITCHCAP_VIDEOS_DIR`, the configured directory (with `~`
/// expanded), the platform videos folder, `~/Videos`, then `./videos`.
#[derive(Debug, Default)]
pub struct VideosDir {
    configured: Option<String>,
    resolved: OnceLock<PathBuf>,
}

impl VideosDir {
    pub fn new(configured: Option<String>) -> Self {
        Self {
            configured,
            resolved: OnceLock::new(),
        }
    }

    fn candidate(&self) -> PathBuf {
        if let Ok(dir) = std::env::var(VIDEOS_DIR_ENV) {
            if !dir.is_empty() {
                return PathBuf::from(dir);
            }
        }
        if let Some(dir) = self.configured.as_deref().filter(|d| !d.is_empty()) {
            return PathBuf::from(shellexpand::tilde(dir).into_owned());
        }
        match UserDirs::new() {
            Some(user_dirs) => user_dirs
                .video_dir()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| user_dirs.home_dir().join("Videos")),
            None => PathBuf::from("./videos"),
        }
    }
}

impl StorageRoot for VideosDir {
    fn ensure_dir(&self) -> io::Result<PathBuf> {
        if let Some(dir) = self.resolved.get() {
            std::fs::create_dir_all(dir)?;
            return Ok(dir.clone());
        }

        let dir = std::path::absolute(self.candidate())?;
        std::fs::create_dir_all(&dir)?;
        info!("Output directory: {}", dir.display());
        Ok(self.resolved.get_or_init(|| dir).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_dir_is_created() {
        let tmp = tempfile::tempdir().unwrap();
        let root = FixedDir(tmp.path().join("a").join("b"));
        let dir = root.ensure_dir().unwrap();
        assert!(dir.is_dir());
        assert!(dir.is_absolute());
    }

    #[test]
    fn test_configured_dir_expands_tilde() {
        let videos = VideosDir::new(Some("~/stitchcap-test-clips".to_string()));
        if std::env::var(VIDEOS_DIR_ENV).is_err() {
            let candidate = videos.candidate();
            assert!(!candidate.to_string_lossy().starts_with('~'));
            assert!(candidate.ends_with("stitchcap-test-clips"));
        }
    }
}
