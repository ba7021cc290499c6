//! Stream-copy concatenation of recorded segments.
//!
//! The merger writes a concat manifest, runs the concat tool, and deletes
//! the segments and manifest only after the tool succeeded. On any failure
//! the inputs stay on disk so the recording can be recovered by hand or with
//! `stitchcap merge <manifest>`.

use crate::error::MergeError;
use ffmpeg_sidecar::command::FfmpegCommand;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Joins the files listed in a manifest into `output` without re-encoding.
pub trait ConcatTool: Send + Sync + 'static {
    fn concat(&self, manifest: &Path, output: &Path) -> Result<(), MergeError>;
}

/// `ffmpeg -f concat -safe 0 -i <manifest> -c copy <output>`
#[derive(Debug, Clone)]
pub struct FfmpegConcat {
    binary: PathBuf,
}

impl FfmpegConcat {
    pub fn new(binary: PathBuf) -> Self {
        Self { binary }
    }
}

impl ConcatTool for FfmpegConcat {
    fn concat(&self, manifest: &Path, output: &Path) -> Result<(), MergeError> {
        let mut command = FfmpegCommand::new_with_path(&self.binary);
        command
            .args(["-y", "-loglevel", "error"])
            .args(["-f", "concat", "-safe", "0"])
            .arg("-i")
            .arg(manifest)
            .args(["-c", "copy"])
            .arg(output);

        let inner = command.as_inner_mut();
        inner.stdin(Stdio::null());
        inner.stdout(Stdio::piped());
        inner.stderr(Stdio::piped());

        let result = inner
            .output()
            .map_err(|e| MergeError::ToolUnavailable(Arc::new(e)))?;

        if result.status.success() {
            return Ok(());
        }

        let mut diagnostic = String::from_utf8_lossy(&result.stdout).into_owned();
        diagnostic.push_str(&String::from_utf8_lossy(&result.stderr));
        Err(MergeError::ToolFailed {
            status: result.status.to_string(),
            diagnostic,
        })
    }
}

/// Render a concat manifest, one `file '<path>'` line per segment.
///
/// Single quotes inside a path are written as `'\''`.
pub fn render_manifest(segments: &[PathBuf]) -> String {
    let mut manifest = String::new();
    for segment in segments {
        let escaped = segment.to_string_lossy().replace('\'', r"'\''");
        manifest.push_str(&format!("file '{escaped}'\n"));
    }
    manifest
}

/// Parse the `file` lines of a concat manifest.
pub fn parse_manifest(text: &str) -> Vec<PathBuf> {
    text.lines()
        .filter_map(|line| line.trim().strip_prefix("file "))
        .map(|rest| PathBuf::from(unquote(rest.trim())))
        .collect()
}

/// Read and parse a manifest from disk.
pub fn read_manifest(path: &Path) -> Result<Vec<PathBuf>, MergeError> {
    let text = std::fs::read_to_string(path).map_err(|e| MergeError::Manifest {
        path: path.to_path_buf(),
        source: Arc::new(e),
    })?;
    Ok(parse_manifest(&text))
}

fn unquote(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut quoted = false;
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        match c {
            '\'' => quoted = !quoted,
            '\\' if !quoted => {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// Merges ordered segments into one file.
#[derive(Clone)]
pub struct ConcatMerger {
    tool: Arc<dyn ConcatTool>,
}

impl std::fmt::Debug for ConcatMerger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcatMerger").finish_non_exhaustive()
    }
}

impl ConcatMerger {
    pub fn new(tool: Arc<dyn ConcatTool>) -> Self {
        Self { tool }
    }

    pub fn ffmpeg(binary: PathBuf) -> Self {
        Self::new(Arc::new(FfmpegConcat::new(binary)))
    }

    /// Merge `segments` (in order) into `output` and return the output path.
    ///
    /// The manifest is written first; every segment must exist before the
    /// tool runs. Segments and manifest are removed only after the tool
    /// succeeded; a partial output is removed on failure.
    pub fn merge(
        &self,
        segments: &[PathBuf],
        manifest: &Path,
        output: &Path,
    ) -> Result<PathBuf, MergeError> {
        if segments.is_empty() {
            return Err(MergeError::NoSegments);
        }

        // Written even when a segment is missing so `stitchcap merge` can
        // retry once the file is back.
        std::fs::write(manifest, render_manifest(segments)).map_err(|e| MergeError::Manifest {
            path: manifest.to_path_buf(),
            source: Arc::new(e),
        })?;
        debug!(
            "Wrote manifest {} ({} segments)",
            manifest.display(),
            segments.len()
        );

        if let Some(missing) = segments.iter().find(|s| !s.is_file()) {
            warn!("Segment missing before merge: {}", missing.display());
            return Err(MergeError::MissingSegment(missing.clone()));
        }

        let result = self.tool.concat(manifest, output).and_then(|()| {
            if output.is_file() {
                Ok(())
            } else {
                Err(MergeError::ToolFailed {
                    status: "exit status: 0".to_string(),
                    diagnostic: format!("no output written to {}", output.display()),
                })
            }
        });

        if let Err(e) = result {
            warn!("Merge failed, keeping segments and manifest: {}", e);
            if output.exists() {
                if let Err(e) = std::fs::remove_file(output) {
                    warn!("Failed to remove partial output {}: {}", output.display(), e);
                }
            }
            return Err(e);
        }

        for segment in segments {
            if let Err(e) = std::fs::remove_file(segment) {
                warn!("Failed to remove segment {}: {}", segment.display(), e);
            }
        }
        if let Err(e) = std::fs::remove_file(manifest) {
            warn!("Failed to remove manifest {}: {}", manifest.display(), e);
        }

        info!(
            "Merged {} segment(s) into {}",
            segments.len(),
            output.display()
        );
        Ok(output.to_path_buf())
    }

    /// [`ConcatMerger::merge`] on the blocking pool.
    pub async fn merge_blocking(
        &self,
        segments: Vec<PathBuf>,
        manifest: PathBuf,
        output: PathBuf,
    ) -> Result<PathBuf, MergeError> {
        let merger = self.clone();
        tokio::task::spawn_blocking(move || merger.merge(&segments, &manifest, &output))
            .await
            .map_err(|e| MergeError::Aborted(e.to_string()))?
    }
}

/// Concat tool that appends file bytes; exercises the merge bookkeeping
/// without ffmpeg.
#[cfg(test)]
pub(crate) struct ByteConcat;

#[cfg(test)]
impl ConcatTool for ByteConcat {
    fn concat(&self, manifest: &Path, output: &Path) -> Result<(), MergeError> {
        let mut joined = Vec::new();
        for segment in read_manifest(manifest)? {
            let bytes = std::fs::read(&segment).map_err(|e| MergeError::ToolFailed {
                status: "exit status: 1".to_string(),
                diagnostic: format!("{}: {}\n", segment.display(), e),
            })?;
            joined.extend(bytes);
        }
        std::fs::write(output, joined).map_err(|e| MergeError::ToolFailed {
            status: "exit status: 1".to_string(),
            diagnostic: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingConcat;

    impl ConcatTool for FailingConcat {
        fn concat(&self, _manifest: &Path, output: &Path) -> Result<(), MergeError> {
            std::fs::write(output, b"partial").unwrap();
            Err(MergeError::ToolFailed {
                status: "exit status: 1".to_string(),
                diagnostic: "[mov,mp4 @ 0x5555] moov atom not found\nseg_2.mp4: Invalid data found when processing input\n".to_string(),
            })
        }
    }

    fn write_segments(dir: &Path, contents: &[&str]) -> Vec<PathBuf> {
        contents
            .iter()
            .enumerate()
            .map(|(i, body)| {
                let path = dir.join(format!("seg_{}.mp4", i + 1));
                std::fs::write(&path, body).unwrap();
                path
            })
            .collect()
    }

    #[test]
    fn test_manifest_quoting() {
        let segments = vec![
            PathBuf::from("/tmp/a.mp4"),
            PathBuf::from("/tmp/it's here.mp4"),
        ];
        let text = render_manifest(&segments);
        assert_eq!(
            text,
            "file '/tmp/a.mp4'\nfile '/tmp/it'\\''s here.mp4'\n"
        );
        assert_eq!(parse_manifest(&text), segments);
    }

    #[test]
    fn test_parse_manifest_skips_other_lines() {
        let text = "ffconcat version 1.0\n# comment\nfile '/a.mp4'\n\nfile /b.mp4\n";
        assert_eq!(
            parse_manifest(text),
            vec![PathBuf::from("/a.mp4"), PathBuf::from("/b.mp4")]
        );
    }

    #[test]
    fn test_merge_success_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let segments = write_segments(dir.path(), &["one-", "two-", "three"]);
        let manifest = dir.path().join("concat.txt");
        let output = dir.path().join("final.mp4");

        let merger = ConcatMerger::new(Arc::new(ByteConcat));
        let merged = merger.merge(&segments, &manifest, &output).unwrap();

        assert_eq!(merged, output);
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "one-two-three");
        assert!(segments.iter().all(|s| !s.exists()));
        assert!(!manifest.exists());
    }

    #[test]
    fn test_missing_segment_keeps_manifest_for_retry() {
        let dir = tempfile::tempdir().unwrap();
        let mut segments = write_segments(dir.path(), &["one"]);
        let missing = dir.path().join("seg_2.mp4");
        segments.push(missing.clone());
        let manifest = dir.path().join("concat.txt");
        let output = dir.path().join("final.mp4");

        let merger = ConcatMerger::new(Arc::new(ByteConcat));
        let err = merger.merge(&segments, &manifest, &output).unwrap_err();

        assert!(matches!(&err, MergeError::MissingSegment(p) if *p == missing));
        assert!(err.to_string().contains("seg_2.mp4"));
        assert!(segments[0].exists());
        assert!(!output.exists());
        assert_eq!(read_manifest(&manifest).unwrap(), segments);

        // Once the segment is back the manifest alone is enough to merge
        std::fs::write(&missing, "two").unwrap();
        let listed = read_manifest(&manifest).unwrap();
        merger.merge(&listed, &manifest, &output).unwrap();
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "onetwo");
    }

    #[test]
    fn test_tool_failure_keeps_inputs_and_diagnostic() {
        let dir = tempfile::tempdir().unwrap();
        let segments = write_segments(dir.path(), &["one", "two"]);
        let manifest = dir.path().join("concat.txt");
        let output = dir.path().join("final.mp4");

        let merger = ConcatMerger::new(Arc::new(FailingConcat));
        let err = merger.merge(&segments, &manifest, &output).unwrap_err();

        match &err {
            MergeError::ToolFailed { diagnostic, .. } => {
                assert!(diagnostic.contains("moov atom not found\nseg_2.mp4: Invalid data"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(segments.iter().all(|s| s.exists()));
        assert_eq!(read_manifest(&manifest).unwrap(), segments);
        assert!(!output.exists(), "partial output should be removed");
    }

    #[test]
    fn test_empty_list_fails_loudly() {
        let dir = tempfile::tempdir().unwrap();
        let merger = ConcatMerger::new(Arc::new(ByteConcat));
        let err = merger
            .merge(&[], &dir.path().join("concat.txt"), &dir.path().join("out.mp4"))
            .unwrap_err();
        assert!(matches!(err, MergeError::NoSegments));
    }

    #[tokio::test]
    async fn test_merge_blocking() {
        let dir = tempfile::tempdir().unwrap();
        let segments = write_segments(dir.path(), &["a", "b"]);
        let output = dir.path().join("final.mp4");

        let merger = ConcatMerger::new(Arc::new(ByteConcat));
        let merged = merger
            .merge_blocking(segments, dir.path().join("concat.txt"), output.clone())
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(merged).unwrap(), "ab");
    }
}
