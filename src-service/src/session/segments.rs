//! Segment and manifest naming.
//!
//! All paths are derived from the output directory, the session id and the
//! segment index, so the same inputs always name the same files.

use chrono::{DateTime, Local};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use stitchcap_common::Container;

const FILE_PREFIX: &str = "stitchcap";

/// Identifies one recording session; a nanosecond wall-clock stamp that is
/// strictly increasing within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(i64);

static LAST_SESSION_ID: AtomicI64 = AtomicI64::new(0);

impl SessionId {
    pub fn new() -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
            .unwrap_or_default();
        let mut last = LAST_SESSION_ID.load(Ordering::Relaxed);
        loop {
            let next = now.max(last + 1);
            match LAST_SESSION_ID.compare_exchange_weak(
                last,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Self(next),
                Err(actual) => last = actual,
            }
        }
    }

    pub fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    pub fn as_nanos(&self) -> i64 {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One recorded segment file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentDescriptor {
    index: u32,
    path: PathBuf,
}

impl SegmentDescriptor {
    /// 1-based position within the session.
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// `<dir>/stitchcap_<session>_segment_<index>.<ext>`
pub fn segment_path(dir: &Path, session: SessionId, index: u32, container: Container) -> PathBuf {
    dir.join(format!(
        "{FILE_PREFIX}_{session}_segment_{index}.{}",
        container.extension()
    ))
}

/// `<dir>/stitchcap_concat_<session>.txt`
pub fn manifest_path(dir: &Path, session: SessionId) -> PathBuf {
    dir.join(format!("{FILE_PREFIX}_concat_{session}.txt"))
}

/// Name for the merged recording: `recording_YYYYMMDD_HHMMSS.<ext>`, with a
/// `_N` suffix when a file of that name already exists.
pub fn final_output_path(dir: &Path, container: Container, now: DateTime<Local>) -> PathBuf {
    let stem = format!("recording_{}", now.format("%Y%m%d_%H%M%S"));
    let ext = container.extension();
    let candidate = dir.join(format!("{stem}.{ext}"));
    if !candidate.exists() {
        return candidate;
    }
    (2u32..)
        .map(|n| dir.join(format!("{stem}_{n}.{ext}")))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

/// Ordered segments of one session plus the manifest path used to merge them.
#[derive(Debug, Clone)]
pub struct SegmentStore {
    dir: PathBuf,
    session: SessionId,
    container: Container,
    segments: Vec<SegmentDescriptor>,
    manifest: PathBuf,
}

impl SegmentStore {
    pub fn new(dir: PathBuf, session: SessionId, container: Container) -> Self {
        let manifest = manifest_path(&dir, session);
        Self {
            dir,
            session,
            container,
            segments: Vec::new(),
            manifest,
        }
    }

    /// Reserve the next segment and return it.
    pub fn allocate_next(&mut self) -> &SegmentDescriptor {
        let index = self.segment_index() + 1;
        let path = segment_path(&self.dir, self.session, index, self.container);
        self.segments.push(SegmentDescriptor { index, path });
        &self.segments[self.segments.len() - 1]
    }

    /// Drop the most recently allocated segment (its encoder never ran).
    pub fn discard_last(&mut self) -> Option<SegmentDescriptor> {
        self.segments.pop()
    }

    /// Number of segments allocated so far.
    pub fn segment_index(&self) -> u32 {
        self.segments.len() as u32
    }

    pub fn segments(&self) -> &[SegmentDescriptor] {
        &self.segments
    }

    pub fn segment_paths(&self) -> Vec<PathBuf> {
        self.segments.iter().map(|s| s.path.clone()).collect()
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn container(&self) -> Container {
        self.container
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_paths_are_deterministic() {
        let dir = Path::new("/videos");
        let id = SessionId::from_nanos(1_700_000_000_123);

        assert_eq!(
            segment_path(dir, id, 3, Container::Mp4),
            PathBuf::from("/videos/stitchcap_1700000000123_segment_3.mp4")
        );
        assert_eq!(
            segment_path(dir, id, 3, Container::Mp4),
            segment_path(dir, id, 3, Container::Mp4)
        );
        assert_eq!(
            manifest_path(dir, id),
            PathBuf::from("/videos/stitchcap_concat_1700000000123.txt")
        );
    }

    #[test]
    fn test_store_allocates_in_order() {
        let id = SessionId::from_nanos(42);
        let mut store = SegmentStore::new(PathBuf::from("/videos"), id, Container::Mkv);

        assert_eq!(store.allocate_next().index(), 1);
        assert_eq!(store.allocate_next().index(), 2);
        assert_eq!(store.segment_index(), 2);

        let dropped = store.discard_last().unwrap();
        assert_eq!(dropped.index(), 2);
        let again = store.allocate_next().clone();
        assert_eq!(again, dropped);

        let paths = store.segment_paths();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/videos/stitchcap_42_segment_1.mkv"),
                PathBuf::from("/videos/stitchcap_42_segment_2.mkv"),
            ]
        );
        assert_eq!(
            store.manifest_path(),
            Path::new("/videos/stitchcap_concat_42.txt")
        );
    }

    #[test]
    fn test_session_ids_strictly_increase() {
        let ids: Vec<SessionId> = (0..100).map(|_| SessionId::new()).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_final_output_path_avoids_existing() {
        let dir = tempfile::tempdir().unwrap();
        let now = Local.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();

        let first = final_output_path(dir.path(), Container::Mp4, now);
        assert_eq!(first, dir.path().join("recording_20260304_050607.mp4"));

        std::fs::write(&first, b"x").unwrap();
        let second = final_output_path(dir.path(), Container::Mp4, now);
        assert_eq!(second, dir.path().join("recording_20260304_050607_2.mp4"));
    }
}
