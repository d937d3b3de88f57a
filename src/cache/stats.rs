//! Per-file statistics of a cache directory.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::debug;

use super::segment::CacheSegment;
use super::tiered::{list_archive_files, ACTIVE_FILE};
use crate::error::{MlError, Result};
use crate::model::mail::Mail;

/// Size and load cost of one segment file.
#[derive(Debug, Clone, Serialize)]
pub struct SegmentStat {
    pub path: PathBuf,
    /// File size in bytes.
    pub size: u64,
    pub entries: usize,
    /// Records that rebuild into a mail without date or subject.
    pub broken: usize,
    /// Time spent reading and decoding the JSON.
    pub load_time: Duration,
    /// Time spent rebuilding a mail from every record.
    pub parse_time: Duration,
}

/// Statistics for the active segment (if present) and then every archive,
/// newest first. Each file is loaded in full, so this is slow on big caches.
pub fn stats(root: &Path) -> Result<Vec<SegmentStat>> {
    let mut paths = Vec::new();
    let active = root.join(ACTIVE_FILE);
    if active.is_file() {
        paths.push(active);
    }
    paths.extend(list_archive_files(root)?);
    paths.iter().map(|p| segment_stat(p)).collect()
}

fn segment_stat(path: &Path) -> Result<SegmentStat> {
    let size = std::fs::metadata(path)
        .map_err(|e| MlError::io(path, e))?
        .len();

    let start = Instant::now();
    let segment = CacheSegment::load(path)?;
    let load_time = start.elapsed();

    let start = Instant::now();
    let broken = segment
        .records()
        .filter(|(_, record)| Mail::from_record((*record).clone()).is_broken())
        .count();
    let parse_time = start.elapsed();
    debug!(path = %path.display(), entries = segment.len(), broken, "Segment statistics");

    Ok(SegmentStat {
        path: path.to_path_buf(),
        size,
        entries: segment.len(),
        broken,
        load_time,
        parse_time,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::tiered::ARCHIVE_PREFIX;

    const RECORDS: &str = r#"{
    "<a@x>": {"gitid": null, "gitdir": null, "subject": "one", "msgid": "<a@x>", "mbox": ""},
    "<b@x>": {"gitid": null, "gitdir": null, "subject": "two", "msgid": "<b@x>", "mbox": ""}
}"#;

    #[test]
    fn test_stats_orders_active_first() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(format!("{ARCHIVE_PREFIX}2024-01-01-00-00-00")), "{}").unwrap();
        std::fs::write(tmp.path().join(ACTIVE_FILE), RECORDS).unwrap();

        let stats = stats(tmp.path()).unwrap();
        assert_eq!(stats.len(), 2);
        assert!(stats[0].path.ends_with(ACTIVE_FILE));
        assert_eq!(stats[0].entries, 2);
        // Neither record carries raw text with a date
        assert_eq!(stats[0].broken, 2);
        assert_eq!(stats[0].size, RECORDS.len() as u64);
        assert_eq!(stats[1].entries, 0);
    }

    #[test]
    fn test_stats_of_empty_dir() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(stats(tmp.path()).unwrap().is_empty());
    }
}
