//! Active segment plus a bounded chain of read-only archive segments.
//!
//! New records go to the active segment (`mails_cache_active`). When that
//! file has grown to `max_active_cache_sz` by the time a process first opens
//! it, it is renamed to `mails_cache_archive_<YYYY-MM-DD-HH-MM-SS>`, the
//! oldest archive is deleted if more than `max_archived_caches` exist, and
//! the process starts over with an empty active segment.
//!
//! Lookups read the active segment, then archives newest first, loading each
//! archive file lazily and at most once per process.

use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{debug, info, warn};

use super::segment::CacheSegment;
use crate::config::CacheConfig;
use crate::error::{MlError, Result};
use crate::model::mail::Mail;
use crate::model::record::FlatRecord;
use crate::source::{BlobRef, RawSource};

/// File name of the active segment inside the metadata directory.
pub const ACTIVE_FILE: &str = "mails_cache_active";

/// File name prefix of archive segments; the rest is the rotation time.
pub const ARCHIVE_PREFIX: &str = "mails_cache_archive_";

/// `strftime` format of the rotation time in archive names.
const ARCHIVE_STAMP: &str = "%Y-%m-%d-%H-%M-%S";

/// The tiered mail cache of one metadata directory.
#[derive(Debug)]
pub struct TieredCache {
    root: PathBuf,
    config: CacheConfig,
    /// Opened on first use.
    active: Option<CacheSegment>,
    /// Archives loaded so far, newest first.
    archives: Vec<CacheSegment>,
    dirty: bool,
}

impl TieredCache {
    /// Cache under `root` with the given limits, usually the result of
    /// [`load_cache_config`](crate::config::load_cache_config).
    ///
    /// Nothing is read until the first lookup or insertion.
    pub fn open(root: impl Into<PathBuf>, config: CacheConfig) -> Self {
        Self {
            root: root.into(),
            config,
            active: None,
            archives: Vec::new(),
            dirty: false,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> CacheConfig {
        self.config
    }

    pub fn active_path(&self) -> PathBuf {
        self.root.join(ACTIVE_FILE)
    }

    /// Whether records were inserted since the last flush.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Number of archive files read so far in this process.
    pub fn loaded_archives(&self) -> usize {
        self.archives.len()
    }

    /// Find a mail by cache key. Broken records count as a miss.
    pub fn get(&mut self, key: &str) -> Result<Option<Mail>> {
        let record = self.lookup(key)?;
        Ok(record.map(Mail::from_record).filter(|mail| !mail.is_broken()))
    }

    /// Find the mail stored in an archive blob.
    pub fn get_blob(&mut self, blob: &BlobRef) -> Result<Option<Mail>> {
        self.get(&blob.cache_key())
    }

    fn lookup(&mut self, key: &str) -> Result<Option<FlatRecord>> {
        if let Some(record) = self.active()?.get(key) {
            return Ok(Some(record.clone()));
        }
        if let Some(record) = self.archives.iter().find_map(|seg| seg.get(key)) {
            return Ok(Some(record.clone()));
        }
        while self.load_one_more_archive()? {
            if let Some(record) = self.archives.last().and_then(|seg| seg.get(key)) {
                return Ok(Some(record.clone()));
            }
        }
        Ok(None)
    }

    /// Store a mail in the active segment.
    ///
    /// Skipped for broken mails and for keys already present in the active
    /// segment or in an archive loaded so far. Archives not loaded yet are
    /// not consulted, so a key living only there can end up duplicated in
    /// the active segment. A record that would not rebuild into a complete
    /// mail (failed fetch, no `Date:` in the text) is not stored either.
    /// Returns whether the mail was stored.
    pub fn insert(&mut self, mail: &mut Mail, source: &dyn RawSource) -> Result<bool> {
        if mail.is_broken() {
            return Ok(false);
        }
        let Some(key) = mail.cache_key(source) else {
            debug!(subject = ?mail.subject(), "Mail has no cache key, not caching");
            return Ok(false);
        };
        if self.active()?.contains(&key) || self.archives.iter().any(|seg| seg.contains(&key)) {
            return Ok(false);
        }

        let record = mail.to_flat_record(source)?;
        if Mail::from_record(record.clone()).is_broken() {
            warn!(key = %key, "Raw mail text is missing or has no date, not caching");
            return Ok(false);
        }
        self.active()?.put(key, record);
        self.dirty = true;
        Ok(true)
    }

    /// Cached mail for a `git log` line, or a new one inserted into the cache.
    pub fn mail_from_blob(
        &mut self,
        blob: BlobRef,
        iso_date: &str,
        subject: &str,
        source: &dyn RawSource,
    ) -> Result<Mail> {
        if let Some(mail) = self.get_blob(&blob)? {
            return Ok(mail);
        }
        let mut mail = Mail::from_blob(blob, iso_date, subject);
        self.insert(&mut mail, source)?;
        Ok(mail)
    }

    /// Write the active segment back if it changed since the last flush.
    pub fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        if let Some(active) = &self.active {
            let path = self.active_path();
            active.save(&path)?;
            info!(path = %path.display(), entries = active.len(), "Mail cache written");
        }
        self.dirty = false;
        Ok(())
    }

    fn active(&mut self) -> Result<&mut CacheSegment> {
        let segment = match self.active.take() {
            Some(segment) => segment,
            None => self.open_active()?,
        };
        Ok(self.active.insert(segment))
    }

    /// Load the active file, rotating it into an archive if it is too big.
    fn open_active(&self) -> Result<CacheSegment> {
        let path = self.active_path();
        let size = match std::fs::metadata(&path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No active mail cache, starting empty");
                return Ok(CacheSegment::new());
            }
            Err(e) => return Err(MlError::io(&path, e)),
        };

        if size >= self.config.max_active_cache_sz && self.rotate(&path)? {
            return Ok(CacheSegment::new());
        }
        CacheSegment::load(&path)
    }

    /// Rename the active file into a new archive. Returns `false`, leaving
    /// the active file in place, when an archive with the same stamp exists.
    fn rotate(&self, active_path: &Path) -> Result<bool> {
        let archive = self.root.join(format!(
            "{ARCHIVE_PREFIX}{}",
            Local::now().format(ARCHIVE_STAMP)
        ));
        if archive.exists() {
            warn!(archive = %archive.display(), "Archive name already taken, rotation postponed");
            return Ok(false);
        }
        std::fs::rename(active_path, &archive).map_err(|e| MlError::io(active_path, e))?;
        info!(archive = %archive.display(), "Rotated active mail cache");

        let archives = list_archive_files(&self.root)?;
        if archives.len() > self.config.max_archived_caches {
            if let Some(oldest) = archives.last() {
                std::fs::remove_file(oldest).map_err(|e| MlError::io(oldest, e))?;
                info!(archive = %oldest.display(), "Deleted oldest mail cache archive");
            }
        }
        Ok(true)
    }

    /// Load the newest archive not loaded yet. Returns `false` when none is left.
    fn load_one_more_archive(&mut self) -> Result<bool> {
        let files = list_archive_files(&self.root)?;
        let Some(path) = files.get(self.archives.len()) else {
            return Ok(false);
        };
        debug!(path = %path.display(), "Loading mail cache archive");
        self.archives.push(CacheSegment::load(path)?);
        Ok(true)
    }
}

/// Archive files under `root`, newest first.
pub fn list_archive_files(root: &Path) -> Result<Vec<PathBuf>> {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(MlError::io(root, e)),
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| MlError::io(root, e))?;
        if entry
            .file_name()
            .to_string_lossy()
            .starts_with(ARCHIVE_PREFIX)
        {
            files.push(entry.path());
        }
    }
    // The timestamp suffix sorts lexicographically in time order
    files.sort();
    files.reverse();
    Ok(files)
}
