//! One cache file: a JSON object mapping cache keys to flat mail records.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::Result;
use crate::model::record::FlatRecord;
use crate::store::json;

/// In-memory image of one cache file.
///
/// Records are first-writer-wins: once a key is stored it is never replaced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheSegment {
    records: BTreeMap<String, FlatRecord>,
}

impl CacheSegment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a segment file. Malformed JSON fails as a whole.
    pub fn load(path: &Path) -> Result<Self> {
        let records = json::read_json(path)?;
        Ok(Self { records })
    }

    /// Replace `path` with this segment, atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        json::write_json_atomic(path, &self.records)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&FlatRecord> {
        self.records.get(key)
    }

    /// Store `record` under `key` unless the key is already present.
    ///
    /// Returns whether the record was stored.
    pub fn put(&mut self, key: impl Into<String>, record: FlatRecord) -> bool {
        match self.records.entry(key.into()) {
            std::collections::btree_map::Entry::Occupied(_) => false,
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(record);
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = (&String, &FlatRecord)> {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MlError;

    fn record(subject: &str) -> FlatRecord {
        FlatRecord {
            gitid: None,
            gitdir: None,
            subject: subject.into(),
            msgid: Some("<a@b>".into()),
            mbox: String::new(),
        }
    }

    #[test]
    fn test_put_is_first_writer_wins() {
        let mut seg = CacheSegment::new();
        assert!(seg.put("<a@b>", record("first")));
        assert!(!seg.put("<a@b>", record("second")));
        assert_eq!(seg.get("<a@b>").unwrap().subject, "first");
        assert_eq!(seg.len(), 1);
    }

    #[test]
    fn test_save_and_load() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("mails_cache_active");
        let mut seg = CacheSegment::new();
        seg.put("<a@b>", record("s"));
        seg.save(&path).unwrap();

        let loaded = CacheSegment::load(&path).unwrap();
        assert_eq!(loaded, seg);
        assert!(loaded.contains("<a@b>"));
    }

    #[test]
    fn test_load_corrupt() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("mails_cache_active");
        std::fs::write(&path, "[1, 2").unwrap();
        assert!(matches!(
            CacheSegment::load(&path),
            Err(MlError::CorruptCache { .. })
        ));
    }

    #[test]
    fn test_load_wrong_shape_is_corrupt() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("mails_cache_active");
        std::fs::write(&path, r#"{"k": {"subject": 3}}"#).unwrap();
        assert!(matches!(
            CacheSegment::load(&path),
            Err(MlError::CorruptCache { .. })
        ));
    }
}
