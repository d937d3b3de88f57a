//! JSON file reading and atomic replace-on-write.

use std::io::Write;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::error::{MlError, Result};

/// Read and deserialize a JSON file. Malformed content is a `CorruptCache` error.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let data = std::fs::read(path).map_err(|e| MlError::io(path, e))?;
    serde_json::from_slice(&data).map_err(|e| MlError::corrupt(path, e))
}

/// Serialize `value` as JSON indented by four spaces.
pub fn to_pretty_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value
        .serialize(&mut ser)
        .map_err(|e| MlError::Parse(format!("JSON serialization failed: {e}")))?;
    Ok(buf)
}

/// Write `value` as pretty JSON, replacing `path` atomically.
///
/// The data goes to a temporary file in the same directory, which is synced
/// and then renamed over `path`.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = to_pretty_json(value)?;
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut temp = NamedTempFile::new_in(parent).map_err(|e| MlError::io(parent, e))?;
    temp.write_all(&json).map_err(|e| MlError::io(temp.path(), e))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| MlError::io(temp.path(), e))?;
    temp.persist(path).map_err(|e| MlError::io(path, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_write_then_read() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("data");
        let mut map = BTreeMap::new();
        map.insert("k".to_string(), vec![1, 2]);
        write_json_atomic(&path, &map).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\n    \"k\": [\n        1,"));
        let back: BTreeMap<String, Vec<i32>> = read_json(&path).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn test_overwrite_leaves_no_temp_files() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("data");
        write_json_atomic(&path, &1).unwrap();
        write_json_atomic(&path, &2).unwrap();
        assert_eq!(read_json::<i32>(&path).unwrap(), 2);
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_malformed_json_is_corrupt() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("data");
        std::fs::write(&path, "{\"a\": ").unwrap();
        assert!(matches!(
            read_json::<serde_json::Value>(&path),
            Err(MlError::CorruptCache { .. })
        ));
    }
}
