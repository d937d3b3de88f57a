//! Persistent user labels on mails, kept in `<root>/tags`.
//!
//! The file is a JSON object keyed by message id. Each value holds the
//! flat record of the mail at the time it was first tagged and its tag
//! list. Entry order is preserved across load and save.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MlError, Result};
use crate::model::mail::Mail;
use crate::model::record::FlatRecord;
use crate::source::RawSource;
use crate::store::json;

/// Name of the tag file inside the metadata directory.
pub const TAGS_FILE: &str = "tags";

/// One tagged mail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagEntry {
    pub mail: FlatRecord,
    /// Unique, in the order they were added.
    pub tags: Vec<String>,
}

/// The tag file of one metadata directory.
#[derive(Debug)]
pub struct TagStore {
    path: PathBuf,
    entries: IndexMap<String, TagEntry>,
}

impl TagStore {
    /// Load `<root>/tags`, or start empty if it does not exist.
    pub fn open(root: &Path) -> Result<Self> {
        let path = root.join(TAGS_FILE);
        let entries = if path.is_file() {
            json::read_json(&path)?
        } else {
            debug!(path = %path.display(), "No tag file, starting empty");
            IndexMap::new()
        };
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the tag file back, atomically.
    pub fn save(&self) -> Result<()> {
        json::write_json_atomic(&self.path, &self.entries)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Tags of a message, or `UnknownMessage`.
    pub fn tags_of(&self, message_id: &str) -> Result<&[String]> {
        let message_id = bracket_message_id(message_id);
        self.entries
            .get(&message_id)
            .map(|entry| entry.tags.as_slice())
            .ok_or(MlError::UnknownMessage(message_id))
    }

    /// Tag a message. A new message is stored with `snapshot`; a known one
    /// keeps its snapshot and gains only the tags it does not have yet.
    pub fn add(&mut self, message_id: &str, snapshot: FlatRecord, tags: &[String]) {
        let entry = self
            .entries
            .entry(bracket_message_id(message_id))
            .or_insert_with(|| TagEntry {
                mail: snapshot,
                tags: Vec::new(),
            });
        for tag in tags {
            if !entry.tags.contains(tag) {
                entry.tags.push(tag.clone());
            }
        }
    }

    /// Tag a mail, keyed by its `Message-Id`.
    pub fn tag_mail(&mut self, mail: &mut Mail, tags: &[String], source: &dyn RawSource) -> Result<()> {
        let message_id = mail
            .resolve_field("message-id", source)
            .map(str::to_string)
            .ok_or_else(|| MlError::MissingField("message-id".into()))?;
        let snapshot = mail.to_flat_record(source)?;
        self.add(&message_id, snapshot, tags);
        Ok(())
    }

    /// Remove tags from a message. Nothing changes unless the message is
    /// known and carries every listed tag.
    pub fn remove(&mut self, message_id: &str, tags: &[String]) -> Result<()> {
        let message_id = bracket_message_id(message_id);
        let Some(entry) = self.entries.get_mut(&message_id) else {
            return Err(MlError::UnknownMessage(message_id));
        };
        if let Some(missing) = tags.iter().find(|tag| !entry.tags.contains(tag)) {
            return Err(MlError::TagNotPresent {
                message_id,
                tag: missing.clone(),
            });
        }
        entry.tags.retain(|tag| !tags.contains(tag));
        Ok(())
    }

    /// Snapshots of the mails carrying `tag`, in file order.
    pub fn list_by_tag(&self, tag: &str) -> Vec<&FlatRecord> {
        self.entries
            .values()
            .filter(|entry| entry.tags.iter().any(|t| t == tag))
            .map(|entry| &entry.mail)
            .collect()
    }

    /// Mails carrying `tag`, rebuilt from their snapshots. Broken ones are
    /// left out.
    pub fn mails_of_tag(&self, tag: &str) -> Vec<Mail> {
        self.list_by_tag(tag)
            .into_iter()
            .map(|record| Mail::from_record(record.clone()))
            .filter(|mail| !mail.is_broken())
            .collect()
    }

    /// Number of mails per tag, in order of first appearance.
    pub fn counts(&self) -> IndexMap<String, usize> {
        let mut counts = IndexMap::new();
        for tag in self.entries.values().flat_map(|entry| &entry.tags) {
            *counts.entry(tag.clone()).or_insert(0) += 1;
        }
        counts
    }
}

/// Message id in its angle-bracketed form; `a@b` becomes `<a@b>`.
pub fn bracket_message_id(message_id: &str) -> String {
    let id = message_id.trim();
    let id = id.strip_prefix('<').unwrap_or(id);
    let id = id.strip_suffix('>').unwrap_or(id);
    format!("<{id}>")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(msgid: &str) -> FlatRecord {
        FlatRecord {
            gitid: None,
            gitdir: None,
            subject: format!("mail {msgid}"),
            msgid: Some(msgid.to_string()),
            mbox: format!(
                "Subject: mail {msgid}\nMessage-Id: {msgid}\nDate: Mon, 1 Jan 2024 00:00:00 +0000\n\nbody\n"
            ),
        }
    }

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|t| t.to_string()).collect()
    }

    fn store() -> (tempfile::TempDir, TagStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store = TagStore::open(tmp.path()).unwrap();
        (tmp, store)
    }

    #[test]
    fn test_add_skips_duplicates() {
        let (_tmp, mut store) = store();
        store.add("<a@x>", snapshot("<a@x>"), &tags(&["review", "later"]));
        store.add("<a@x>", snapshot("<a@x>"), &tags(&["later", "done"]));
        assert_eq!(store.tags_of("<a@x>").unwrap(), ["review", "later", "done"]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_remove_is_all_or_nothing() {
        let (_tmp, mut store) = store();
        store.add("<a@x>", snapshot("<a@x>"), &tags(&["a"]));
        let err = store.remove("<a@x>", &tags(&["a", "b"])).unwrap_err();
        assert!(matches!(err, MlError::TagNotPresent { ref tag, .. } if tag == "b"));
        assert_eq!(store.tags_of("<a@x>").unwrap(), ["a"]);

        store.remove("<a@x>", &tags(&["a"])).unwrap();
        assert!(store.tags_of("<a@x>").unwrap().is_empty());
    }

    #[test]
    fn test_unknown_message() {
        let (_tmp, mut store) = store();
        assert!(matches!(
            store.remove("<nope@x>", &tags(&["a"])),
            Err(MlError::UnknownMessage(_))
        ));
        assert!(matches!(store.tags_of("<nope@x>"), Err(MlError::UnknownMessage(_))));
    }

    #[test]
    fn test_counts_in_first_seen_order() {
        let (_tmp, mut store) = store();
        store.add("<a@x>", snapshot("<a@x>"), &tags(&["zeta", "alpha"]));
        store.add("<b@x>", snapshot("<b@x>"), &tags(&["alpha"]));
        let counts: Vec<(String, usize)> = store.counts().into_iter().collect();
        assert_eq!(counts, vec![("zeta".to_string(), 1), ("alpha".to_string(), 2)]);
    }

    #[test]
    fn test_order_survives_save_and_open() {
        let (tmp, mut store) = store();
        for id in ["<z@x>", "<a@x>", "<m@x>"] {
            store.add(id, snapshot(id), &tags(&["t"]));
        }
        store.save().unwrap();

        let reopened = TagStore::open(tmp.path()).unwrap();
        let subjects: Vec<&str> = reopened
            .list_by_tag("t")
            .iter()
            .map(|r| r.subject.as_str())
            .collect();
        assert_eq!(subjects, vec!["mail <z@x>", "mail <a@x>", "mail <m@x>"]);
        assert_eq!(reopened.mails_of_tag("t").len(), 3);
    }

    #[test]
    fn test_message_id_brackets_are_optional() {
        let (_tmp, mut store) = store();
        store.add("<a@x>", snapshot("<a@x>"), &tags(&["t", "u"]));
        assert_eq!(store.tags_of("a@x").unwrap(), ["t", "u"]);
        store.remove("a@x", &tags(&["t"])).unwrap();
        store.add("a@x", snapshot("<a@x>"), &tags(&["v"]));
        assert_eq!(store.tags_of("<a@x>").unwrap(), ["u", "v"]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_bracket_message_id() {
        assert_eq!(bracket_message_id("a@x"), "<a@x>");
        assert_eq!(bracket_message_id("<a@x>"), "<a@x>");
        assert_eq!(bracket_message_id(" <a@x> "), "<a@x>");
    }

    #[test]
    fn test_repeated_key_keeps_first_position() {
        let tmp = tempfile::tempdir().unwrap();
        let entry = |tag: &str| {
            format!(
                r#"{{"mail": {{"gitid": null, "gitdir": null, "subject": "s", "msgid": null, "mbox": ""}}, "tags": ["{tag}"]}}"#
            )
        };
        std::fs::write(
            tmp.path().join(TAGS_FILE),
            format!(
                r#"{{"<a@x>": {}, "<b@x>": {}, "<a@x>": {}}}"#,
                entry("old"),
                entry("b"),
                entry("new")
            ),
        )
        .unwrap();
        let store = TagStore::open(tmp.path()).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.tags_of("<a@x>").unwrap(), ["new"]);
        let order: Vec<String> = store.counts().into_keys().collect();
        assert_eq!(order, vec!["new".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_file_uses_four_space_indent() {
        let (tmp, mut store) = store();
        store.add("<a@x>", snapshot("<a@x>"), &tags(&["t"]));
        store.save().unwrap();
        let text = std::fs::read_to_string(tmp.path().join(TAGS_FILE)).unwrap();
        assert!(text.starts_with("{\n    \"<a@x>\": {\n        \"mail\""));
    }
}
