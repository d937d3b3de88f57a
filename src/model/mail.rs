//! The canonical mail entity.
//!
//! A [`Mail`] is built from one of four inputs (a git-log line naming an
//! archive blob, raw mailbox text, an Atom feed entry, or a cached flat
//! record). Date and subject are known right away; every other field is
//! materialized on first use by parsing the raw text, which itself is
//! fetched through a [`RawSource`] at most once.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, Local};
use tracing::{debug, warn};
use unicode_width::UnicodeWidthStr;

use super::record::FlatRecord;
use super::subject::{parse_subject_tags, SeriesPosition};
use crate::error::{MlError, Result};
use crate::parser::feed::{message_id_from_link, FeedEntry};
use crate::parser::header::{self, decode_encoded_words, FieldMap};
use crate::parser::mime;
use crate::source::{BlobRef, RawSource};

/// Column limit of the cover-letter label line.
const LABEL_WIDTH: usize = 72;

/// Headers shown by [`Mail::display_text`], in order.
const DISPLAY_HEADERS: [&str; 6] = ["Date", "Subject", "Message-Id", "From", "To", "CC"];

/// Header and body fields of a mail.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Fields {
    /// Raw text not parsed yet. `known` holds fields supplied by the input
    /// itself; `None` marks a field known to be absent.
    Unresolved {
        known: BTreeMap<String, Option<String>>,
    },
    /// Full field map parsed from the raw text.
    Resolved(FieldMap),
}

/// A mail message with lazily resolved header and body fields.
#[derive(Debug, Clone)]
pub struct Mail {
    blob: Option<BlobRef>,
    subject: Option<String>,
    date: Option<DateTime<FixedOffset>>,
    subject_tags: Vec<String>,
    series: Option<SeriesPosition>,
    raw: Option<String>,
    fields: Fields,
}

impl Mail {
    fn new(
        blob: Option<BlobRef>,
        subject: Option<String>,
        date: Option<DateTime<FixedOffset>>,
        raw: Option<String>,
        fields: Fields,
    ) -> Self {
        let (subject_tags, series) = subject
            .as_deref()
            .map(parse_subject_tags)
            .unwrap_or_default();
        Self {
            blob,
            subject,
            date,
            subject_tags,
            series,
            raw,
            fields,
        }
    }

    /// Mail named by a `git log` line: the blob identity, its ISO 8601 author
    /// date and its subject. The raw text is read only when needed.
    pub fn from_blob(blob: BlobRef, iso_date: &str, subject: impl Into<String>) -> Self {
        let date = header::parse_iso_date(iso_date);
        if date.is_none() {
            warn!(date = iso_date, key = %blob.cache_key(), "Unparseable git log date");
        }
        Self::new(
            Some(blob),
            Some(subject.into()),
            date,
            None,
            Fields::Unresolved {
                known: BTreeMap::new(),
            },
        )
    }

    /// Mail parsed from already fetched mailbox text.
    pub fn from_raw_text(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let fields = mime::parse_fields(&raw);
        let date = fields.get("date").and_then(|d| header::parse_date(d));
        let subject = fields.get("subject").map(|s| decode_encoded_words(s));
        Self::new(None, subject, date, Some(raw), Fields::Resolved(fields))
    }

    /// Mail described by an Atom feed entry of the archive at `list_url`.
    pub fn from_feed_entry(entry: &FeedEntry, list_url: &str) -> Self {
        let date = header::parse_iso_date(&entry.updated);
        let message_id = message_id_from_link(&entry.link, list_url);
        if message_id.is_none() {
            warn!(link = %entry.link, "Feed link is not under the list URL");
        }
        let in_reply_to = entry
            .in_reply_to
            .as_deref()
            .and_then(|link| message_id_from_link(link, list_url));

        let mut known = BTreeMap::new();
        known.insert("from".to_string(), Some(entry.from_field()));
        known.insert("message-id".to_string(), message_id);
        known.insert("in-reply-to".to_string(), in_reply_to);

        Self::new(
            None,
            Some(entry.title.clone()),
            date,
            None,
            Fields::Unresolved { known },
        )
    }

    /// Mail rebuilt from a cached flat record, without parsing the body.
    ///
    /// The record carries no date, so the header block of the embedded text
    /// is scanned for it.
    pub fn from_record(record: FlatRecord) -> Self {
        let blob = match (record.gitid, record.gitdir) {
            (Some(id), Some(dir)) => Some(BlobRef::new(id, dir)),
            _ => None,
        };
        let date = header::parse_header_block(&record.mbox)
            .fields
            .get("date")
            .and_then(|d| header::parse_date(d));

        let mut known = BTreeMap::new();
        known.insert("message-id".to_string(), record.msgid);

        Self::new(
            blob,
            Some(record.subject),
            date,
            Some(record.mbox),
            Fields::Unresolved { known },
        )
    }

    pub fn blob(&self) -> Option<&BlobRef> {
        self.blob.as_ref()
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    pub fn date(&self) -> Option<DateTime<FixedOffset>> {
        self.date
    }

    /// Lowercase tags of the subject's leading `[...]` prefix.
    pub fn subject_tags(&self) -> &[String] {
        &self.subject_tags
    }

    pub fn series(&self) -> Option<SeriesPosition> {
        self.series
    }

    /// Raw mailbox text, if already obtained.
    pub fn raw_source(&self) -> Option<&str> {
        self.raw.as_deref()
    }

    /// Whether the raw text has been parsed into the full field map.
    pub fn is_resolved(&self) -> bool {
        matches!(self.fields, Fields::Resolved(_))
    }

    /// A mail without a date or a subject is never cached nor shown.
    pub fn is_broken(&self) -> bool {
        self.date.is_none() || self.subject.is_none()
    }

    /// Field value among those already known, without fetching or parsing.
    pub fn field(&self, name: &str) -> Option<&str> {
        let name = name.to_lowercase();
        if name == "subject" && self.subject.is_some() {
            return self.subject.as_deref();
        }
        match &self.fields {
            Fields::Resolved(map) => map.get(&name).map(String::as_str),
            Fields::Unresolved { known } => known.get(&name).and_then(|v| v.as_deref()),
        }
    }

    /// Field value, parsing (and if needed fetching) the raw text on first use.
    ///
    /// `None` means the field is absent.
    pub fn resolve_field(&mut self, name: &str, source: &dyn RawSource) -> Option<&str> {
        let name = name.to_lowercase();
        if name == "subject" && self.subject.is_some() {
            return self.subject.as_deref();
        }
        let settled = match &self.fields {
            Fields::Resolved(_) => true,
            Fields::Unresolved { known } => known.contains_key(&name),
        };
        if !settled {
            self.resolve(source);
        }
        self.field(&name)
    }

    /// Parse the raw text into the full field map, once.
    ///
    /// Fields supplied by the input fill in whatever the raw text lacks.
    pub fn resolve(&mut self, source: &dyn RawSource) {
        if self.is_resolved() {
            return;
        }
        let mut parsed = mime::parse_fields(self.ensure_raw(source));
        let Fields::Unresolved { known } =
            std::mem::replace(&mut self.fields, Fields::Resolved(FieldMap::new()))
        else {
            return;
        };
        for (name, value) in known {
            if let Some(value) = value {
                parsed.entry(name).or_insert(value);
            }
        }
        self.fields = Fields::Resolved(parsed);
    }

    /// Raw text, fetched on first call. A failed fetch leaves it empty.
    fn ensure_raw(&mut self, source: &dyn RawSource) -> &str {
        if self.raw.is_none() {
            let fetched = self.fetch_raw(source);
            self.raw = Some(fetched);
        }
        self.raw.as_deref().unwrap_or_default()
    }

    fn fetch_raw(&self, source: &dyn RawSource) -> String {
        let result = if let Some(blob) = &self.blob {
            debug!(key = %blob.cache_key(), "Reading mail blob");
            source.read_blob(blob)
        } else if let Some(msgid) = self.field("message-id") {
            debug!(msgid = msgid, "Fetching mail");
            source.fetch_message(msgid)
        } else {
            Err(MlError::Fetch(
                "mail has neither a blob nor a message id".into(),
            ))
        };
        result.unwrap_or_else(|e| {
            warn!(error = %e, "Cannot get raw mail text");
            String::new()
        })
    }

    /// Cache key: `"<object_id>/<archive_root>"` for blob mails, otherwise
    /// the message id.
    pub fn cache_key(&mut self, source: &dyn RawSource) -> Option<String> {
        if let Some(blob) = &self.blob {
            return Some(blob.cache_key());
        }
        self.resolve_field("message-id", source).map(str::to_string)
    }

    /// Flat record for the cache. Fetches the raw text if not yet obtained.
    pub fn to_flat_record(&mut self, source: &dyn RawSource) -> Result<FlatRecord> {
        let subject = self
            .subject
            .clone()
            .ok_or_else(|| MlError::BrokenMail("no subject".into()))?;
        self.ensure_raw(source);
        let msgid = self
            .resolve_field("message-id", source)
            .map(str::to_string);
        Ok(FlatRecord {
            gitid: self.blob.as_ref().map(|b| b.object_id.clone()),
            gitdir: self.blob.as_ref().map(|b| b.archive_root.clone()),
            subject,
            msgid,
            mbox: self.raw.clone().unwrap_or_default(),
        })
    }

    /// Insert `tag_line` (e.g. `Reviewed-by: ...`) right before the body's
    /// first `---` line.
    pub fn insert_tag_line(&mut self, tag_line: &str, source: &dyn RawSource) -> Result<()> {
        self.resolve(source);
        let Fields::Resolved(map) = &mut self.fields else {
            return Err(MlError::MissingField("body".into()));
        };
        let body = map
            .get("body")
            .ok_or_else(|| MlError::MissingField("body".into()))?;

        let mut lines: Vec<&str> = body.split('\n').collect();
        let marker = lines
            .iter()
            .position(|line| *line == "---")
            .ok_or(MlError::NoSplitMarker)?;
        lines.insert(marker, tag_line);
        let new_body = lines.join("\n");

        map.insert("body".to_string(), new_body);
        Ok(())
    }

    /// Prefix the body with a summary of the series cover letter.
    ///
    /// `cover` must already carry its body (see [`Mail::resolve`]). The last
    /// three paragraphs of the cover letter are dropped as trailer text.
    pub fn prepend_cover_letter(
        &mut self,
        cover: &Mail,
        series_size: usize,
        source: &dyn RawSource,
    ) -> Result<()> {
        let cover_subject = cover
            .subject()
            .ok_or_else(|| MlError::MissingField("subject".into()))?;
        let cover_body = cover
            .field("body")
            .ok_or_else(|| MlError::MissingField("body".into()))?;

        let label = wrap_label("Patch series", &format!("'{cover_subject}'"), LABEL_WIDTH);
        let paragraphs: Vec<&str> = cover_body.trim().split("\n\n").collect();
        let keep = paragraphs.len().saturating_sub(3);
        let cover_text = paragraphs[..keep].join("\n\n");

        self.resolve(source);
        let Fields::Resolved(map) = &mut self.fields else {
            return Err(MlError::MissingField("body".into()));
        };
        let own_body = map
            .get("body")
            .ok_or_else(|| MlError::MissingField("body".into()))?;

        let new_body = [
            label.join("\n"),
            String::new(),
            cover_text,
            String::new(),
            format!("This patch (of {series_size}):"),
            String::new(),
            own_body.clone(),
        ]
        .join("\n");
        map.insert("body".to_string(), new_body);
        Ok(())
    }

    /// Human readable rendering: local date, main headers, then the body.
    pub fn display_text(&mut self, source: &dyn RawSource) -> String {
        let local_date = self
            .date
            .map(|d| d.with_timezone(&Local).to_string())
            .unwrap_or_default();
        let mut lines = vec![format!("Local-Date: {local_date}")];
        for head in DISPLAY_HEADERS {
            if let Some(value) = self.resolve_field(head, source) {
                if !value.is_empty() {
                    lines.push(format!("{head}: {value}"));
                }
            }
        }
        let body = self.resolve_field("body", source).unwrap_or_default();
        lines.push(format!("\n{body}"));
        lines.join("\n")
    }
}

/// Word-wrap `prefix text` at `width` display columns, continuation lines
/// indented under the first word of `text`.
fn wrap_label(prefix: &str, text: &str, width: usize) -> Vec<String> {
    let indent = " ".repeat(prefix.width() + 1);
    let mut lines = Vec::new();
    let mut current = prefix.to_string();
    let mut line_has_word = false;

    for word in text.split_whitespace() {
        if line_has_word && current.width() + 1 + word.width() > width {
            lines.push(std::mem::replace(&mut current, indent.clone()));
            current.push_str(word);
        } else {
            current.push(' ');
            current.push_str(word);
        }
        line_has_word = true;
    }
    lines.push(current);
    lines
}
