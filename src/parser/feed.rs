//! Atom feed entries as published by public-inbox archives.

use serde::{Deserialize, Serialize};

/// One `<entry>` of an archive's Atom feed, already decoded from XML.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEntry {
    /// `<title>`, the mail subject.
    pub title: String,
    /// `<updated>`, e.g. `2024-01-01T00:00:00Z`.
    pub updated: String,
    #[serde(default)]
    pub author_name: String,
    #[serde(default)]
    pub author_email: String,
    /// `<link href>`, `<list_url>/<msgid>/`.
    pub link: String,
    /// `<thr:in-reply-to href>`, if the mail is a reply.
    #[serde(default)]
    pub in_reply_to: Option<String>,
}

impl FeedEntry {
    /// `From` value rendered as `"<name> <email>"`.
    pub fn from_field(&self) -> String {
        format!("{} {}", self.author_name, self.author_email)
            .trim()
            .to_string()
    }
}

/// Turn an archive link into an angle-bracketed message id.
///
/// `https://lore.kernel.org/linux-mm/2024.1@x/` under
/// `https://lore.kernel.org/linux-mm` gives `<2024.1@x>`.
pub fn message_id_from_link(link: &str, list_url: &str) -> Option<String> {
    let prefix = format!("{}/", list_url.trim_end_matches('/'));
    let id = link.strip_prefix(&prefix)?.trim_matches('/');
    if id.is_empty() {
        return None;
    }
    Some(format!("<{id}>"))
}
