//! RFC 5322 header block parsing: folding, encoded-words (RFC 2047), and date parsing.

use std::collections::BTreeMap;

use base64::Engine as _;
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use tracing::warn;

/// Parsed header and body fields, keyed by lowercase header name plus `body`.
pub type FieldMap = BTreeMap<String, String>;

/// Header block of a raw message and the text following it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderBlock<'a> {
    /// Unfolded headers keyed by lowercase name; later duplicates win.
    pub fields: FieldMap,
    /// Everything after the first blank line (empty if there is none).
    pub body: &'a str,
}

/// Split raw mailbox text into its unfolded header fields and the body text.
///
/// A leading mbox `From ` separator line is skipped. Header lines are
/// `name: value`; lines starting with a space or tab continue the previous
/// header and are appended after a single space. The block ends at the first
/// blank line.
pub fn parse_header_block(raw: &str) -> HeaderBlock<'_> {
    let text = skip_from_line(raw);
    let mut fields = FieldMap::new();
    let mut current: Option<String> = None;
    let mut consumed = 0usize;
    let mut body: Option<&str> = None;

    for line in text.split_inclusive('\n') {
        consumed += line.len();
        let line = line.trim_end_matches(['\n', '\r']);

        if line.starts_with([' ', '\t']) {
            if let Some(value) = current.as_ref().and_then(|k| fields.get_mut(k)) {
                value.push(' ');
                value.push_str(line.trim());
                continue;
            }
        }

        let line = line.trim();
        if line.is_empty() {
            body = Some(&text[consumed..]);
            break;
        }

        match line.find(':') {
            Some(colon) => {
                let name = line[..colon].trim().to_lowercase();
                let rest = &line[colon + 1..];
                let value = rest.strip_prefix(' ').unwrap_or(rest);
                fields.insert(name.clone(), value.to_string());
                current = Some(name);
            }
            None => {
                // Not a header line and not a continuation: ignore it
                current = None;
            }
        }
    }

    if let Some(msgid) = fields.get_mut("message-id") {
        if let Some(first) = msgid.split_whitespace().next() {
            *msgid = first.to_string();
        }
    }

    if let Some(date) = fields.get_mut("date") {
        *date = strip_thread_overview(date);
    }

    HeaderBlock {
        fields,
        body: body.unwrap_or(""),
    }
}

/// Drop a trailing `[thread overview]` left by text pasted from a web archive.
fn strip_thread_overview(date: &str) -> String {
    let tokens: Vec<&str> = date.split_whitespace().collect();
    if tokens.len() >= 2 && tokens[tokens.len() - 2..] == ["[thread", "overview]"] {
        return tokens[..tokens.len() - 2].join(" ");
    }
    date.to_string()
}

/// Skip the `From ` separator line at the start of mbox messages.
pub fn skip_from_line(text: &str) -> &str {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    if text.starts_with("From ") {
        return match text.find('\n') {
            Some(pos) => &text[pos + 1..],
            None => "",
        };
    }
    text
}

/// Decode RFC 2047 encoded-words in a header value.
///
/// Example: `"=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?="` → `"Hola mundo"`
///
/// If decoding fails for any token, the original text is preserved.
pub fn decode_encoded_words(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut remaining = input;
    let mut last_was_encoded = false;

    while let Some(start) = remaining.find("=?") {
        let before = &remaining[..start];
        // Whitespace between two encoded words is dropped (RFC 2047 §6.2)
        if !last_was_encoded || !before.trim().is_empty() {
            result.push_str(before);
        }

        let after_start = &remaining[start + 2..];

        if let Some((text, consumed)) = try_decode_one_word(after_start) {
            result.push_str(&text);
            remaining = &after_start[consumed..];
            last_was_encoded = true;
        } else {
            result.push_str("=?");
            remaining = after_start;
            last_was_encoded = false;
        }
    }

    result.push_str(remaining);
    result
}

/// Decode `charset?encoding?text?=`, returning the text and bytes consumed.
fn try_decode_one_word(s: &str) -> Option<(String, usize)> {
    let (charset, rest) = s.split_once('?')?;
    let (encoding, rest2) = rest.split_once('?')?;
    let end = rest2.find("?=")?;
    let encoded_text = &rest2[..end];
    let consumed = charset.len() + 1 + encoding.len() + 1 + end + 2;

    let bytes = match encoding.to_ascii_uppercase().as_str() {
        "B" => base64::engine::general_purpose::STANDARD
            .decode(encoded_text.trim())
            .ok()?,
        "Q" => decode_q_encoding(encoded_text),
        _ => return None,
    };

    Some((decode_charset(charset, &bytes), consumed))
}

/// Decode Q-encoding (RFC 2047): underscores → spaces, `=XX` → byte.
fn decode_q_encoding(input: &str) -> Vec<u8> {
    let mut result = Vec::with_capacity(input.len());
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => {
                result.push(b' ');
                i += 1;
            }
            b'=' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap_or("");
                if let Ok(byte) = u8::from_str_radix(hex, 16) {
                    result.push(byte);
                    i += 3;
                } else {
                    result.push(b'=');
                    i += 1;
                }
            }
            b => {
                result.push(b);
                i += 1;
            }
        }
    }
    result
}

/// Decode bytes using a named charset.
fn decode_charset(charset: &str, bytes: &[u8]) -> String {
    match charset.to_lowercase().as_str() {
        "utf-8" | "utf8" => String::from_utf8_lossy(bytes).into_owned(),
        _ => {
            if let Some(encoding) = encoding_rs::Encoding::for_label(charset.as_bytes()) {
                let (decoded, _, _) = encoding.decode(bytes);
                decoded.into_owned()
            } else {
                warn!(
                    charset = charset,
                    "Unknown charset, falling back to UTF-8 lossy"
                );
                String::from_utf8_lossy(bytes).into_owned()
            }
        }
    }
}

/// Parse a `Date:` header value, keeping the sender's UTC offset.
///
/// Supports RFC 2822, ISO 8601, and common broken real-world variants.
pub fn parse_date(date_str: &str) -> Option<DateTime<FixedOffset>> {
    let trimmed = date_str.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt);
    }

    let no_dow = strip_day_of_week(trimmed);
    // Trailing comments such as "(PST)" confuse the format strings below
    let no_comment = match no_dow.find(" (") {
        Some(pos) => no_dow[..pos].to_string(),
        None => no_dow,
    };

    let formats = [
        "%d %b %Y %H:%M:%S %z",
        "%d %b %Y %H:%M %z",
        "%Y-%m-%dT%H:%M:%S%z",
        "%Y-%m-%d %H:%M:%S %z",
    ];
    let naive_formats = ["%d %b %Y %H:%M:%S", "%Y-%m-%d %H:%M:%S"];

    let candidates = [no_comment.clone(), replace_named_tz(&no_comment)];
    for candidate in &candidates {
        for fmt in &formats {
            if let Ok(dt) = DateTime::parse_from_str(candidate, fmt) {
                return Some(dt);
            }
        }
        for fmt in &naive_formats {
            if let Ok(ndt) = NaiveDateTime::parse_from_str(candidate, fmt) {
                return Some(Utc.from_utc_datetime(&ndt).fixed_offset());
            }
        }
    }

    warn!(date = trimmed, "Could not parse date");
    None
}

/// Parse the ISO 8601 date printed by `git log --date=iso-strict`.
///
/// Accepts the offset with or without the hour separator (`+05:00`, `+0500`).
pub fn parse_iso_date(date_str: &str) -> Option<DateTime<FixedOffset>> {
    let trimmed = date_str.trim();
    DateTime::parse_from_rfc3339(trimmed)
        .or_else(|_| DateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%z"))
        .ok()
}

/// Strip leading day-of-week prefix (e.g. "Thu, " or "Thu ").
fn strip_day_of_week(s: &str) -> String {
    let days = [
        "Mon,", "Tue,", "Wed,", "Thu,", "Fri,", "Sat,", "Sun,", "Mon ", "Tue ", "Wed ", "Thu ",
        "Fri ", "Sat ", "Sun ",
    ];
    for day in &days {
        if let Some(rest) = s.strip_prefix(day) {
            return rest.trim().to_string();
        }
    }
    s.to_string()
}

/// Replace well-known timezone abbreviations with numeric offsets.
fn replace_named_tz(s: &str) -> String {
    let tzs = [
        ("EST", "-0500"),
        ("EDT", "-0400"),
        ("CST", "-0600"),
        ("CDT", "-0500"),
        ("MST", "-0700"),
        ("MDT", "-0600"),
        ("PST", "-0800"),
        ("PDT", "-0700"),
        ("GMT", "+0000"),
        ("UTC", "+0000"),
        ("CEST", "+0200"),
        ("CET", "+0100"),
        ("JST", "+0900"),
    ];
    let mut result = s.to_string();
    for (name, offset) in &tzs {
        if result.ends_with(name) {
            let pos = result.len() - name.len();
            result.replace_range(pos.., offset);
            return result;
        }
    }
    result
}
