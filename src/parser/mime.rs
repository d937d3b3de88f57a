//! Body decoding: MIME payload via `mail-parser`, with raw-text fallbacks.

use base64::Engine as _;
use mail_parser::MessageParser;
use tracing::debug;

use crate::error::{MlError, Result};
use crate::parser::header::{self, FieldMap};

/// Parse raw mailbox text into its complete field map, including `body`.
///
/// Never fails: when the payload cannot be MIME-decoded the body falls back
/// to the raw lines after the header block.
pub fn parse_fields(raw: &str) -> FieldMap {
    let block = header::parse_header_block(raw);
    let mut fields = block.fields;

    let body = match decode_payload(raw, &fields) {
        Ok(text) => text,
        Err(e) => {
            debug!(error = %e, "MIME decoding failed, using raw body lines");
            fallback_body(block.body, &fields)
        }
    };
    fields.insert("body".to_string(), body);
    fields
}

/// Decode the single-part payload of a message (transfer encoding and charset).
///
/// Multipart messages have no single payload and are reported as an error.
fn decode_payload(raw: &str, fields: &FieldMap) -> Result<String> {
    let is_multipart = fields
        .get("content-type")
        .is_some_and(|ct| ct.trim().to_lowercase().starts_with("multipart/"));
    if is_multipart {
        return Err(MlError::Parse("multipart message has no single payload".into()));
    }

    let message_bytes = header::skip_from_line(raw).as_bytes();
    let parsed = MessageParser::default()
        .parse(message_bytes)
        .ok_or_else(|| MlError::Parse("unparseable MIME message".into()))?;

    parsed
        .body_text(0)
        .map(|text| text.into_owned())
        .ok_or_else(|| MlError::Parse("message has no text payload".into()))
}

/// Raw body lines, base64-decoded when the header declares that encoding.
fn fallback_body(body: &str, fields: &FieldMap) -> String {
    let is_base64 = fields
        .get("content-transfer-encoding")
        .is_some_and(|cte| cte.trim().eq_ignore_ascii_case("base64"));
    if !is_base64 {
        return body.to_string();
    }

    let compact: String = body.chars().filter(|c| !c.is_whitespace()).collect();
    match base64::engine::general_purpose::STANDARD.decode(compact) {
        Ok(bytes) => String::from_utf8(bytes).unwrap_or_else(|_| body.to_string()),
        Err(_) => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_body() {
        let fields = parse_fields("Subject: hi\nDate: Mon, 1 Jan 2024 00:00:00 +0000\n\nhello\n---\nbye\n");
        assert_eq!(fields["subject"], "hi");
        assert!(fields["body"].starts_with("hello\n---\nbye"));
    }

    #[test]
    fn test_quoted_printable_body_is_decoded() {
        let raw = concat!(
            "Subject: qp\n",
            "Content-Type: text/plain; charset=utf-8\n",
            "Content-Transfer-Encoding: quoted-printable\n",
            "\n",
            "caf=C3=A9\n",
        );
        let fields = parse_fields(raw);
        assert!(fields["body"].contains("café"));
    }

    #[test]
    fn test_multipart_falls_back_to_raw_lines() {
        let raw = concat!(
            "Subject: mp\n",
            "Content-Type: multipart/mixed; boundary=\"xx\"\n",
            "\n",
            "--xx\n",
            "Content-Type: text/plain\n",
            "\n",
            "part one\n",
            "--xx--\n",
        );
        let fields = parse_fields(raw);
        assert!(fields["body"].starts_with("--xx\n"));
        assert!(fields["body"].contains("part one"));
    }

    #[test]
    fn test_fallback_base64_body() {
        let mut fields = FieldMap::new();
        fields.insert("content-transfer-encoding".into(), "base64".into());
        assert_eq!(fallback_body("aGVs\nbG8=\n", &fields), "hello");
        // Undecodable input keeps the raw lines
        assert_eq!(fallback_body("@@@\n", &fields), "@@@\n");
    }

    #[test]
    fn test_fallback_without_encoding_is_verbatim() {
        assert_eq!(fallback_body("raw\n", &FieldMap::new()), "raw\n");
    }
}
