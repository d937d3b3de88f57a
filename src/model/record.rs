//! Flat key/value form of a mail, the only format crossing the cache boundary.

use serde::{Deserialize, Deserializer, Serialize};

/// Serialized mail as stored in cache segments and the tag file.
///
/// Carries enough to rebuild a [`Mail`](super::mail::Mail) without fetching:
/// the blob identity (if any), the subject, the message id and the raw
/// mailbox text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatRecord {
    /// Git object id of the blob holding the message.
    pub gitid: Option<String>,
    /// Archive repository (`--git-dir`) the blob lives in.
    pub gitdir: Option<String>,
    pub subject: String,
    /// Angle-bracketed `Message-Id`.
    #[serde(default)]
    pub msgid: Option<String>,
    /// Raw mailbox text. Older files may hold `null` here.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub mbox: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_order_on_the_wire() {
        let rec = FlatRecord {
            gitid: Some("deadbeef".into()),
            gitdir: Some("0.git".into()),
            subject: "s".into(),
            msgid: Some("<a@b>".into()),
            mbox: "m".into(),
        };
        let json = serde_json::to_string(&rec).unwrap();
        assert_eq!(
            json,
            r#"{"gitid":"deadbeef","gitdir":"0.git","subject":"s","msgid":"<a@b>","mbox":"m"}"#
        );
    }

    #[test]
    fn test_null_mbox_reads_as_empty() {
        let rec: FlatRecord = serde_json::from_str(
            r#"{"gitid":null,"gitdir":null,"subject":"s","msgid":"<a@b>","mbox":null}"#,
        )
        .unwrap();
        assert_eq!(rec.mbox, "");
        assert!(rec.gitid.is_none());
    }

    #[test]
    fn test_missing_subject_is_rejected() {
        let res: std::result::Result<FlatRecord, _> =
            serde_json::from_str(r#"{"gitid":null,"gitdir":null,"mbox":""}"#);
        assert!(res.is_err());
    }
}
