//! Integration tests for mail file reading and entity parsing.

mod common;

use common::{fixture, FakeSource};
use mlcache::error::MlError;
use mlcache::model::mail::Mail;
use mlcache::model::subject::SeriesPosition;
use mlcache::parser::mbox::{read_mails, MboxParser};

#[test]
fn test_fixture_has_three_messages() {
    let parser = MboxParser::new(fixture("series.mbox")).unwrap();
    let mut count = 0u64;
    parser
        .parse(
            &mut |_offset, _bytes| {
                count += 1;
                true
            },
            None,
        )
        .unwrap();
    assert_eq!(count, 3);
}

#[test]
fn test_read_mails_skips_broken() {
    let mails = read_mails(&fixture("series.mbox"), None).unwrap();
    let subjects: Vec<&str> = mails.iter().filter_map(|m| m.subject()).collect();
    assert_eq!(
        subjects,
        vec!["[PATCH 0/2] mm: fix two bugs", "[PATCH 1/2] mm: fix first bug"]
    );
    assert_eq!(mails[1].series(), Some(SeriesPosition { index: 1, total: 2 }));
    assert_eq!(mails[1].field("in-reply-to"), Some("<cover.1@example.com>"));
}

#[test]
fn test_read_mails_from_json_records() {
    let mails = read_mails(&fixture("records.json"), None).unwrap();
    assert_eq!(mails.len(), 1);
    let mail = &mails[0];
    assert_eq!(mail.subject_tags(), ["rfc"]);
    assert!(mail.series().is_none());
    assert_eq!(mail.blob().map(|b| b.cache_key()).as_deref(), Some("deadbeef/0.git"));
    assert_eq!(
        mail.date().map(|d| d.to_rfc3339()).as_deref(),
        Some("2024-01-02T10:00:00+01:00")
    );
}

#[test]
fn test_tag_line_and_cover_letter() {
    let source = FakeSource::new();
    let mut mails = read_mails(&fixture("series.mbox"), None).unwrap();
    let mut patch = mails.pop().unwrap();
    let mut cover = mails.pop().unwrap();

    patch
        .insert_tag_line("Reviewed-by: Rev <rev@example.com>", &source)
        .unwrap();
    let body = patch.resolve_field("body", &source).unwrap().to_string();
    assert!(body.contains("Reviewed-by: Rev <rev@example.com>\n---\n"));

    cover.resolve(&source);
    patch.prepend_cover_letter(&cover, 2, &source).unwrap();
    let body = patch.resolve_field("body", &source).unwrap();
    assert!(body.starts_with("Patch series '[PATCH 0/2] mm: fix two bugs'"));
    assert!(body.contains("This series fixes two bugs."));
    assert!(body.contains("  mm: fix second bug"));
    assert!(!body.contains("base-commit"));
    assert!(!body.contains("2.43.0"));
    assert!(body.contains("This patch (of 2):"));
    assert!(cover.field("body").unwrap().contains("2.43.0"));

    assert!(matches!(
        cover.insert_tag_line("Acked-by: x", &source),
        Err(MlError::NoSplitMarker)
    ));
}

#[test]
fn test_flat_record_round_trip() {
    let source = FakeSource::new();
    let mut mails = read_mails(&fixture("series.mbox"), None).unwrap();
    let first = mails[0].to_flat_record(&source).unwrap();
    let mut rebuilt = Mail::from_record(first.clone());
    let second = rebuilt.to_flat_record(&source).unwrap();
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
    assert_eq!(source.calls.get(), 0);
}
