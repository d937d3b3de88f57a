use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::path::Path;

use mlcache::cache::CacheSegment;
use mlcache::model::mail::Mail;
use mlcache::model::record::FlatRecord;

fn fixture_text() -> String {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("series.mbox");
    std::fs::read_to_string(path).unwrap()
}

fn bench_from_raw_text(c: &mut Criterion) {
    let text = fixture_text();
    let first = text.split("\nFrom mailer").next().unwrap().to_string();

    c.bench_function("mail_from_raw_text", |b| {
        b.iter(|| Mail::from_raw_text(black_box(first.as_str())))
    });
}

fn bench_read_mbox(c: &mut Criterion) {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("series.mbox");

    c.bench_function("read_mails_series", |b| {
        b.iter(|| mlcache::parser::mbox::read_mails(&path, None).unwrap())
    });
}

fn bench_segment_lookup(c: &mut Criterion) {
    let mut segment = CacheSegment::new();
    for i in 0..10_000 {
        let msgid = format!("<{i}@example.com>");
        segment.put(
            msgid.clone(),
            FlatRecord {
                gitid: None,
                gitdir: None,
                subject: format!("[PATCH {}/{}] change {i}", i % 7 + 1, 7),
                msgid: Some(msgid),
                mbox: String::new(),
            },
        );
    }

    c.bench_function("segment_get_hit", |b| {
        b.iter(|| segment.get(black_box("<4242@example.com>")).is_some())
    });
    c.bench_function("segment_get_miss", |b| {
        b.iter(|| segment.get(black_box("<absent@example.com>")).is_none())
    });
}

criterion_group!(
    benches,
    bench_from_raw_text,
    bench_read_mbox,
    bench_segment_lookup
);
criterion_main!(benches);
