//! Subject prefix tags (`[PATCH v2 3/7]`) and patch-series position.

/// Position of a patch inside a series, from a trailing `N/M` subject tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesPosition {
    pub index: u32,
    pub total: u32,
}

/// Extract lowercase tags from a bracketed prefix starting at index 0.
///
/// `"[PATCH v2 3/7] mm: fix"` gives `(["patch", "v2", "3/7"], Some(3/7))`.
/// Brackets that do not open the subject are ignored.
pub fn parse_subject_tags(subject: &str) -> (Vec<String>, Option<SeriesPosition>) {
    if !subject.starts_with('[') {
        return (Vec::new(), None);
    }
    let Some(end) = subject.find(']') else {
        return (Vec::new(), None);
    };

    let tags: Vec<String> = subject[1..end]
        .trim()
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect();

    let series = tags.last().and_then(|last| parse_series(last));
    (tags, series)
}

fn parse_series(tag: &str) -> Option<SeriesPosition> {
    let (index, total) = tag.split_once('/')?;
    if !is_digits(index) || !is_digits(total) {
        return None;
    }
    Some(SeriesPosition {
        index: index.parse().ok()?,
        total: total.parse().ok()?,
    })
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}
