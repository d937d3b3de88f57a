//! Tiered on-disk mail cache.

pub mod segment;
pub mod stats;
pub mod tiered;

pub use segment::CacheSegment;
pub use stats::{stats, SegmentStat};
pub use tiered::{TieredCache, ACTIVE_FILE, ARCHIVE_PREFIX};
