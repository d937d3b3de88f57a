//! `mlcache`, the metadata layer of a mailing-list archive browser.
//!
//! This crate models mails assembled from raw mailbox text, git archive
//! blobs, Atom feed entries and cached records, and keeps a bounded tiered
//! on-disk cache of them plus a small persistent tag store.

pub mod cache;
pub mod config;
pub mod error;
pub mod model;
pub mod parser;
pub mod source;
pub mod store;
pub mod tags;
