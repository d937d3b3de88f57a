//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::cell::Cell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use mlcache::config::CacheConfig;
use mlcache::error::{MlError, Result};
use mlcache::source::{BlobRef, RawSource};

pub fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// In-memory [`RawSource`] counting how often it is asked.
#[derive(Default)]
pub struct FakeSource {
    blobs: HashMap<String, String>,
    messages: HashMap<String, String>,
    pub calls: Cell<usize>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blob(mut self, blob: &BlobRef, raw: &str) -> Self {
        self.blobs.insert(blob.cache_key(), raw.to_string());
        self
    }

    pub fn with_message(mut self, msgid: &str, raw: &str) -> Self {
        self.messages.insert(msgid.to_string(), raw.to_string());
        self
    }
}

impl RawSource for FakeSource {
    fn read_blob(&self, blob: &BlobRef) -> Result<String> {
        self.calls.set(self.calls.get() + 1);
        self.blobs
            .get(&blob.cache_key())
            .cloned()
            .ok_or_else(|| MlError::Fetch(format!("no blob {}", blob.cache_key())))
    }

    fn fetch_message(&self, message_id: &str) -> Result<String> {
        self.calls.set(self.calls.get() + 1);
        self.messages
            .get(message_id)
            .cloned()
            .ok_or_else(|| MlError::Fetch(format!("no message {message_id}")))
    }
}

/// Raw mailbox text with the given headers and a one-line body.
pub fn raw_mail(msgid: &str, subject: &str, date: &str) -> String {
    format!("From: Dev <dev@example.com>\nSubject: {subject}\nMessage-Id: {msgid}\nDate: {date}\n\nbody of {msgid}\n")
}

pub fn limits(max_active_cache_sz: u64, max_archived_caches: usize) -> CacheConfig {
    CacheConfig {
        max_active_cache_sz,
        max_archived_caches,
    }
}
