//! Streaming mbox reader and mail-file loading.
//!
//! Reads mbox files line-by-line with a large buffer and never holds more
//! than one message in memory. Tolerant of malformed input.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{MlError, Result};
use crate::model::mail::Mail;
use crate::model::record::FlatRecord;
use crate::parser::decode_text;

/// Size of the internal read buffer.
const READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Default maximum message size in bytes (64 MB).
const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Streaming mbox parser.
///
/// Invokes a caller-supplied callback for every message it finds. Tolerant of:
///
/// - Mixed `\n` and `\r\n` line endings
/// - `From ` lines not preceded by a blank line (logs a warning)
/// - Truncated messages at EOF
/// - UTF-8 BOM at the start of the file
pub struct MboxParser {
    path: PathBuf,
    file_size: u64,
    max_message_size: usize,
}

impl MboxParser {
    /// Create a parser for the given mbox file.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = std::fs::metadata(&path).map_err(|e| MlError::io(&path, e))?;
        Ok(Self {
            path,
            file_size: metadata.len(),
            max_message_size: MAX_MESSAGE_SIZE,
        })
    }

    /// Total size of the underlying file in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Parse the whole file, calling `message_callback` for each message.
    ///
    /// The callback receives `(offset, raw_bytes)` and returns `true` to
    /// continue or `false` to stop early. Returns the number of messages
    /// delivered.
    pub fn parse(
        &self,
        message_callback: &mut dyn FnMut(u64, &[u8]) -> bool,
        progress_callback: Option<&dyn Fn(u64, u64)>,
    ) -> Result<u64> {
        if self.file_size == 0 {
            return Ok(0);
        }

        let file = File::open(&self.path).map_err(|e| MlError::io(&self.path, e))?;
        let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, file);

        let mut count: u64 = 0;
        let mut current_offset: u64 = 0;
        let mut message_buf: Vec<u8> = Vec::with_capacity(64 * 1024);
        let mut message_start: u64 = 0;
        let mut prev_line_was_empty = true;
        let mut first_line = true;
        let mut last_progress: u64 = 0;
        let mut line_buf: Vec<u8> = Vec::with_capacity(4096);
        const PROGRESS_INTERVAL: u64 = 4 * 1024 * 1024;

        loop {
            line_buf.clear();
            let line_len = reader
                .read_until(b'\n', &mut line_buf)
                .map_err(|e| MlError::io(&self.path, e))?;
            if line_len == 0 {
                break;
            }

            if is_mbox_separator(&line_buf) {
                if !first_line && !prev_line_was_empty {
                    warn!(
                        offset = current_offset,
                        "Found 'From ' separator without preceding blank line"
                    );
                }
                if !message_buf.is_empty() {
                    if !message_callback(message_start, &message_buf) {
                        return Ok(count);
                    }
                    count += 1;
                }
                message_start = current_offset;
                message_buf.clear();
                message_buf.extend_from_slice(&line_buf);
            } else if message_buf.len() + line_buf.len() <= self.max_message_size {
                message_buf.extend_from_slice(&line_buf);
            } else if message_buf.len() <= self.max_message_size {
                warn!(
                    offset = message_start,
                    max_size = self.max_message_size,
                    "Message exceeds maximum size, truncating body"
                );
                // Push past the limit so the warning is logged once
                message_buf.push(b'\n');
            }

            prev_line_was_empty = is_blank_line(&line_buf);
            first_line = false;
            current_offset += line_len as u64;

            if let Some(cb) = progress_callback {
                if current_offset - last_progress >= PROGRESS_INTERVAL {
                    cb(current_offset, self.file_size);
                    last_progress = current_offset;
                }
            }
        }

        if !message_buf.is_empty() && message_callback(message_start, &message_buf) {
            count += 1;
        }

        if let Some(cb) = progress_callback {
            cb(self.file_size, self.file_size);
        }

        Ok(count)
    }
}

/// Load every complete mail from an mbox file, or from a `.json` file
/// holding a list of flat records. Broken mails are skipped.
pub fn read_mails(path: &Path, progress: Option<&dyn Fn(u64, u64)>) -> Result<Vec<Mail>> {
    if path.extension().is_some_and(|ext| ext == "json") {
        let contents = std::fs::read_to_string(path).map_err(|e| MlError::io(path, e))?;
        let records: Vec<FlatRecord> =
            serde_json::from_str(&contents).map_err(|e| MlError::corrupt(path, e))?;
        return Ok(records
            .into_iter()
            .map(Mail::from_record)
            .filter(|mail| !mail.is_broken())
            .collect());
    }

    let parser = MboxParser::new(path)?;
    let mut mails = Vec::new();
    let mut skipped = 0usize;
    parser.parse(
        &mut |_offset, bytes| {
            let mail = Mail::from_raw_text(decode_text(bytes));
            if mail.is_broken() {
                skipped += 1;
            } else {
                mails.push(mail);
            }
            true
        },
        progress,
    )?;
    debug!(
        path = %path.display(),
        mails = mails.len(),
        skipped = skipped,
        "Read mbox file"
    );
    Ok(mails)
}

/// Check whether a line is an mbox separator (`From ` at the start).
fn is_mbox_separator(line: &[u8]) -> bool {
    let line = line.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(line);
    line.starts_with(b"From ")
}

/// Check whether a line is blank (empty or only whitespace / CR / LF).
fn is_blank_line(line: &[u8]) -> bool {
    line.iter()
        .all(|&b| b == b'\n' || b == b'\r' || b == b' ' || b == b'\t')
}
