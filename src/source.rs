//! Raw mailbox text providers: git archive blobs and the public-inbox server.

use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

use tracing::debug;

use crate::config::FetchConfig;
use crate::error::{MlError, Result};
use crate::parser::decode_text;

/// Identity of a message stored as a blob in a git mail archive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlobRef {
    /// Commit holding the message (the blob is `<object_id>:m`).
    pub object_id: String,
    /// Archive repository, passed as `--git-dir`.
    pub archive_root: String,
}

impl BlobRef {
    pub fn new(object_id: impl Into<String>, archive_root: impl Into<String>) -> Self {
        Self {
            object_id: object_id.into(),
            archive_root: archive_root.into(),
        }
    }

    /// Cache key, `"<object_id>/<archive_root>"`.
    pub fn cache_key(&self) -> String {
        format!("{}/{}", self.object_id, self.archive_root)
    }
}

/// Supplies raw mailbox text for mails that were not built from it.
pub trait RawSource {
    /// Read the message stored in a git archive blob.
    fn read_blob(&self, blob: &BlobRef) -> Result<String>;

    /// Download the raw message with the given angle-bracketed id.
    fn fetch_message(&self, message_id: &str) -> Result<String>;
}

/// [`RawSource`] backed by `git show` and `curl` child processes.
#[derive(Debug, Clone)]
pub struct ProcessSource {
    git: PathBuf,
    curl: PathBuf,
    site: String,
    throttle: Duration,
}

impl ProcessSource {
    pub fn new(config: &FetchConfig) -> Self {
        Self {
            git: PathBuf::from("git"),
            curl: PathBuf::from("curl"),
            site: config.site.trim_end_matches('/').to_string(),
            throttle: config.throttle(),
        }
    }

    /// URL of the raw message on the public-inbox server.
    pub fn raw_url(&self, message_id: &str) -> String {
        let id = message_id
            .strip_prefix('<')
            .and_then(|s| s.strip_suffix('>'))
            .unwrap_or(message_id);
        format!("{}/all/{}/raw", self.site, id)
    }
}

impl RawSource for ProcessSource {
    fn read_blob(&self, blob: &BlobRef) -> Result<String> {
        let mut cmd = Command::new(&self.git);
        cmd.arg(format!("--git-dir={}", blob.archive_root))
            .arg("show")
            .arg(format!("{}:m", blob.object_id));
        let text = run_capture(cmd, "git show")?;
        Ok(text.trim().to_string())
    }

    fn fetch_message(&self, message_id: &str) -> Result<String> {
        let url = self.raw_url(message_id);
        // Don't overload the public-inbox server
        std::thread::sleep(self.throttle);
        debug!(url = %url, "Fetching raw message");
        let mut cmd = Command::new(&self.curl);
        cmd.arg("--silent").arg("--fail").arg(&url);
        run_capture(cmd, "curl")
    }
}

/// Run a command and return its decoded stdout; non-zero exit is a fetch error.
fn run_capture(mut cmd: Command, what: &str) -> Result<String> {
    let output = cmd
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .map_err(|e| MlError::Fetch(format!("{what}: {e}")))?;
    if !output.status.success() {
        return Err(MlError::Fetch(format!("{what} exited with {}", output.status)));
    }
    Ok(decode_text(&output.stdout))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_cache_key() {
        assert_eq!(BlobRef::new("deadbeef", "0.git").cache_key(), "deadbeef/0.git");
    }

    #[test]
    fn test_raw_url_strips_brackets() {
        let source = ProcessSource::new(&FetchConfig {
            site: "https://lore.kernel.org/".into(),
            throttle_ms: 0,
        });
        assert_eq!(
            source.raw_url("<20240101.1@example.com>"),
            "https://lore.kernel.org/all/20240101.1@example.com/raw"
        );
    }

    #[test]
    fn test_missing_binary_is_fetch_error() {
        let cmd = Command::new("/nonexistent/definitely-not-git");
        assert!(matches!(run_capture(cmd, "git"), Err(MlError::Fetch(_))));
    }
}
