//! Artifact download
//!
//! Streams a completed export artifact to disk chunk by chunk — the full
//! body is never held in memory — and reports bytes transferred against the
//! declared content length when the remote supplies one. Existing
//! destination files short-circuit before any network round-trip.

use crate::client::MocapApi;
use crate::error::Result;
use futures::StreamExt;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

/// Result of one download attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Destination already existed; no network call was made
    SkippedExisting,
    /// Artifact written, with the number of bytes transferred
    Written(u64),
}

/// Streams completed artifacts to their destination paths.
#[derive(Clone)]
pub struct Downloader {
    api: Arc<dyn MocapApi>,
}

impl Downloader {
    /// Build a downloader over the given API client.
    pub fn new(api: Arc<dyn MocapApi>) -> Self {
        Self { api }
    }

    /// Stream the artifact at `url` into `dest`.
    ///
    /// Skips silently when `dest` already exists (idempotent no-op, not a
    /// failure) — checked once at entry, before the fetch.
    pub async fn fetch_to_path(&self, url: &str, dest: &Path) -> Result<DownloadOutcome> {
        if dest.exists() {
            tracing::info!(path = %dest.display(), "Skipping existing file");
            return Ok(DownloadOutcome::SkippedExisting);
        }

        let artifact = self.api.fetch_artifact(url).await?;
        let declared = artifact.content_length;

        let mut file = tokio::fs::File::create(dest).await?;
        let mut written: u64 = 0;
        let mut chunks = artifact.chunks;
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
            tracing::trace!(
                path = %dest.display(),
                written,
                declared = declared.unwrap_or(0),
                "Download progress"
            );
        }
        file.flush().await?;

        match declared {
            Some(total) if total != written => {
                tracing::warn!(
                    path = %dest.display(),
                    written,
                    declared = total,
                    "Downloaded size differs from declared content length"
                );
            }
            _ => {
                tracing::info!(path = %dest.display(), bytes = written, "Downloaded artifact");
            }
        }

        Ok(DownloadOutcome::Written(written))
    }
}
