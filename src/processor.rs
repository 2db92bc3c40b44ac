//! Per-item export state machine
//!
//! One animation on one character moves through
//! `Pending → DetailFetched → ExportSubmitted → Polling → Downloaded`,
//! with `Failed` reachable from every non-terminal state. The processor
//! never lets an error escape to the dispatcher: every item settles into an
//! [`ItemOutcome`], and terminal failures additionally leave a durable
//! [`FailureRecord`](crate::failure::FailureRecord) before returning.
//!
//! Three guards run before any remote call and short-circuit to a skip:
//! motion-pack listings, an existing destination file, and a filename
//! already recorded in the harvest state. Together they make re-running the
//! whole pipeline over a partially completed output directory safe and
//! cheap.

use crate::client::{ExportStatus, MocapApi};
use crate::config::{HarvestConfig, RetryConfig};
use crate::download::Downloader;
use crate::error::{Error, Result};
use crate::failure::{FailureRecord, FailureSink};
use crate::retry::call_with_retry;
use crate::state::StateHandle;
use crate::types::{output_filename, AnimationListing, AssetKind, ItemOutcome, SkipReason};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Drives one animation through the export/poll/download cycle.
#[derive(Clone)]
pub struct ItemProcessor {
    api: Arc<dyn MocapApi>,
    downloader: Downloader,
    state: StateHandle,
    failures: FailureSink,
    retry: RetryConfig,
    poll_interval: Duration,
    max_poll_duration: Option<Duration>,
}

impl ItemProcessor {
    /// Build a processor over the shared pipeline collaborators.
    pub fn new(
        api: Arc<dyn MocapApi>,
        state: StateHandle,
        failures: FailureSink,
        harvest: &HarvestConfig,
        retry: RetryConfig,
    ) -> Self {
        Self {
            downloader: Downloader::new(api.clone()),
            api,
            state,
            failures,
            retry,
            poll_interval: harvest.poll_interval,
            max_poll_duration: harvest.max_poll_duration,
        }
    }

    /// Process one animation for one character; always settles.
    ///
    /// `character_dir` is the character's output directory, already created
    /// by the dispatcher.
    pub async fn process(
        &self,
        character_id: &str,
        listing: &AnimationListing,
        character_dir: &Path,
    ) -> ItemOutcome {
        if listing.kind == AssetKind::MotionPack {
            tracing::info!(animation = %listing.name, "Skipping motion pack");
            return ItemOutcome::Skipped(SkipReason::MotionPack);
        }

        let filename = output_filename(&listing.name, &listing.motion_id, character_id);
        let dest = character_dir.join(&filename);

        if dest.exists() {
            tracing::info!(path = %dest.display(), "Skipping existing file");
            return ItemOutcome::Skipped(SkipReason::FileExists);
        }
        if self.state.contains(character_id, &filename).await {
            tracing::info!(filename = %filename, "Skipping already processed animation");
            return ItemOutcome::Skipped(SkipReason::AlreadyRecorded);
        }

        match self.export_and_download(character_id, listing, &dest).await {
            Ok(()) => match self.state.record(character_id, filename.clone()).await {
                Ok(()) => ItemOutcome::Completed(filename),
                Err(e) => {
                    // The artifact is on disk; the disk-exists guard keeps
                    // re-runs idempotent even though the snapshot missed it.
                    self.settle_failure(character_id, listing, &e).await
                }
            },
            Err(e) => self.settle_failure(character_id, listing, &e).await,
        }
    }

    /// Steps 1–4 of the state machine; any error here is terminal for the item.
    async fn export_and_download(
        &self,
        character_id: &str,
        listing: &AnimationListing,
        dest: &Path,
    ) -> Result<()> {
        // Pending → DetailFetched
        let api = &self.api;
        let gms_hash =
            call_with_retry(&self.retry, || api.fetch_product(&listing.id, character_id)).await?;
        let export_hash = gms_hash.into_export_form();

        // DetailFetched → ExportSubmitted
        call_with_retry(&self.retry, || {
            api.submit_export(character_id, export_hash.clone(), &listing.name)
        })
        .await?;
        tracing::info!(
            character_id,
            animation = %listing.name,
            "Export submitted, polling for completion"
        );

        // ExportSubmitted → Polling → (artifact URL)
        let download_url = self.poll_until_terminal(character_id).await?;

        // → Downloaded
        self.downloader.fetch_to_path(&download_url, dest).await?;
        Ok(())
    }

    /// Poll the per-character monitor until the job reaches a terminal
    /// status.
    ///
    /// Each individual poll call is retried on transient failure; the loop
    /// itself has no attempt ceiling and is bounded only by the optional
    /// `max_poll_duration` budget. A worker therefore blocks here for the
    /// job's full remote processing time, which is what throttles in-flight
    /// jobs to the pool width.
    async fn poll_until_terminal(&self, character_id: &str) -> Result<String> {
        let started = tokio::time::Instant::now();
        loop {
            let api = &self.api;
            let status = call_with_retry(&self.retry, || api.poll_export(character_id)).await?;
            match status {
                ExportStatus::Completed { download_url } => return Ok(download_url),
                ExportStatus::Failed { message } => return Err(Error::ExportFailed(message)),
                ExportStatus::Pending { status } => {
                    if let Some(budget) = self.max_poll_duration {
                        let elapsed = started.elapsed();
                        if elapsed >= budget {
                            return Err(Error::PollTimeout { elapsed });
                        }
                    }
                    tracing::debug!(character_id, status = %status, "Export still in progress");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }

    /// Convert a terminal error into a durable failure record and a settled
    /// outcome. Never propagates: a record that cannot be written is logged
    /// and the outcome still settles.
    async fn settle_failure(
        &self,
        character_id: &str,
        listing: &AnimationListing,
        error: &Error,
    ) -> ItemOutcome {
        let reason = error.to_string();
        let record = FailureRecord::new(character_id, listing, &reason);
        if let Err(write_err) = self.failures.write(&record).await {
            tracing::error!(
                character_id,
                animation = %listing.name,
                error = %write_err,
                "Could not write failure record"
            );
        }
        ItemOutcome::Failed(reason)
    }
}
