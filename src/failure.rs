//! Durable failure records for offline triage
//!
//! Every permanently failed animation leaves exactly one JSON record in the
//! failure directory, carrying the original listing, the terminal error text
//! and a timestamp. Records are keyed uniquely per animation so concurrent
//! workers never contend on a file.
//!
//! Records are write-only: a later run does NOT consult them to skip a
//! known-bad animation — it retries from scratch, on the assumption that the
//! operator fixes the cause and wants a clean attempt. Deleting a record has
//! no effect on behavior.

use crate::error::Result;
use crate::types::{sanitize_name, AnimationListing};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One permanently failed animation, as written to the failure directory.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FailureRecord {
    /// The character the export was attempted for
    pub character_id: String,
    /// The original catalog listing
    #[serde(flatten)]
    pub listing: AnimationListing,
    /// Terminal error text
    pub error: String,
    /// When the failure was recorded
    pub failed_at: DateTime<Utc>,
}

impl FailureRecord {
    /// Build a record for a failed listing.
    pub fn new(character_id: &str, listing: &AnimationListing, error: &str) -> Self {
        Self {
            character_id: character_id.to_string(),
            listing: listing.clone(),
            error: error.to_string(),
            failed_at: Utc::now(),
        }
    }

    /// Record filename: `<character_id>_<sanitized name>_<motion_id>.json`.
    pub fn file_name(&self) -> String {
        format!(
            "{}_{}_{}.json",
            self.character_id,
            sanitize_name(&self.listing.name),
            self.listing.motion_id
        )
    }
}

/// Writes failure records into a side directory.
#[derive(Clone)]
pub struct FailureSink {
    dir: PathBuf,
}

impl FailureSink {
    /// Create a sink writing into `dir` (created on first use by the harvester).
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The directory records are written into.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist one record. Logged and durable; never consulted on re-runs.
    pub async fn write(&self, record: &FailureRecord) -> Result<()> {
        let path = self.dir.join(record.file_name());
        let json = serde_json::to_string(record)?;
        tokio::fs::write(&path, json).await?;
        tracing::error!(
            character_id = %record.character_id,
            animation = %record.listing.name,
            error = %record.error,
            record = %path.display(),
            "Animation failed permanently, record written"
        );
        Ok(())
    }
}
