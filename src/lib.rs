//! # mocap-dl
//!
//! Resumable bulk harvester for a remote motion-capture asset catalog.
//!
//! For every character in the catalog, every animation is exported to FBX
//! through the remote's asynchronous export pipeline (submit, poll to
//! completion, download the artifact). Runs are resumable: completed work is
//! tracked in a JSON state snapshot and reconstructed from the output
//! directory when the snapshot is missing, so an interrupted harvest picks up
//! where it left off at the cost of re-listing the catalog.
//!
//! ## Design Philosophy
//!
//! mocap-dl is designed to be:
//! - **Resumable** - Re-running over partial output is safe and cheap
//! - **Failure-isolating** - One failed animation never aborts its siblings
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - Consumers subscribe to progress events, no polling
//!
//! ## Quick Start
//!
//! ```no_run
//! use mocap_dl::{Config, Harvester};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Defaults read the bearer token from ./mixamo_token.txt and write
//!     // artifacts under ./animations.
//!     let harvester = Harvester::new(Config::default())?;
//!
//!     // Subscribe to progress events
//!     let mut events = harvester.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let summary = harvester.run().await?;
//!     println!(
//!         "completed {} / skipped {} / failed {}",
//!         summary.completed, summary.skipped, summary.failed
//!     );
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Character catalog loading and caching
pub mod catalog;
/// Remote API client and trait seam
pub mod client;
/// Configuration types
pub mod config;
/// Harvest orchestration
pub mod dispatcher;
/// Artifact streaming to disk
pub mod download;
/// Error types
pub mod error;
/// Durable records for permanently failed items
pub mod failure;
/// Per-item export state machine
pub mod processor;
/// Retry logic with exponential backoff
pub mod retry;
/// Resumable harvest state
pub mod state;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use catalog::{CatalogCache, CatalogLoader, JsonCatalogCache, MemoryCatalogCache};
pub use client::{
    bytes_stream::ArtifactStream, read_bearer_token, ExportStatus, HttpMocapClient, MocapApi,
};
pub use config::{ApiConfig, Config, HarvestConfig, RetryConfig};
pub use dispatcher::{Harvester, HarvestSummary};
pub use download::{DownloadOutcome, Downloader};
pub use error::{Error, Result};
pub use failure::{FailureRecord, FailureSink};
pub use processor::ItemProcessor;
pub use retry::{call_with_retry, IsRetryable};
pub use state::{
    HarvestState, JsonStateStore, MemoryStateStore, StateHandle, StateStore,
};
pub use types::{
    character_dir_name, output_filename, sanitize_name, AnimationListing, AssetKind, Character,
    Event, ExportGmsHash, ExportPreferences, GmsHash, ItemOutcome, SkipReason,
};
