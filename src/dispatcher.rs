//! Harvest orchestration
//!
//! [`Harvester`] is the crate's facade: build one from a [`Config`], then
//! call [`run`](Harvester::run). Characters are walked strictly one at a
//! time; within a character, animation listings are fed to a pool of
//! processor tasks bounded by a semaphore. Because each worker blocks through
//! its export job's remote processing time, the pool width is also the cap on
//! jobs in flight on the remote service.
//!
//! Progress is observable through a broadcast [`Event`] channel; dropping all
//! receivers is fine, events are fire-and-forget.

use crate::catalog::{CatalogCache, CatalogLoader, JsonCatalogCache};
use crate::client::{HttpMocapClient, MocapApi};
use crate::config::Config;
use crate::error::Result;
use crate::failure::FailureSink;
use crate::processor::ItemProcessor;
use crate::retry::call_with_retry;
use crate::state::{JsonStateStore, StateHandle, StateStore};
use crate::types::{character_dir_name, Character, Event, ItemOutcome};
use std::sync::Arc;
use tokio::sync::{broadcast, Semaphore};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Aggregate counts for one [`Harvester::run`] invocation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HarvestSummary {
    /// Characters processed.
    pub characters: usize,
    /// Items that completed a full export/download cycle.
    pub completed: usize,
    /// Items skipped by a guard (motion pack, existing file, recorded state).
    pub skipped: usize,
    /// Items that settled as failures.
    pub failed: usize,
}

/// Walks the character catalog and harvests every eligible animation.
pub struct Harvester {
    config: Config,
    api: Arc<dyn MocapApi>,
    state_store: Arc<dyn StateStore>,
    catalog_cache: Arc<dyn CatalogCache>,
    event_tx: broadcast::Sender<Event>,
}

impl std::fmt::Debug for Harvester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Harvester")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Harvester {
    /// Build a harvester with production collaborators: an HTTP client
    /// authenticated from the configured token file, and JSON-file-backed
    /// state and catalog stores.
    ///
    /// Fails fast when the token file is missing or the base URL is invalid.
    pub fn new(config: Config) -> Result<Self> {
        let api = HttpMocapClient::new(&config.api, config.harvest.page_size)?;
        let state_store = JsonStateStore::new(&config.harvest.state_file);
        let catalog_cache = JsonCatalogCache::new(&config.harvest.character_cache);
        Ok(Self::with_parts(
            config,
            Arc::new(api),
            Arc::new(state_store),
            Arc::new(catalog_cache),
        ))
    }

    /// Build a harvester with explicit collaborators. This is the seam for
    /// tests and for embedding with alternative transports or stores.
    pub fn with_parts(
        config: Config,
        api: Arc<dyn MocapApi>,
        state_store: Arc<dyn StateStore>,
        catalog_cache: Arc<dyn CatalogCache>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            api,
            state_store,
            catalog_cache,
            event_tx,
        }
    }

    /// Subscribe to progress events. May be called any number of times,
    /// before or during a run.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    fn emit(&self, event: Event) {
        // No receivers is not an error.
        let _ = self.event_tx.send(event);
    }

    /// Harvest the full catalog: every animation for every character.
    ///
    /// Characters run sequentially; items within a character run on the
    /// bounded pool. Item failures are absorbed into the summary and never
    /// abort the run. Errors returned here are setup or catalog-level
    /// failures (directories, state snapshot, character listing after retry
    /// exhaustion).
    pub async fn run(&self) -> Result<HarvestSummary> {
        let harvest = &self.config.harvest;
        tokio::fs::create_dir_all(&harvest.output_dir).await?;
        tokio::fs::create_dir_all(&harvest.failure_dir).await?;

        let state =
            StateHandle::load_or_rebuild(self.state_store.clone(), &harvest.output_dir).await?;
        let loader = CatalogLoader::new(
            self.api.clone(),
            self.catalog_cache.clone(),
            harvest.page_size,
            self.config.retry.clone(),
        );
        let characters = loader.load_characters().await?;
        tracing::info!(characters = characters.len(), "Starting harvest");

        let processor = ItemProcessor::new(
            self.api.clone(),
            state,
            FailureSink::new(&harvest.failure_dir),
            harvest,
            self.config.retry.clone(),
        );

        let mut summary = HarvestSummary::default();
        for character in &characters {
            self.process_character(character, &processor, &mut summary)
                .await?;
            summary.characters += 1;
        }

        tracing::info!(
            characters = summary.characters,
            completed = summary.completed,
            skipped = summary.skipped,
            failed = summary.failed,
            "Harvest finished"
        );
        Ok(summary)
    }

    /// Page through one character's animations and settle every listing.
    async fn process_character(
        &self,
        character: &Character,
        processor: &ItemProcessor,
        summary: &mut HarvestSummary,
    ) -> Result<()> {
        tracing::info!(character_id = %character.id, name = %character.name, "Processing character");
        self.emit(Event::CharacterStarted {
            character_id: character.id.clone(),
            name: character.name.clone(),
        });

        let character_dir = self
            .config
            .harvest
            .output_dir
            .join(character_dir_name(character));
        tokio::fs::create_dir_all(&character_dir).await?;

        let semaphore = Arc::new(Semaphore::new(
            self.config.harvest.max_concurrent_exports.max(1),
        ));
        let mut handles = Vec::new();
        let mut submitted = 0usize;
        let mut page = 1;
        // A page-fetch failure must not leave spawned tasks running detached,
        // so the error is carried past the settling loop below instead of
        // returning early.
        let mut fatal: Option<crate::error::Error> = None;
        'paging: loop {
            let api = &self.api;
            let listings =
                match call_with_retry(&self.config.retry, || api.list_animations(page)).await {
                    Ok(listings) => listings,
                    Err(e) => {
                        fatal = Some(e);
                        break 'paging;
                    }
                };
            if listings.is_empty() {
                break;
            }
            self.emit(Event::PageFetched {
                page,
                count: listings.len(),
            });
            tracing::info!(page, count = listings.len(), "Fetched animation page");

            for listing in listings {
                submitted += 1;
                let permit = match semaphore.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        fatal =
                            Some(crate::error::Error::Other(format!("worker pool closed: {e}")));
                        break 'paging;
                    }
                };
                let processor = processor.clone();
                let character_id = character.id.clone();
                let character_dir = character_dir.clone();
                handles.push(tokio::spawn(async move {
                    let outcome = processor
                        .process(&character_id, &listing, &character_dir)
                        .await;
                    drop(permit);
                    (listing.name, outcome)
                }));
            }
            page += 1;
        }

        if fatal.is_some() {
            tracing::warn!(
                character_id = %character.id,
                in_flight = handles.len(),
                "Page fetch failed, waiting for in-flight items to settle"
            );
        }
        for handle in handles {
            let (animation, outcome) = match handle.await {
                Ok(settled) => settled,
                Err(e) => {
                    let panic = crate::error::Error::Other(format!("processor task panicked: {e}"));
                    fatal.get_or_insert(panic);
                    continue;
                }
            };
            match &outcome {
                ItemOutcome::Completed(_) => summary.completed += 1,
                ItemOutcome::Skipped(_) => summary.skipped += 1,
                ItemOutcome::Failed(_) => summary.failed += 1,
            }
            self.emit(Event::ItemSettled {
                character_id: character.id.clone(),
                animation,
                outcome,
            });
        }
        if let Some(e) = fatal {
            return Err(e);
        }

        self.emit(Event::CharacterCompleted {
            character_id: character.id.clone(),
            submitted,
        });
        tracing::info!(character_id = %character.id, submitted, "Character done");
        Ok(())
    }
}
