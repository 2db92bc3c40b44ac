//! Character catalog loading and caching
//!
//! The full character set is fetched once through short-page pagination and
//! persisted to a local cache. When the cache exists it is returned
//! unconditionally — the loader never self-invalidates; deleting the cache
//! file out-of-band is the refresh mechanism.
//!
//! Animation pagination is intentionally *not* here: it is driven page by
//! page by the dispatcher, which stops at the first empty page.

use crate::client::MocapApi;
use crate::config::RetryConfig;
use crate::error::{Error, Result};
use crate::retry::call_with_retry;
use crate::types::Character;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

/// Persistence port for the character catalog cache.
#[async_trait]
pub trait CatalogCache: Send + Sync {
    /// Load the cached character set, or `None` if no cache exists.
    async fn load(&self) -> Result<Option<Vec<Character>>>;

    /// Persist the full character set.
    async fn store(&self, characters: &[Character]) -> Result<()>;
}

/// [`CatalogCache`] backed by a single JSON document.
pub struct JsonCatalogCache {
    path: PathBuf,
}

impl JsonCatalogCache {
    /// Create a cache reading/writing the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CatalogCache for JsonCatalogCache {
    async fn load(&self) -> Result<Option<Vec<Character>>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = tokio::fs::read_to_string(&self.path).await?;
        let characters = serde_json::from_str(&raw).map_err(|e| {
            Error::StateStore(format!(
                "character cache {} is not valid JSON: {e}",
                self.path.display()
            ))
        })?;
        Ok(Some(characters))
    }

    async fn store(&self, characters: &[Character]) -> Result<()> {
        let json = serde_json::to_string(characters)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}

/// In-memory [`CatalogCache`] for tests and embedding.
#[derive(Default)]
pub struct MemoryCatalogCache {
    characters: std::sync::Mutex<Option<Vec<Character>>>,
}

impl MemoryCatalogCache {
    /// Create an empty in-memory cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cache pre-seeded with a character set.
    pub fn seeded(characters: Vec<Character>) -> Self {
        Self {
            characters: std::sync::Mutex::new(Some(characters)),
        }
    }
}

#[async_trait]
impl CatalogCache for MemoryCatalogCache {
    async fn load(&self) -> Result<Option<Vec<Character>>> {
        Ok(self
            .characters
            .lock()
            .map_err(|_| Error::StateStore("catalog cache mutex poisoned".to_string()))?
            .clone())
    }

    async fn store(&self, characters: &[Character]) -> Result<()> {
        *self
            .characters
            .lock()
            .map_err(|_| Error::StateStore("catalog cache mutex poisoned".to_string()))? =
            Some(characters.to_vec());
        Ok(())
    }
}

/// Loads the full character set, preferring the local cache over the network.
pub struct CatalogLoader {
    api: Arc<dyn MocapApi>,
    cache: Arc<dyn CatalogCache>,
    page_size: usize,
    retry: RetryConfig,
}

impl CatalogLoader {
    /// Build a loader over the given API client and cache.
    pub fn new(
        api: Arc<dyn MocapApi>,
        cache: Arc<dyn CatalogCache>,
        page_size: usize,
        retry: RetryConfig,
    ) -> Self {
        Self {
            api,
            cache,
            page_size,
            retry,
        }
    }

    /// Return the full character set.
    ///
    /// A present cache short-circuits the network entirely. Otherwise pages
    /// are fetched (with retry around each page) until a short page signals
    /// the end, and the accumulated set is cached before returning.
    pub async fn load_characters(&self) -> Result<Vec<Character>> {
        if let Some(cached) = self.cache.load().await? {
            tracing::info!(characters = cached.len(), "Using cached character catalog");
            return Ok(cached);
        }

        let mut characters: Vec<Character> = Vec::new();
        let mut page = 1;
        loop {
            let api = &self.api;
            let batch =
                call_with_retry(&self.retry, || api.list_characters(page)).await?;
            let short_page = batch.len() < self.page_size;
            tracing::info!(page, count = batch.len(), "Fetched character catalog page");
            characters.extend(batch);

            if short_page {
                break;
            }
            page += 1;
        }

        self.cache.store(&characters).await?;
        tracing::info!(characters = characters.len(), "Character catalog cached");
        Ok(characters)
    }
}
