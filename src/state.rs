//! Resumable harvest state
//!
//! The harvest state is the crash-safety checkpoint of the whole pipeline: a
//! durable mapping of `character_id → set of output filenames already
//! produced`. It is loaded once at startup (or rebuilt by scanning the output
//! tree), mutated after each successful item, and persisted synchronously
//! after every mutation, so an interrupted run loses at most the in-flight
//! items.
//!
//! Persistence is behind the [`StateStore`] port so tests can swap the JSON
//! snapshot file for an in-memory store.

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Durable mapping of character id to the output filenames already produced.
///
/// Invariant: a filename present here corresponds to a completed file on
/// disk (best-effort; contents are not checksummed). The per-character sets
/// only ever grow during a run.
pub type HarvestState = HashMap<String, HashSet<String>>;

/// Persistence port for the harvest state snapshot.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the persisted snapshot, or `None` if none exists yet.
    async fn load(&self) -> Result<Option<HarvestState>>;

    /// Persist the full snapshot, replacing any previous one.
    async fn persist(&self, state: &HarvestState) -> Result<()>;
}

/// [`StateStore`] backed by a single JSON document
/// (`{"character_id": ["file.fbx", ...], ...}`).
pub struct JsonStateStore {
    path: PathBuf,
}

impl JsonStateStore {
    /// Create a store reading/writing the given snapshot path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl StateStore for JsonStateStore {
    async fn load(&self) -> Result<Option<HarvestState>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = tokio::fs::read_to_string(&self.path).await?;
        let state = serde_json::from_str(&raw).map_err(|e| {
            Error::StateStore(format!(
                "snapshot {} is not valid state JSON: {e}",
                self.path.display()
            ))
        })?;
        Ok(Some(state))
    }

    async fn persist(&self, state: &HarvestState) -> Result<()> {
        let json = serde_json::to_string(state)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}

/// In-memory [`StateStore`] for tests and embedding.
#[derive(Default)]
pub struct MemoryStateStore {
    snapshot: std::sync::Mutex<Option<HarvestState>>,
}

impl MemoryStateStore {
    /// Create an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> Result<Option<HarvestState>> {
        Ok(self
            .snapshot
            .lock()
            .map_err(|_| Error::StateStore("state snapshot mutex poisoned".to_string()))?
            .clone())
    }

    async fn persist(&self, state: &HarvestState) -> Result<()> {
        *self
            .snapshot
            .lock()
            .map_err(|_| Error::StateStore("state snapshot mutex poisoned".to_string()))? =
            Some(state.clone());
        Ok(())
    }
}

/// Shared handle over the in-memory state plus its backing store.
///
/// Mutation-and-persist is a single critical section: workers that complete
/// at nearly the same instant serialize through one mutex, so no update is
/// lost and every snapshot on disk reflects a real prefix of the run.
#[derive(Clone)]
pub struct StateHandle {
    state: Arc<Mutex<HarvestState>>,
    store: Arc<dyn StateStore>,
}

impl StateHandle {
    /// Load the snapshot from the store, or rebuild it by scanning the
    /// output tree when no snapshot exists.
    ///
    /// Reconstruction mirrors the on-disk layout: each first-level directory
    /// under `output_dir` is `<name>_<character_id>` and its files are that
    /// character's completed set. A rebuilt snapshot is persisted
    /// immediately.
    pub async fn load_or_rebuild(store: Arc<dyn StateStore>, output_dir: &Path) -> Result<Self> {
        let state = match store.load().await? {
            Some(state) => {
                tracing::info!(characters = state.len(), "Loaded harvest state snapshot");
                state
            }
            None => {
                let rebuilt = rebuild_from_output_tree(output_dir).await?;
                tracing::info!(
                    characters = rebuilt.len(),
                    "No snapshot found, reconstructed state from output tree"
                );
                store.persist(&rebuilt).await?;
                rebuilt
            }
        };

        Ok(Self {
            state: Arc::new(Mutex::new(state)),
            store,
        })
    }

    /// Whether `filename` is already recorded for `character_id`.
    pub async fn contains(&self, character_id: &str, filename: &str) -> bool {
        self.state
            .lock()
            .await
            .get(character_id)
            .is_some_and(|files| files.contains(filename))
    }

    /// Record a produced filename and persist the full snapshot before
    /// releasing the lock.
    pub async fn record(&self, character_id: &str, filename: String) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .entry(character_id.to_string())
            .or_default()
            .insert(filename);
        self.store.persist(&state).await
    }

    /// Clone of the current in-memory state (for reporting and tests).
    pub async fn snapshot(&self) -> HarvestState {
        self.state.lock().await.clone()
    }
}

/// Scan `output_dir` and derive the state the way a previous run would have
/// left it: one directory per character, id after the final `_`.
async fn rebuild_from_output_tree(output_dir: &Path) -> Result<HarvestState> {
    let mut state = HarvestState::new();
    if !output_dir.exists() {
        return Ok(state);
    }

    let mut dirs = tokio::fs::read_dir(output_dir).await?;
    while let Some(entry) = dirs.next_entry().await? {
        if !entry.file_type().await?.is_dir() {
            continue;
        }
        let dir_name = entry.file_name().to_string_lossy().into_owned();
        let Some((_, character_id)) = dir_name.rsplit_once('_') else {
            tracing::warn!(dir = %dir_name, "Skipping output directory without a character id suffix");
            continue;
        };

        let mut files = HashSet::new();
        let mut children = tokio::fs::read_dir(entry.path()).await?;
        while let Some(file) = children.next_entry().await? {
            if file.file_type().await?.is_file() {
                files.insert(file.file_name().to_string_lossy().into_owned());
            }
        }
        state.insert(character_id.to_string(), files);
    }

    Ok(state)
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn record_persists_after_every_mutation() {
        let store = Arc::new(MemoryStateStore::new());
        let handle = StateHandle::load_or_rebuild(store.clone(), Path::new("/nonexistent"))
            .await
            .unwrap();

        handle.record("C1", "Walk_m1_C1.fbx".to_string()).await.unwrap();
        let persisted = store.load().await.unwrap().unwrap();
        assert!(persisted["C1"].contains("Walk_m1_C1.fbx"));

        handle.record("C1", "Run_m2_C1.fbx".to_string()).await.unwrap();
        let persisted = store.load().await.unwrap().unwrap();
        assert_eq!(persisted["C1"].len(), 2);
    }

    #[tokio::test]
    async fn recorded_sets_only_grow() {
        let store = Arc::new(MemoryStateStore::new());
        let handle = StateHandle::load_or_rebuild(store.clone(), Path::new("/nonexistent"))
            .await
            .unwrap();

        handle.record("C1", "a.fbx".to_string()).await.unwrap();
        handle.record("C1", "b.fbx".to_string()).await.unwrap();
        // Recording a duplicate is a no-op, never a shrink.
        handle.record("C1", "a.fbx".to_string()).await.unwrap();

        let snapshot = handle.snapshot().await;
        assert_eq!(snapshot["C1"].len(), 2);
        assert!(handle.contains("C1", "a.fbx").await);
        assert!(handle.contains("C1", "b.fbx").await);
    }

    #[tokio::test]
    async fn concurrent_records_lose_no_updates() {
        let store = Arc::new(MemoryStateStore::new());
        let handle = StateHandle::load_or_rebuild(store.clone(), Path::new("/nonexistent"))
            .await
            .unwrap();

        let mut tasks = Vec::new();
        for i in 0..32 {
            let handle = handle.clone();
            tasks.push(tokio::spawn(async move {
                handle.record("C1", format!("clip_{i}.fbx")).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(handle.snapshot().await["C1"].len(), 32);
        let persisted = store.load().await.unwrap().unwrap();
        assert_eq!(persisted["C1"].len(), 32);
    }

    #[tokio::test]
    async fn rebuild_scans_output_tree_when_no_snapshot_exists() {
        let tmp = tempfile::tempdir().unwrap();
        let char_dir = tmp.path().join("X Bot_C1");
        std::fs::create_dir_all(&char_dir).unwrap();
        std::fs::write(char_dir.join("Walk_m1_C1.fbx"), b"fbx").unwrap();
        std::fs::write(char_dir.join("Run_m2_C1.fbx"), b"fbx").unwrap();

        let store = Arc::new(MemoryStateStore::new());
        let handle = StateHandle::load_or_rebuild(store.clone(), tmp.path())
            .await
            .unwrap();

        assert!(handle.contains("C1", "Walk_m1_C1.fbx").await);
        assert!(handle.contains("C1", "Run_m2_C1.fbx").await);
        // The rebuilt snapshot is persisted immediately.
        assert!(store.load().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn existing_snapshot_wins_over_output_tree() {
        let tmp = tempfile::tempdir().unwrap();
        let snapshot_path = tmp.path().join("state.json");
        std::fs::write(&snapshot_path, r#"{"C1": ["Walk_m1_C1.fbx"]}"#).unwrap();

        let store = Arc::new(JsonStateStore::new(&snapshot_path));
        let handle = StateHandle::load_or_rebuild(store, tmp.path()).await.unwrap();

        assert!(handle.contains("C1", "Walk_m1_C1.fbx").await);
        assert!(!handle.contains("C1", "Run_m2_C1.fbx").await);
    }

    #[tokio::test]
    async fn json_store_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let store = JsonStateStore::new(tmp.path().join("state.json"));

        assert!(store.load().await.unwrap().is_none());

        let mut state = HarvestState::new();
        state
            .entry("C1".to_string())
            .or_default()
            .insert("Walk_m1_C1.fbx".to_string());
        store.persist(&state).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded, state);
    }

    #[tokio::test]
    async fn corrupt_snapshot_is_a_state_store_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("state.json");
        std::fs::write(&path, "not json").unwrap();

        let store = JsonStateStore::new(&path);
        let err = store.load().await.unwrap_err();
        assert!(matches!(err, Error::StateStore(_)));
    }
}
