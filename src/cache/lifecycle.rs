//! Cache generation lifecycle.
//!
//! The lifecycle manager exclusively owns generation creation and deletion
//! and holds the single authoritative handle to the active generation's
//! store. The dispatcher only ever reaches a store through that handle,
//! never by generation name.
//!
//! Per candidate generation the states run
//! `uninstalled → installing → installed → activating → active`, with
//! `install_failed` looping back to uninstalled for retry.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::join_all;
use thiserror::Error;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::cache::entry::RequestKey;
use crate::cache::store::{CacheStore, StoreError};
use crate::fetch::{join_origin, Fetch, FetchError, OriginRequest};

/// Lifecycle state of one candidate generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationState {
    Uninstalled,
    Installing,
    Installed,
    Activating,
    Active,
    InstallFailed,
}

#[derive(Error, Debug)]
pub enum InstallError {
    #[error("shell asset {path} fetch failed: {source}")]
    AssetFetch {
        path: String,
        #[source]
        source: FetchError,
    },

    #[error("shell asset {path} returned status {status}")]
    AssetStatus { path: String, status: u16 },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("install already in progress for generation {0}")]
    InProgress(String),

    #[error("shell asset list is empty")]
    EmptyAssetList,

    #[error("generation {0} is already active")]
    AlreadyActive(String),
}

#[derive(Error, Debug)]
pub enum ActivateError {
    #[error("generation {0} is not installed")]
    NotInstalled(String),

    #[error("generation {0} is mid-transition")]
    InProgress(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Owner of all generation stores and the active-generation handle.
pub struct Lifecycle {
    /// Directory holding one store directory per generation.
    root: PathBuf,

    /// Origin base URL shell asset paths resolve against.
    origin_base: String,

    /// Fetcher used to populate stores during install.
    fetcher: Arc<dyn Fetch>,

    /// The active generation's store. Exactly one generation is active at a
    /// time; `None` only before the first activation.
    active: RwLock<Option<Arc<CacheStore>>>,

    /// Observed lifecycle state per candidate generation.
    states: RwLock<HashMap<String, GenerationState>>,
}

impl Lifecycle {
    pub fn new(root: impl Into<PathBuf>, origin_base: impl Into<String>, fetcher: Arc<dyn Fetch>) -> Self {
        Self {
            root: root.into(),
            origin_base: origin_base.into(),
            fetcher,
            active: RwLock::new(None),
            states: RwLock::new(HashMap::new()),
        }
    }

    /// Handle to the active generation's store, if any generation has been
    /// activated yet.
    pub async fn active_store(&self) -> Option<Arc<CacheStore>> {
        self.active.read().await.clone()
    }

    /// Tag of the active generation, if any.
    pub async fn active_generation(&self) -> Option<String> {
        self.active
            .read()
            .await
            .as_ref()
            .map(|store| store.generation().to_string())
    }

    /// Lifecycle state of a candidate generation.
    pub async fn state(&self, generation: &str) -> GenerationState {
        self.states
            .read()
            .await
            .get(generation)
            .copied()
            .unwrap_or(GenerationState::Uninstalled)
    }

    /// Whether a populated store directory already exists for a generation.
    /// Used at startup to skip re-installing after a restart.
    pub async fn is_installed_on_disk(&self, generation: &str) -> bool {
        let mut dir = match fs::read_dir(self.root.join(generation)).await {
            Ok(dir) => dir,
            Err(_) => return false,
        };
        matches!(dir.next_entry().await, Ok(Some(_)))
    }

    /// Install a generation: create its store and populate it with every
    /// shell asset, in order.
    ///
    /// All-or-nothing: any fetch failure or non-success status fails the
    /// install, the candidate store is discarded, and whatever generation
    /// was active before stays active and untouched. Population happens in
    /// a staging directory that is renamed into place only on success, so a
    /// crashed or failed install can never leave a half-filled store under
    /// the generation's name.
    pub async fn install(&self, generation: &str, assets: &[String]) -> Result<(), InstallError> {
        // An empty shell means the app cannot boot offline; refuse rather
        // than produce a store that looks uninstalled.
        if assets.is_empty() {
            return Err(InstallError::EmptyAssetList);
        }

        {
            let mut states = self.states.write().await;
            match states.get(generation) {
                Some(GenerationState::Installing) | Some(GenerationState::Activating) => {
                    return Err(InstallError::InProgress(generation.to_string()));
                }
                Some(GenerationState::Active) => {
                    return Err(InstallError::AlreadyActive(generation.to_string()));
                }
                _ => {}
            }
            states.insert(generation.to_string(), GenerationState::Installing);
        }

        info!(generation, assets = assets.len(), "Installing cache generation");

        match self.populate(generation, assets).await {
            Ok(()) => {
                self.states
                    .write()
                    .await
                    .insert(generation.to_string(), GenerationState::Installed);
                info!(generation, "Install complete");
                Ok(())
            }
            Err(e) => {
                self.discard_staging(generation).await;
                self.states
                    .write()
                    .await
                    .insert(generation.to_string(), GenerationState::InstallFailed);
                warn!(generation, error = %e, "Install failed");
                Err(e)
            }
        }
    }

    async fn populate(&self, generation: &str, assets: &[String]) -> Result<(), InstallError> {
        let staging = self.staging_dir(generation);
        if fs::try_exists(&staging).await.unwrap_or(false) {
            // Leftover from an aborted install.
            fs::remove_dir_all(&staging).await?;
        }
        let store = CacheStore::open_dir(staging.clone(), generation).await?;

        for path in assets {
            let url = join_origin(&self.origin_base, path);
            let request = OriginRequest::get(&url);

            let response = self
                .fetcher
                .fetch(&request)
                .await
                .map_err(|source| InstallError::AssetFetch {
                    path: path.clone(),
                    source,
                })?;

            if !response.is_success() {
                return Err(InstallError::AssetStatus {
                    path: path.clone(),
                    status: response.status,
                });
            }

            let key = RequestKey::new("GET", &url);
            store.put(&key, &response).await?;
        }

        // Swap the populated staging directory into place.
        let final_dir = self.root.join(generation);
        if fs::try_exists(&final_dir).await.unwrap_or(false) {
            fs::remove_dir_all(&final_dir).await?;
        }
        fs::rename(&staging, &final_dir).await?;
        Ok(())
    }

    /// Activate an installed generation: swap the active handle to it, then
    /// delete every other generation's store.
    ///
    /// The deletion sweep is best-effort; a failure merely wastes disk and
    /// is logged, since all addressing goes through the active handle.
    pub async fn activate(&self, generation: &str) -> Result<(), ActivateError> {
        {
            let mut states = self.states.write().await;
            match states.get(generation) {
                Some(GenerationState::Active) => return Ok(()),
                Some(GenerationState::Installing) | Some(GenerationState::Activating) => {
                    return Err(ActivateError::InProgress(generation.to_string()));
                }
                _ => {}
            }
            states.insert(generation.to_string(), GenerationState::Activating);
        }

        let store = match self.open_installed(generation).await {
            Ok(store) => store,
            Err(e) => {
                self.states
                    .write()
                    .await
                    .insert(generation.to_string(), GenerationState::Uninstalled);
                return Err(e);
            }
        };

        let previous = {
            let mut active = self.active.write().await;
            let previous = active
                .as_ref()
                .map(|store| store.generation().to_string());
            *active = Some(Arc::new(store));
            previous
        };

        {
            let mut states = self.states.write().await;
            if let Some(ref previous) = previous {
                states.remove(previous);
            }
            states.insert(generation.to_string(), GenerationState::Active);
        }

        info!(generation, previous = ?previous, "Activated cache generation");

        self.sweep_stale(generation).await;
        Ok(())
    }

    async fn open_installed(&self, generation: &str) -> Result<CacheStore, ActivateError> {
        if !self.is_installed_on_disk(generation).await {
            return Err(ActivateError::NotInstalled(generation.to_string()));
        }
        Ok(CacheStore::open(&self.root, generation).await?)
    }

    /// Delete every store directory whose name is not the active generation.
    async fn sweep_stale(&self, keep: &str) {
        let mut stale = Vec::new();
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Could not enumerate cache root for cleanup");
                return;
            }
        };
        while let Ok(Some(item)) = entries.next_entry().await {
            if let Some(name) = item.file_name().to_str() {
                if name != keep {
                    stale.push((name.to_string(), item.path()));
                }
            }
        }

        // A sibling install may be mid-populate; its staging directory is
        // not stale, it is about to become a store.
        {
            let states = self.states.read().await;
            stale.retain(|(name, _)| {
                name.strip_suffix(".staging")
                    .map(|candidate| {
                        !matches!(states.get(candidate), Some(GenerationState::Installing))
                    })
                    .unwrap_or(true)
            });
        }

        let deletions = stale.into_iter().map(|(name, path)| async move {
            match fs::remove_dir_all(&path).await {
                Ok(()) => info!(generation = %name, "Deleted stale cache store"),
                Err(e) => warn!(generation = %name, error = %e, "Failed to delete stale store"),
            }
        });
        join_all(deletions).await;
    }

    fn staging_dir(&self, generation: &str) -> PathBuf {
        self.root.join(format!("{generation}.staging"))
    }

    async fn discard_staging(&self, generation: &str) {
        let staging = self.staging_dir(generation);
        if let Err(e) = fs::remove_dir_all(&staging).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(generation, error = %e, "Failed to discard staging store");
            }
        }
    }

    /// Cache root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }
}
