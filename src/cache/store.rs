//! On-disk cache store, one per generation.
//!
//! A store is a directory of entry blobs named by the hash of their request
//! identity. Puts are atomic whole-entry replacements (write to a temp
//! sibling, then rename), so overlapping writes to the same key are
//! last-write-wins and a concurrent reader never observes a torn entry.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::entry::{self, RequestKey};
use crate::fetch::OriginResponse;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("entry encode failed: {0}")]
    Encode(#[from] entry::EntryError),
}

/// A persistent key→response store for one generation.
pub struct CacheStore {
    /// Generation tag this store belongs to.
    generation: String,

    /// Directory holding the entry files.
    dir: PathBuf,

    /// File names known to be present. Kept so misses and counts don't hit
    /// the filesystem; authoritative content always comes from disk.
    index: RwLock<HashSet<String>>,
}

impl CacheStore {
    /// Open (create if absent) the store for a generation under `root`.
    pub async fn open(root: &Path, generation: &str) -> Result<Self, StoreError> {
        Self::open_dir(root.join(generation), generation).await
    }

    /// Open a store at an explicit directory. Used for install staging.
    pub(crate) async fn open_dir(dir: PathBuf, generation: &str) -> Result<Self, StoreError> {
        fs::create_dir_all(&dir).await?;

        // Rebuild the index from whatever entries survived a restart.
        let mut index = HashSet::new();
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(item) = entries.next_entry().await? {
            if let Some(name) = item.file_name().to_str() {
                if name.ends_with(".entry") {
                    index.insert(name.to_string());
                }
            }
        }

        debug!(generation, entries = index.len(), dir = %dir.display(), "Opened cache store");

        Ok(Self {
            generation: generation.to_string(),
            dir,
            index: RwLock::new(index),
        })
    }

    /// Generation tag this store serves.
    pub fn generation(&self) -> &str {
        &self.generation
    }

    /// Number of entries currently stored.
    pub async fn len(&self) -> usize {
        self.index.read().await.len()
    }

    /// Whether the store holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.index.read().await.is_empty()
    }

    /// Whether an entry exists for the given key.
    pub async fn contains(&self, key: &RequestKey) -> bool {
        self.index.read().await.contains(&key.file_name())
    }

    /// Read the cached response for a key.
    ///
    /// A corrupt or mismatched entry reads back as a miss; the damage is
    /// logged and the next put replaces the file wholesale.
    pub async fn get(&self, key: &RequestKey) -> Result<Option<OriginResponse>, StoreError> {
        let file_name = key.file_name();
        if !self.index.read().await.contains(&file_name) {
            return Ok(None);
        }

        let path = self.dir.join(&file_name);
        let blob = match fs::read(&path).await {
            Ok(blob) => blob,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match entry::decode(key, &blob) {
            Ok(response) => {
                debug!(key = %key, size = response.body.len(), "Cache hit");
                Ok(Some(response))
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Discarding unreadable cache entry");
                Ok(None)
            }
        }
    }

    /// Store a response for a key, replacing any previous entry atomically.
    pub async fn put(&self, key: &RequestKey, response: &OriginResponse) -> Result<(), StoreError> {
        let blob = entry::encode(key, response)?;
        let file_name = key.file_name();
        let path = self.dir.join(&file_name);

        // Unique temp name: concurrent writers of the same key must not
        // stomp each other's partial file before the rename.
        let tmp = self.dir.join(format!("{}.{}.tmp", file_name, Uuid::new_v4()));
        fs::write(&tmp, &blob).await?;
        fs::rename(&tmp, &path).await?;

        self.index.write().await.insert(file_name);

        debug!(
            key = %key,
            size = blob.len(),
            generation = self.generation,
            "Stored cache entry"
        );

        Ok(())
    }
}
