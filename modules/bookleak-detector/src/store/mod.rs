// Storage traits and backends.
//
// Three stores, each with an in-memory backend (tests, one-shot runs) and a
// JSON file backend (the CLI's data directory):
//
// - UploadStore: upload records plus the original image bytes
// - ResultStore: analysis passes; a later pass supersedes, never deletes
// - HistoryStore: append-only entries, queryable by content hash

pub mod json_file;
pub mod memory;

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use bookleak_common::{AnalysisResult, HistoryEntry, UploadRecord};

pub use json_file::{JsonHistoryStore, JsonResultStore, JsonUploadStore};
pub use memory::{MemoryHistoryStore, MemoryResultStore, MemoryUploadStore};

#[async_trait]
pub trait UploadStore: Send + Sync {
    async fn put(&self, record: UploadRecord, bytes: &[u8]) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<UploadRecord>>;

    /// Replace an existing record. Errors if the id is unknown.
    async fn update(&self, record: &UploadRecord) -> Result<()>;

    async fn image_bytes(&self, id: Uuid) -> Result<Option<Vec<u8>>>;

    /// All records, newest upload first.
    async fn list(&self) -> Result<Vec<UploadRecord>>;
}

#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn save(&self, result: &AnalysisResult) -> Result<()>;

    /// The most recent result for an image.
    async fn latest(&self, image_id: Uuid) -> Result<Option<AnalysisResult>>;
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append(&self, entry: &HistoryEntry) -> Result<()>;

    /// Entries with this content hash, oldest first.
    async fn by_hash(&self, image_hash: &str) -> Result<Vec<HistoryEntry>>;

    /// Entries recorded for this image id, oldest first.
    async fn by_image(&self, image_id: Uuid) -> Result<Vec<HistoryEntry>>;
}

/// File name an upload is stored under: `<id>.<ext>`.
pub fn stored_file_name(record: &UploadRecord) -> String {
    let ext = match record.content_type.as_str() {
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => "jpg",
    };
    format!("{}.{ext}", record.id)
}

// ---------------------------------------------------------------------------
// Per-key write serialization
// ---------------------------------------------------------------------------

type LockMap<K> = Arc<Mutex<HashMap<K, Arc<tokio::sync::Mutex<()>>>>>;

/// One async mutex per key. Holding the guard makes the caller the only
/// writer for that key; other keys proceed independently. Entries are
/// dropped once no guard or waiter refers to them.
pub struct KeyedLocks<K> {
    locks: LockMap<K>,
}

/// Upload and result writes, keyed by image id.
pub type ImageLocks = KeyedLocks<Uuid>;

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: K) -> KeyedGuard<K> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(locks.entry(key.clone()).or_default())
        };
        let guard = Arc::clone(&lock).lock_owned().await;
        KeyedGuard {
            key,
            lock,
            guard: Some(guard),
            locks: Arc::clone(&self.locks),
        }
    }

    /// Keys currently locked or waited on.
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct KeyedGuard<K: Eq + Hash> {
    key: K,
    lock: Arc<tokio::sync::Mutex<()>>,
    guard: Option<tokio::sync::OwnedMutexGuard<()>>,
    locks: LockMap<K>,
}

impl<K: Eq + Hash> Drop for KeyedGuard<K> {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // The map and this guard are the only holders: nobody is waiting.
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.key);
        }
    }
}
