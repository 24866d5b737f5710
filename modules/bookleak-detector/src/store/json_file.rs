// JSON file stores under the data directory:
//
//   <data_dir>/uploads.json      upload records keyed by id
//   <data_dir>/uploads/<file>    original image bytes
//   <data_dir>/results.json      every analysis pass, per image
//   <data_dir>/history.json      append-only history entries
//
// Each store keeps its document in memory behind an async mutex and rewrites
// the whole file on every mutation (temp file + rename). The in-memory copy
// only changes once the file write has succeeded.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use bookleak_common::{AnalysisResult, HistoryEntry, UploadRecord};

use super::{stored_file_name, HistoryStore, ResultStore, UploadStore};

pub const UPLOADS_FILE: &str = "uploads.json";
pub const RESULTS_FILE: &str = "results.json";
pub const HISTORY_FILE: &str = "history.json";
pub const UPLOADS_DIR: &str = "uploads";

/// A serde document mirrored to one file.
struct JsonDocument<T> {
    path: PathBuf,
    state: Mutex<T>,
}

impl<T> JsonDocument<T>
where
    T: Serialize + DeserializeOwned + Default + Clone + Send,
{
    async fn open(path: PathBuf) -> Result<Self> {
        let state = match tokio::fs::read(&path).await {
            Ok(raw) => serde_json::from_slice(&raw)
                .with_context(|| format!("Corrupt store file {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => T::default(),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        };
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Apply `change` to a copy, persist the copy, then swap it in.
    async fn mutate<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut T) -> Result<()> + Send,
    {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        change(&mut next)?;
        let encoded = serde_json::to_vec_pretty(&next)?;
        write_atomic(&self.path, &encoded).await?;
        *state = next;
        Ok(())
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let temp_path = path.with_extension("tmp");
    tokio::fs::write(&temp_path, bytes)
        .await
        .with_context(|| format!("Failed to write {}", temp_path.display()))?;
    tokio::fs::rename(&temp_path, path)
        .await
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Uploads
// ---------------------------------------------------------------------------

pub struct JsonUploadStore {
    doc: JsonDocument<BTreeMap<Uuid, UploadRecord>>,
    image_dir: PathBuf,
}

impl JsonUploadStore {
    pub async fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        Ok(Self {
            doc: JsonDocument::open(data_dir.join(UPLOADS_FILE)).await?,
            image_dir: data_dir.join(UPLOADS_DIR),
        })
    }

    pub fn image_path(&self, record: &UploadRecord) -> PathBuf {
        self.image_dir.join(stored_file_name(record))
    }
}

#[async_trait]
impl UploadStore for JsonUploadStore {
    async fn put(&self, record: UploadRecord, bytes: &[u8]) -> Result<()> {
        write_atomic(&self.image_path(&record), bytes).await?;
        self.doc
            .mutate(|records| {
                records.insert(record.id, record);
                Ok(())
            })
            .await
    }

    async fn get(&self, id: Uuid) -> Result<Option<UploadRecord>> {
        Ok(self.doc.state.lock().await.get(&id).cloned())
    }

    async fn update(&self, record: &UploadRecord) -> Result<()> {
        self.doc
            .mutate(|records| {
                let Some(existing) = records.get_mut(&record.id) else {
                    bail!("upload {} not found", record.id);
                };
                *existing = record.clone();
                Ok(())
            })
            .await
    }

    async fn image_bytes(&self, id: Uuid) -> Result<Option<Vec<u8>>> {
        let Some(record) = self.get(id).await? else {
            return Ok(None);
        };
        let path = self.image_path(&record);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    async fn list(&self) -> Result<Vec<UploadRecord>> {
        let mut records: Vec<UploadRecord> =
            self.doc.state.lock().await.values().cloned().collect();
        records.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(records)
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

pub struct JsonResultStore {
    doc: JsonDocument<BTreeMap<Uuid, Vec<AnalysisResult>>>,
}

impl JsonResultStore {
    pub async fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            doc: JsonDocument::open(data_dir.as_ref().join(RESULTS_FILE)).await?,
        })
    }
}

#[async_trait]
impl ResultStore for JsonResultStore {
    async fn save(&self, result: &AnalysisResult) -> Result<()> {
        self.doc
            .mutate(|results| {
                results.entry(result.image_id).or_default().push(result.clone());
                Ok(())
            })
            .await
    }

    async fn latest(&self, image_id: Uuid) -> Result<Option<AnalysisResult>> {
        Ok(self
            .doc
            .state
            .lock()
            .await
            .get(&image_id)
            .and_then(|passes| passes.last().cloned()))
    }
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

pub struct JsonHistoryStore {
    doc: JsonDocument<Vec<HistoryEntry>>,
}

impl JsonHistoryStore {
    pub async fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            doc: JsonDocument::open(data_dir.as_ref().join(HISTORY_FILE)).await?,
        })
    }
}

#[async_trait]
impl HistoryStore for JsonHistoryStore {
    async fn append(&self, entry: &HistoryEntry) -> Result<()> {
        self.doc
            .mutate(|entries| {
                entries.push(entry.clone());
                Ok(())
            })
            .await
    }

    async fn by_hash(&self, image_hash: &str) -> Result<Vec<HistoryEntry>> {
        Ok(self
            .doc
            .state
            .lock()
            .await
            .iter()
            .filter(|e| e.image_hash == image_hash)
            .cloned()
            .collect())
    }

    async fn by_image(&self, image_id: Uuid) -> Result<Vec<HistoryEntry>> {
        Ok(self
            .doc
            .state
            .lock()
            .await
            .iter()
            .filter(|e| e.image_id == image_id)
            .cloned()
            .collect())
    }
}
