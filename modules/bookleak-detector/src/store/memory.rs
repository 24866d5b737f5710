// In-memory stores. Thread-safe via interior Mutex; nothing survives the
// process.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;
use uuid::Uuid;

use bookleak_common::{AnalysisResult, HistoryEntry, UploadRecord};

use super::{HistoryStore, ResultStore, UploadStore};

// ---------------------------------------------------------------------------
// Uploads
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryUploadStore {
    records: Mutex<HashMap<Uuid, (UploadRecord, Vec<u8>)>>,
}

impl MemoryUploadStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UploadStore for MemoryUploadStore {
    async fn put(&self, record: UploadRecord, bytes: &[u8]) -> Result<()> {
        self.records
            .lock().unwrap_or_else(|e| e.into_inner())
            .insert(record.id, (record, bytes.to_vec()));
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<UploadRecord>> {
        Ok(self.records.lock().unwrap_or_else(|e| e.into_inner()).get(&id).map(|(r, _)| r.clone()))
    }

    async fn update(&self, record: &UploadRecord) -> Result<()> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        match records.get_mut(&record.id) {
            Some((existing, _)) => {
                *existing = record.clone();
                Ok(())
            }
            None => bail!("upload {} not found", record.id),
        }
    }

    async fn image_bytes(&self, id: Uuid) -> Result<Option<Vec<u8>>> {
        Ok(self.records.lock().unwrap_or_else(|e| e.into_inner()).get(&id).map(|(_, b)| b.clone()))
    }

    async fn list(&self) -> Result<Vec<UploadRecord>> {
        let mut records: Vec<UploadRecord> = self
            .records
            .lock().unwrap_or_else(|e| e.into_inner())
            .values()
            .map(|(r, _)| r.clone())
            .collect();
        records.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(records)
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryResultStore {
    results: Mutex<HashMap<Uuid, Vec<AnalysisResult>>>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every pass stored for an image, oldest first.
    pub fn all_for(&self, image_id: Uuid) -> Vec<AnalysisResult> {
        self.results
            .lock().unwrap_or_else(|e| e.into_inner())
            .get(&image_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn save(&self, result: &AnalysisResult) -> Result<()> {
        self.results
            .lock().unwrap_or_else(|e| e.into_inner())
            .entry(result.image_id)
            .or_default()
            .push(result.clone());
        Ok(())
    }

    async fn latest(&self, image_id: Uuid) -> Result<Option<AnalysisResult>> {
        Ok(self
            .results
            .lock().unwrap_or_else(|e| e.into_inner())
            .get(&image_id)
            .and_then(|passes| passes.last().cloned()))
    }
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryHistoryStore {
    entries: Mutex<Vec<HistoryEntry>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn append(&self, entry: &HistoryEntry) -> Result<()> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).push(entry.clone());
        Ok(())
    }

    async fn by_hash(&self, image_hash: &str) -> Result<Vec<HistoryEntry>> {
        Ok(self
            .entries
            .lock().unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|e| e.image_hash == image_hash)
            .cloned()
            .collect())
    }

    async fn by_image(&self, image_id: Uuid) -> Result<Vec<HistoryEntry>> {
        Ok(self
            .entries
            .lock().unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|e| e.image_id == image_id)
            .cloned()
            .collect())
    }
}
