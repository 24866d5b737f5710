//! Per-image verdict history and run-to-run diffs.
//!
//! Runs are matched by content hash, not upload id, so re-uploading the same
//! cover compares against the earlier upload's verdicts.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use bookleak_common::{
    DiffReport, HistoryDiff, HistoryEntry, Judgment, JudgmentChange, UrlVerdict, VerdictRef,
};

use crate::store::{HistoryStore, KeyedLocks};

pub struct HistoryEngine {
    store: Arc<dyn HistoryStore>,
    /// Read-previous-then-append is one step per content hash.
    locks: KeyedLocks<String>,
}

impl HistoryEngine {
    pub fn new(store: Arc<dyn HistoryStore>) -> Self {
        Self {
            store,
            locks: KeyedLocks::new(),
        }
    }

    /// Append this run and diff it against the most recent earlier run of the
    /// same image content.
    pub async fn record_and_diff(
        &self,
        image_id: Uuid,
        image_hash: &str,
        verdicts: &[UrlVerdict],
    ) -> Result<DiffReport> {
        let _guard = self.locks.lock(image_hash.to_string()).await;
        let previous = self
            .store
            .by_hash(image_hash)
            .await?
            .into_iter()
            .max_by_key(|e| e.created_at);

        let entry = HistoryEntry {
            history_id: Uuid::new_v4(),
            image_id,
            image_hash: image_hash.to_string(),
            created_at: Utc::now(),
            verdicts: verdicts.to_vec(),
        };
        self.store.append(&entry).await?;

        let Some(previous) = previous else {
            info!(%image_id, "No prior history for this image");
            return Ok(DiffReport::NoPriorHistory);
        };

        let diff = diff_verdicts(&previous, verdicts);
        info!(
            %image_id,
            new = diff.new.len(),
            disappeared = diff.disappeared.len(),
            changed = diff.changed.len(),
            "History diff computed"
        );
        Ok(DiffReport::Compared(diff))
    }

    /// Every run recorded for an image id, oldest first.
    pub async fn entries_for(&self, image_id: Uuid) -> Result<Vec<HistoryEntry>> {
        let mut entries = self.store.by_image(image_id).await?;
        entries.sort_by_key(|e| e.created_at);
        Ok(entries)
    }

    /// Diff between the last two runs for an image's content, if it has been
    /// analysed at least twice.
    pub async fn latest_diff(&self, image_hash: &str) -> Result<DiffReport> {
        let mut entries = self.store.by_hash(image_hash).await?;
        entries.sort_by_key(|e| e.created_at);
        match entries.as_slice() {
            [.., previous, current] => Ok(DiffReport::Compared(diff_verdicts(
                previous,
                &current.verdicts,
            ))),
            _ => Ok(DiffReport::NoPriorHistory),
        }
    }
}

/// Compare a run against a previous entry, keyed by URL. The first verdict
/// for a URL wins if a run lists it twice.
pub fn diff_verdicts(previous: &HistoryEntry, current: &[UrlVerdict]) -> HistoryDiff {
    let before = judgments_by_url(&previous.verdicts);
    let after = judgments_by_url(current);

    let mut new = Vec::new();
    let mut changed = Vec::new();
    for (url, judgment) in ordered(current, &after) {
        match before.get(url) {
            None => new.push(VerdictRef {
                url: url.to_string(),
                judgment,
            }),
            Some(&prev) if prev != judgment => changed.push(JudgmentChange {
                url: url.to_string(),
                previous: prev,
                current: judgment,
            }),
            Some(_) => {}
        }
    }

    let disappeared: Vec<VerdictRef> = ordered(&previous.verdicts, &before)
        .filter(|(url, _)| !after.contains_key(url))
        .map(|(url, judgment)| VerdictRef {
            url: url.to_string(),
            judgment,
        })
        .collect();

    let has_changes = !new.is_empty() || !disappeared.is_empty() || !changed.is_empty();
    HistoryDiff {
        previous_history_id: previous.history_id,
        previous_created_at: previous.created_at,
        new,
        disappeared,
        changed,
        has_changes,
    }
}

fn judgments_by_url(verdicts: &[UrlVerdict]) -> HashMap<&str, Judgment> {
    let mut map = HashMap::new();
    for v in verdicts {
        map.entry(v.url.as_str()).or_insert(v.judgment);
    }
    map
}

/// Unique URLs in list order, with their winning judgment.
fn ordered<'a>(
    verdicts: &'a [UrlVerdict],
    judgments: &'a HashMap<&'a str, Judgment>,
) -> impl Iterator<Item = (&'a str, Judgment)> + 'a {
    let mut seen = std::collections::HashSet::new();
    verdicts
        .iter()
        .map(|v| v.url.as_str())
        .filter(move |url| seen.insert(*url))
        .map(move |url| (url, judgments[url]))
}
