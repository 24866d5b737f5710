// Batch analysis jobs.
//
// Each item runs as its own task, at most `concurrency` at a time. The task
// that runs an item owns the only writer for that item's status (a watch
// channel sender); `status` reads through the receivers and never blocks a
// running item. A failing or panicking item ends in `Error` and leaves its
// siblings alone.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, Semaphore};
use tracing::{error, info, warn};
use uuid::Uuid;

use bookleak_common::AnalysisOutcome;

use crate::detector::Detector;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Processing,
    Completed {
        outcome: AnalysisOutcome,
        found: usize,
        processed: usize,
    },
    Error {
        message: String,
    },
}

impl ItemStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemStatus::Completed { .. } | ItemStatus::Error { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchItem {
    pub image_id: Uuid,
    #[serde(flatten)]
    pub status: ItemStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchStatus {
    pub job_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    /// Finished items over total, 0.0 to 1.0. An empty job counts as done.
    pub progress: f32,
    pub finished: bool,
    pub items: Vec<BatchItem>,
}

struct BatchJob {
    created_at: DateTime<Utc>,
    items: Vec<(Uuid, watch::Receiver<ItemStatus>)>,
}

pub struct BatchCoordinator {
    detector: Arc<Detector>,
    permits: Arc<Semaphore>,
    jobs: RwLock<HashMap<Uuid, Arc<BatchJob>>>,
}

impl BatchCoordinator {
    pub fn new(detector: Arc<Detector>, concurrency: usize) -> Self {
        Self {
            detector,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Start analysing every image and return the job id immediately.
    pub fn submit(&self, image_ids: Vec<Uuid>) -> Uuid {
        let job_id = Uuid::new_v4();
        info!(%job_id, count = image_ids.len(), "Batch submitted");

        let mut items = Vec::with_capacity(image_ids.len());
        for image_id in image_ids {
            let (tx, rx) = watch::channel(ItemStatus::Pending);
            items.push((image_id, rx));
            tokio::spawn(run_item(
                job_id,
                image_id,
                tx,
                self.detector.clone(),
                self.permits.clone(),
            ));
        }

        let job = Arc::new(BatchJob {
            created_at: Utc::now(),
            items,
        });
        self.jobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(job_id, job);
        job_id
    }

    /// Snapshot of a job, or None for an unknown id.
    pub fn status(&self, job_id: Uuid) -> Option<BatchStatus> {
        let job = self.job(job_id)?;
        let items: Vec<BatchItem> = job
            .items
            .iter()
            .map(|(image_id, rx)| BatchItem {
                image_id: *image_id,
                status: rx.borrow().clone(),
            })
            .collect();
        Some(summarize(job_id, job.created_at, items))
    }

    /// Wait until every item of the job has finished.
    pub async fn wait(&self, job_id: Uuid) -> Option<BatchStatus> {
        let job = self.job(job_id)?;
        for (image_id, rx) in &job.items {
            let mut rx = rx.clone();
            if rx.wait_for(ItemStatus::is_terminal).await.is_err() {
                warn!(%job_id, %image_id, "Batch item stopped without a final status");
            }
        }
        self.status(job_id)
    }

    fn job(&self, job_id: Uuid) -> Option<Arc<BatchJob>> {
        self.jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&job_id)
            .cloned()
    }
}

async fn run_item(
    job_id: Uuid,
    image_id: Uuid,
    status: watch::Sender<ItemStatus>,
    detector: Arc<Detector>,
    permits: Arc<Semaphore>,
) {
    let _permit = match permits.acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => {
            status.send_replace(ItemStatus::Error {
                message: "batch coordinator shut down".into(),
            });
            return;
        }
    };
    status.send_replace(ItemStatus::Processing);

    // Separate task so a panic inside the pipeline lands here as a JoinError.
    let run = tokio::spawn(async move { detector.analyze_image(image_id).await });
    let final_status = match run.await {
        Ok(Ok(analysis)) => {
            info!(%job_id, %image_id, outcome = ?analysis.result.outcome, "Batch item complete");
            ItemStatus::Completed {
                outcome: analysis.result.outcome,
                found: analysis.result.total_found,
                processed: analysis.result.total_processed,
            }
        }
        Ok(Err(e)) => {
            warn!(%job_id, %image_id, error = %e, "Batch item failed");
            ItemStatus::Error {
                message: e.to_string(),
            }
        }
        Err(e) => {
            error!(%job_id, %image_id, error = %e, "Batch item task aborted");
            ItemStatus::Error {
                message: format!("analysis task aborted: {e}"),
            }
        }
    };
    status.send_replace(final_status);
}

fn summarize(job_id: Uuid, created_at: DateTime<Utc>, items: Vec<BatchItem>) -> BatchStatus {
    let total = items.len();
    let completed = items
        .iter()
        .filter(|i| matches!(i.status, ItemStatus::Completed { .. }))
        .count();
    let failed = items
        .iter()
        .filter(|i| matches!(i.status, ItemStatus::Error { .. }))
        .count();
    let done = completed + failed;
    BatchStatus {
        job_id,
        created_at,
        total,
        completed,
        failed,
        progress: if total == 0 { 1.0 } else { done as f32 / total as f32 },
        finished: done == total,
        items,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::domains::DomainClassifier;
    use crate::orchestrator::UrlAnalyzer;
    use crate::search::{Aggregator, BackendMatch, SearchBackend, SearchTuning};
    use crate::store::{MemoryHistoryStore, MemoryResultStore, MemoryUploadStore};
    use crate::testing::{png_bytes, MockBackend, MockFetcher, MockJudge, MockPlatform};

    fn detector(backend: MockBackend) -> Arc<Detector> {
        let backend: Arc<dyn SearchBackend> = Arc::new(backend);
        Arc::new(Detector::new(
            Arc::new(MemoryUploadStore::new()),
            Arc::new(MemoryResultStore::new()),
            Arc::new(MemoryHistoryStore::new()),
            Aggregator::new(vec![backend], SearchTuning::default(), Duration::from_secs(5)),
            UrlAnalyzer::new(
                DomainClassifier::default(),
                Arc::new(MockFetcher::new()),
                Arc::new(MockPlatform::new()),
                Arc::new(MockJudge::new()),
            ),
        ))
    }

    #[tokio::test]
    async fn failing_item_does_not_affect_siblings() {
        let detector = detector(MockBackend::vision().with_match(BackendMatch::FullImage {
            url: "https://www.amazon.co.jp/dp/1".into(),
            score: None,
        }));
        let first = detector.upload(png_bytes(400, 400), "1.png").await.unwrap();
        let third = detector.upload(png_bytes(500, 400), "3.png").await.unwrap();
        let missing = Uuid::new_v4();

        let batch = BatchCoordinator::new(detector, 2);
        let job_id = batch.submit(vec![first.id, missing, third.id]);
        let status = batch.wait(job_id).await.unwrap();

        assert!(status.finished);
        assert_eq!(status.total, 3);
        assert_eq!(status.completed, 2);
        assert_eq!(status.failed, 1);
        assert_eq!(status.progress, 1.0);
        assert!(matches!(
            status.items[0].status,
            ItemStatus::Completed {
                outcome: AnalysisOutcome::Completed,
                ..
            }
        ));
        assert!(matches!(status.items[1].status, ItemStatus::Error { .. }));
        assert!(matches!(status.items[2].status, ItemStatus::Completed { .. }));
    }

    #[tokio::test]
    async fn panicking_item_is_an_error_and_siblings_finish() {
        let backend = MockBackend::vision().with_match(BackendMatch::FullImage {
            url: "https://www.amazon.co.jp/dp/2".into(),
            score: None,
        });
        let panic_for = backend.panic_for();
        let detector = detector(backend);
        let first = detector.upload(png_bytes(400, 400), "1.png").await.unwrap().id;
        let second = detector.upload(png_bytes(450, 400), "2.png").await.unwrap().id;
        let third = detector.upload(png_bytes(500, 400), "3.png").await.unwrap().id;
        panic_for.lock().unwrap().insert(second);

        let batch = BatchCoordinator::new(detector.clone(), 2);
        let job_id = batch.submit(vec![first, second, third]);
        let status = batch.wait(job_id).await.unwrap();

        assert!(status.finished);
        assert_eq!(status.completed, 2);
        assert_eq!(status.failed, 1);
        match &status.items[1].status {
            ItemStatus::Error { message } => {
                assert!(message.starts_with("analysis task aborted"))
            }
            other => panic!("expected an error, got {other:?}"),
        }
        assert!(matches!(status.items[0].status, ItemStatus::Completed { .. }));
        assert!(matches!(status.items[2].status, ItemStatus::Completed { .. }));

        // The panicked image can be analysed again once the fault is gone.
        panic_for.lock().unwrap().clear();
        assert!(detector.analyze_image(second).await.is_ok());
    }

    #[tokio::test]
    async fn status_is_readable_while_items_run() {
        let detector = detector(MockBackend::vision().delayed(Duration::from_millis(200)));
        let id = detector.upload(png_bytes(400, 400), "slow.png").await.unwrap().id;

        let batch = BatchCoordinator::new(detector, 1);
        let job_id = batch.submit(vec![id]);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let running = batch.status(job_id).unwrap();
        assert!(!running.finished);
        assert_eq!(running.items[0].status, ItemStatus::Processing);

        let done = batch.wait(job_id).await.unwrap();
        assert!(done.finished);
    }

    #[tokio::test]
    async fn concurrency_limit_keeps_extra_items_pending() {
        let detector = detector(MockBackend::vision().delayed(Duration::from_millis(200)));
        let a = detector.upload(png_bytes(400, 400), "a.png").await.unwrap().id;
        let b = detector.upload(png_bytes(400, 400), "b.png").await.unwrap().id;

        let batch = BatchCoordinator::new(detector, 1);
        let job_id = batch.submit(vec![a, b]);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let status = batch.status(job_id).unwrap();
        let pending = status
            .items
            .iter()
            .filter(|i| i.status == ItemStatus::Pending)
            .count();
        assert_eq!(pending, 1);
        assert!(batch.wait(job_id).await.unwrap().finished);
    }

    #[tokio::test]
    async fn unknown_and_empty_jobs() {
        let batch = BatchCoordinator::new(detector(MockBackend::vision()), 3);
        assert!(batch.status(Uuid::new_v4()).is_none());

        let job_id = batch.submit(Vec::new());
        let status = batch.status(job_id).unwrap();
        assert!(status.finished);
        assert_eq!(status.progress, 1.0);
    }
}
