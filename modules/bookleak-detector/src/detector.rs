// One full analysis pass over an uploaded image.
//
//   load upload -> prepare image -> search -> cap candidates
//     -> classify each URL in rank order -> save result -> record history
//
// Only a missing upload, an undecodable image or a store failure surfaces as
// an error. Everything past search is folded into verdicts.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use bookleak_common::{
    AnalysisOutcome, AnalysisResult, AnalysisStatus, BookLeakError, DiffReport, HistoryEntry,
    ImageSubmission, UploadRecord, UrlVerdict,
};

use crate::history::HistoryEngine;
use crate::orchestrator::UrlAnalyzer;
use crate::preprocess::{content_type, prepare_image, validate_upload};
use crate::search::{Aggregator, SearchImage, SearchReport};
use crate::store::{stored_file_name, HistoryStore, ImageLocks, ResultStore, UploadStore};

/// Result of `Detector::analyze_image`.
#[derive(Debug, Clone, Serialize)]
pub struct ImageAnalysis {
    pub result: AnalysisResult,
    pub diff: DiffReport,
}

/// What a results lookup found for an upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ResultsView {
    /// No pass has finished for this image yet.
    NotAnalysed { status: AnalysisStatus },
    /// The latest pass finished without any verdicts.
    CompletedNoResults { result: AnalysisResult },
    Completed { result: AnalysisResult },
}

pub struct Detector {
    uploads: Arc<dyn UploadStore>,
    results: Arc<dyn ResultStore>,
    history: HistoryEngine,
    aggregator: Aggregator,
    analyzer: UrlAnalyzer,
    locks: ImageLocks,
    max_urls_per_image: usize,
    public_base_url: Option<String>,
}

impl Detector {
    pub fn new(
        uploads: Arc<dyn UploadStore>,
        results: Arc<dyn ResultStore>,
        history: Arc<dyn HistoryStore>,
        aggregator: Aggregator,
        analyzer: UrlAnalyzer,
    ) -> Self {
        Self {
            uploads,
            results,
            history: HistoryEngine::new(history),
            aggregator,
            analyzer,
            locks: ImageLocks::new(),
            max_urls_per_image: 10,
            public_base_url: None,
        }
    }

    pub fn with_max_urls(mut self, max: usize) -> Self {
        self.max_urls_per_image = max;
        self
    }

    /// Base URL under which `uploads/<file>` is publicly served.
    pub fn with_public_base_url(mut self, base: Option<String>) -> Self {
        self.public_base_url = base.map(|b| b.trim_end_matches('/').to_string());
        self
    }

    pub fn analyzer(&self) -> &UrlAnalyzer {
        &self.analyzer
    }

    pub fn history(&self) -> &HistoryEngine {
        &self.history
    }

    /// Validate and store a new upload.
    pub async fn upload(
        &self,
        bytes: Vec<u8>,
        original_filename: &str,
    ) -> Result<UploadRecord, BookLeakError> {
        let format = validate_upload(&bytes)?;
        let mut record = UploadRecord::new(original_filename, content_type(format), bytes.len());
        let submission = ImageSubmission::new(record.id, bytes, record.uploaded_at);
        record.content_hash = Some(submission.content_hash().to_string());

        self.uploads
            .put(record.clone(), &submission.bytes)
            .await
            .map_err(store_error)?;
        info!(image_id = %record.id, file = original_filename, size = record.file_size, "Upload stored");
        Ok(record)
    }

    pub async fn uploads(&self) -> Result<Vec<UploadRecord>, BookLeakError> {
        self.uploads.list().await.map_err(store_error)
    }

    /// Run search and classification for one uploaded image.
    pub async fn analyze_image(&self, image_id: Uuid) -> Result<ImageAnalysis, BookLeakError> {
        let _guard = self.locks.lock(image_id).await;

        let mut record = self
            .uploads
            .get(image_id)
            .await
            .map_err(store_error)?
            .ok_or_else(|| BookLeakError::NotFound(format!("upload {image_id}")))?;
        let bytes = self
            .uploads
            .image_bytes(image_id)
            .await
            .map_err(store_error)?
            .ok_or_else(|| BookLeakError::NotFound(format!("image file for {image_id}")))?;

        let submission = ImageSubmission::new(image_id, bytes, record.uploaded_at);
        let submission = match record.content_hash.clone() {
            Some(hash) => submission.with_hash(hash),
            None => submission,
        };

        record.analysis_status = AnalysisStatus::Processing;
        record.analysis_error = None;
        self.uploads.update(&record).await.map_err(store_error)?;
        info!(%image_id, "Analysis started");

        let prepared = match prepare_image(&submission.bytes) {
            Ok(prepared) => prepared,
            Err(e) => {
                error!(%image_id, error = %e, "Image preparation failed");
                self.mark_failed(&mut record, &e).await;
                return Err(e);
            }
        };

        let search_image = SearchImage {
            image_id,
            bytes: prepared.bytes.into(),
            public_url: self
                .public_base_url
                .as_ref()
                .map(|base| format!("{base}/uploads/{}", stored_file_name(&record))),
        };
        let report = self.aggregator.search(&search_image).await;
        let total_found = report.candidates.len();

        let mut verdicts = Vec::new();
        for candidate in report.candidates.iter().take(self.max_urls_per_image) {
            verdicts.push(self.analyzer.analyze(candidate).await);
        }

        let outcome = outcome_for(&report, &verdicts);
        let result = AnalysisResult {
            image_id,
            image_hash: submission.content_hash().to_string(),
            analyzed_at: Utc::now(),
            outcome,
            total_found,
            total_processed: verdicts.len(),
            verdicts,
        };

        if let Err(e) = self.results.save(&result).await {
            let err = store_error(e);
            self.mark_failed(&mut record, &err).await;
            return Err(err);
        }
        let diff = match self
            .history
            .record_and_diff(image_id, &result.image_hash, &result.verdicts)
            .await
        {
            Ok(diff) => diff,
            Err(e) => {
                let err = store_error(e);
                self.mark_failed(&mut record, &err).await;
                return Err(err);
            }
        };

        record.analysis_status = AnalysisStatus::Completed;
        record.analysis_time = Some(result.analyzed_at);
        record.content_hash = Some(result.image_hash.clone());
        record.found_urls_count = result.total_found;
        record.processed_results_count = result.total_processed;
        self.uploads.update(&record).await.map_err(store_error)?;

        info!(
            %image_id,
            outcome = ?result.outcome,
            found = result.total_found,
            processed = result.total_processed,
            "Analysis complete"
        );
        Ok(ImageAnalysis { result, diff })
    }

    pub async fn results(&self, image_id: Uuid) -> Result<ResultsView, BookLeakError> {
        let record = self
            .uploads
            .get(image_id)
            .await
            .map_err(store_error)?
            .ok_or_else(|| BookLeakError::NotFound(format!("upload {image_id}")))?;

        let latest = self.results.latest(image_id).await.map_err(store_error)?;
        Ok(match latest {
            None => ResultsView::NotAnalysed {
                status: record.analysis_status,
            },
            Some(result) if result.verdicts.is_empty() => ResultsView::CompletedNoResults { result },
            Some(result) => ResultsView::Completed { result },
        })
    }

    /// History entries for an upload plus the diff between its content's last
    /// two runs.
    pub async fn image_history(
        &self,
        image_id: Uuid,
    ) -> Result<(Vec<HistoryEntry>, DiffReport), BookLeakError> {
        let record = self
            .uploads
            .get(image_id)
            .await
            .map_err(store_error)?
            .ok_or_else(|| BookLeakError::NotFound(format!("upload {image_id}")))?;
        let entries = self.history.entries_for(image_id).await.map_err(store_error)?;
        let diff = match &record.content_hash {
            Some(hash) => self.history.latest_diff(hash).await.map_err(store_error)?,
            None => DiffReport::NoPriorHistory,
        };
        Ok((entries, diff))
    }

    pub async fn check_url(&self, url: &str) -> UrlVerdict {
        self.analyzer.check_url(url).await
    }

    async fn mark_failed(&self, record: &mut UploadRecord, err: &BookLeakError) {
        record.analysis_status = AnalysisStatus::Failed;
        record.analysis_error = Some(err.to_string());
        record.analysis_time = Some(Utc::now());
        if let Err(e) = self.uploads.update(record).await {
            error!(image_id = %record.id, error = %e, "Failed to record analysis failure");
        }
    }
}

fn outcome_for(report: &SearchReport, verdicts: &[UrlVerdict]) -> AnalysisOutcome {
    if report.provider_not_configured() {
        AnalysisOutcome::ProviderNotConfigured
    } else if report.candidates.is_empty() && report.all_failed() {
        AnalysisOutcome::SearchFailed
    } else if report.candidates.is_empty() {
        AnalysisOutcome::NoCandidates
    } else if verdicts.iter().any(|v| v.judgment.is_conclusive()) {
        AnalysisOutcome::Completed
    } else {
        AnalysisOutcome::AllUnclassified
    }
}

fn store_error(e: anyhow::Error) -> BookLeakError {
    BookLeakError::Store(format!("{e:#}"))
}

#[cfg(test)]
mod tests {
    use bookleak_common::{Judgment, SearchMethod};

    use super::*;
    use crate::domains::DomainClassifier;
    use crate::search::{BackendError, BackendMatch, SearchTuning};
    use crate::store::{MemoryHistoryStore, MemoryResultStore, MemoryUploadStore};
    use crate::testing::{png_bytes, MockBackend, MockFetcher, MockJudge, MockPlatform};

    struct Fixture {
        detector: Detector,
        uploads: Arc<MemoryUploadStore>,
        fetcher: Arc<MockFetcher>,
    }

    fn fixture(backends: Vec<MockBackend>, fetcher: MockFetcher, judge: MockJudge) -> Fixture {
        let uploads = Arc::new(MemoryUploadStore::new());
        let fetcher = Arc::new(fetcher);
        let backends = backends
            .into_iter()
            .map(|b| Arc::new(b) as Arc<dyn crate::search::SearchBackend>)
            .collect();
        let detector = Detector::new(
            uploads.clone(),
            Arc::new(MemoryResultStore::new()),
            Arc::new(MemoryHistoryStore::new()),
            Aggregator::new(backends, SearchTuning::default(), std::time::Duration::from_secs(5)),
            UrlAnalyzer::new(
                DomainClassifier::default(),
                fetcher.clone(),
                Arc::new(MockPlatform::new()),
                Arc::new(judge),
            ),
        );
        Fixture {
            detector,
            uploads,
            fetcher,
        }
    }

    #[tokio::test]
    async fn full_pass_classifies_in_rank_order() {
        let backend = MockBackend::vision()
            .with_match(BackendMatch::PartialImage {
                url: "https://raw.example/ch1".into(),
                score: Some(0.9),
            })
            .with_match(BackendMatch::FullImage {
                url: "https://www.amazon.co.jp/dp/1".into(),
                score: Some(0.95),
            });
        let f = fixture(
            vec![backend],
            MockFetcher::new().on_page("https://raw.example/ch1", "Title: raw scans"),
            MockJudge::new().on_content("raw scans", Judgment::Danger, "pirated chapter"),
        );

        let record = f.detector.upload(png_bytes(400, 600), "cover.png").await.unwrap();
        let analysis = f.detector.analyze_image(record.id).await.unwrap();

        let result = &analysis.result;
        assert_eq!(result.outcome, AnalysisOutcome::Completed);
        assert_eq!(result.verdicts.len(), 2);
        assert_eq!(result.verdicts[0].search_method, Some(SearchMethod::Exact));
        assert_eq!(result.verdicts[0].judgment, Judgment::Safe);
        assert_eq!(result.verdicts[1].judgment, Judgment::Danger);
        assert_eq!(analysis.diff, DiffReport::NoPriorHistory);

        let stored = f.uploads.get(record.id).await.unwrap().unwrap();
        assert_eq!(stored.analysis_status, AnalysisStatus::Completed);
        assert_eq!(stored.found_urls_count, 2);
        assert_eq!(stored.processed_results_count, 2);
        assert_eq!(f.fetcher.calls(), 1);

        assert!(matches!(
            f.detector.results(record.id).await.unwrap(),
            ResultsView::Completed { .. }
        ));
    }

    #[tokio::test]
    async fn candidates_are_capped_per_image() {
        let mut backend = MockBackend::vision();
        for i in 0..5 {
            backend = backend.with_match(BackendMatch::FullImage {
                url: format!("https://site{i}.example/p"),
                score: Some(0.9),
            });
        }
        let mut f = fixture(vec![backend], MockFetcher::new(), MockJudge::new());
        f.detector = f.detector.with_max_urls(3);

        let record = f.detector.upload(png_bytes(400, 400), "c.png").await.unwrap();
        let result = f.detector.analyze_image(record.id).await.unwrap().result;
        assert_eq!(result.total_found, 5);
        assert_eq!(result.total_processed, 3);
        assert_eq!(result.outcome, AnalysisOutcome::AllUnclassified);
    }

    #[tokio::test]
    async fn image_file_matches_do_not_crowd_out_pages() {
        let mut backend = MockBackend::vision();
        for i in 0..10 {
            backend = backend.with_match(BackendMatch::FullImage {
                url: format!("https://img{i}.example/cover.jpg"),
                score: None,
            });
        }
        let backend = backend.with_match(BackendMatch::Page {
            url: "https://raw.example/vol1".into(),
            title: None,
            score: Some(0.8),
            full_matches: 1,
            partial_matches: 0,
        });
        let f = fixture(
            vec![backend],
            MockFetcher::new().on_page("https://raw.example/vol1", "Title: vol 1 raw"),
            MockJudge::new().on_content("vol 1 raw", Judgment::Danger, "raw scans"),
        );

        let record = f.detector.upload(png_bytes(400, 400), "c.png").await.unwrap();
        let result = f.detector.analyze_image(record.id).await.unwrap().result;
        assert_eq!(result.total_found, 11);
        assert_eq!(result.total_processed, 10);
        assert_eq!(result.verdicts[0].url, "https://raw.example/vol1");
        assert_eq!(result.verdicts[0].judgment, Judgment::Danger);
    }

    #[tokio::test]
    async fn outcomes_distinguish_search_failures() {
        let f = fixture(Vec::new(), MockFetcher::new(), MockJudge::new());
        let record = f.detector.upload(png_bytes(400, 400), "c.png").await.unwrap();
        let result = f.detector.analyze_image(record.id).await.unwrap().result;
        assert_eq!(result.outcome, AnalysisOutcome::ProviderNotConfigured);
        assert!(matches!(
            f.detector.results(record.id).await.unwrap(),
            ResultsView::CompletedNoResults { .. }
        ));

        let f = fixture(
            vec![MockBackend::vision().failing(BackendError::Transient("503".into()))],
            MockFetcher::new(),
            MockJudge::new(),
        );
        let record = f.detector.upload(png_bytes(400, 400), "c.png").await.unwrap();
        let result = f.detector.analyze_image(record.id).await.unwrap().result;
        assert_eq!(result.outcome, AnalysisOutcome::SearchFailed);

        let f = fixture(vec![MockBackend::vision()], MockFetcher::new(), MockJudge::new());
        let record = f.detector.upload(png_bytes(400, 400), "c.png").await.unwrap();
        let result = f.detector.analyze_image(record.id).await.unwrap().result;
        assert_eq!(result.outcome, AnalysisOutcome::NoCandidates);
    }

    #[tokio::test]
    async fn undecodable_image_fails_the_request() {
        let f = fixture(vec![MockBackend::vision()], MockFetcher::new(), MockJudge::new());
        let png = png_bytes(400, 400);
        // Valid signature, truncated body.
        let record = f.detector.upload(png[..64].to_vec(), "broken.png").await.unwrap();

        let err = f.detector.analyze_image(record.id).await.unwrap_err();
        assert!(matches!(err, BookLeakError::ImageDecode(_)));

        let stored = f.uploads.get(record.id).await.unwrap().unwrap();
        assert_eq!(stored.analysis_status, AnalysisStatus::Failed);
        assert!(stored.analysis_error.is_some());
        assert!(matches!(
            f.detector.results(record.id).await.unwrap(),
            ResultsView::NotAnalysed {
                status: AnalysisStatus::Failed
            }
        ));
    }

    #[tokio::test]
    async fn unknown_upload_is_not_found() {
        let f = fixture(Vec::new(), MockFetcher::new(), MockJudge::new());
        let err = f.detector.analyze_image(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, BookLeakError::NotFound(_)));
    }

    #[tokio::test]
    async fn lens_gets_public_url_of_the_upload() {
        let backend = MockBackend::lens();
        let seen = backend.seen_public_urls();
        let mut f = fixture(vec![backend], MockFetcher::new(), MockJudge::new());
        f.detector = f
            .detector
            .with_public_base_url(Some("https://detector.example/".into()));

        let record = f.detector.upload(png_bytes(400, 400), "c.png").await.unwrap();
        f.detector.analyze_image(record.id).await.unwrap();
        assert_eq!(
            seen.lock().unwrap().as_slice(),
            &[Some(format!("https://detector.example/uploads/{}.png", record.id))]
        );
    }
}
