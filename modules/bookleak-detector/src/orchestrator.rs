// Per-URL decision cascade.
//
// Every URL takes exactly one terminal path:
//   trusted host          -> safe, nothing fetched, nothing judged
//   social platform host  -> platform extraction -> judge, or unknown
//   anything else         -> page scrape -> judge, or unknown
//
// Nothing in here returns an error. Failures below this point have already
// been folded into verdicts.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use bookleak_common::{AnalysisType, Confidence, Judgment, UrlCandidate, UrlVerdict};

use crate::domains::{DomainCategory, DomainClassifier};
use crate::fetcher::{ContentFetcher, PlatformContent, PlatformExtractor};
use crate::judge::{truncate_reason, ContentJudge, JudgeContext, JudgeVerdict};

pub const REASON_TRUSTED: &str = "Trusted domain (official store, publisher or news site)";
pub const REASON_CONTENT_UNAVAILABLE: &str = "Content unavailable: insufficient information to judge";

/// Deadline for the whole platform extraction chain of one URL.
const DEFAULT_PLATFORM_TIMEOUT: Duration = Duration::from_secs(120);

pub struct UrlAnalyzer {
    classifier: DomainClassifier,
    fetcher: Arc<dyn ContentFetcher>,
    platforms: Arc<dyn PlatformExtractor>,
    judge: Arc<dyn ContentJudge>,
    platform_timeout: Duration,
}

impl UrlAnalyzer {
    pub fn new(
        classifier: DomainClassifier,
        fetcher: Arc<dyn ContentFetcher>,
        platforms: Arc<dyn PlatformExtractor>,
        judge: Arc<dyn ContentJudge>,
    ) -> Self {
        Self {
            classifier,
            fetcher,
            platforms,
            judge,
            platform_timeout: DEFAULT_PLATFORM_TIMEOUT,
        }
    }

    pub fn with_platform_timeout(mut self, timeout: Duration) -> Self {
        self.platform_timeout = timeout;
        self
    }

    pub fn classifier(&self) -> &DomainClassifier {
        &self.classifier
    }

    /// Classify one search candidate.
    pub async fn analyze(&self, candidate: &UrlCandidate) -> UrlVerdict {
        let mut verdict = self.check_url(&candidate.url).await;
        verdict.search_method = Some(candidate.search_method);
        if verdict.analysis_type != AnalysisType::TrustedDomain {
            verdict.confidence = candidate.confidence;
        }
        verdict
    }

    /// Run the cascade on a bare URL, outside any image search.
    pub async fn check_url(&self, url: &str) -> UrlVerdict {
        let class = self.classifier.classify(url);

        if class.is_trusted {
            info!(url, "Trusted domain, skipping fetch and judge");
            return UrlVerdict {
                url: url.to_string(),
                judgment: Judgment::Safe,
                reason: REASON_TRUSTED.to_string(),
                confidence: Confidence::High,
                analysis_type: AnalysisType::TrustedDomain,
                search_method: None,
                platform: None,
            };
        }

        if let Some(platform) = self.classifier.platform(url) {
            let content = match tokio::time::timeout(
                self.platform_timeout,
                self.platforms.extract(url, platform),
            )
            .await
            {
                Ok(content) => content,
                Err(_) => {
                    warn!(url, %platform, timeout_secs = self.platform_timeout.as_secs(), "Platform extraction timed out");
                    PlatformContent::unavailable(platform)
                }
            };
            let verdict = match &content.text {
                Some(text) => {
                    let context = JudgeContext {
                        url: url.to_string(),
                        category: DomainCategory::SocialMedia,
                        platform: Some(platform),
                    };
                    self.judge.judge(text, &context).await
                }
                None => JudgeVerdict::new(
                    Judgment::Unknown,
                    format!("{platform} content could not be retrieved; origin unknown"),
                ),
            };
            return UrlVerdict {
                url: url.to_string(),
                judgment: verdict.judgment,
                reason: truncate_reason(&verdict.reason),
                confidence: Confidence::Medium,
                analysis_type: AnalysisType::PlatformApi,
                search_method: None,
                platform: Some(content.metadata),
            };
        }

        let verdict = match self.fetcher.fetch(url).await {
            Some(text) => {
                let context = JudgeContext {
                    url: url.to_string(),
                    category: class.category,
                    platform: None,
                };
                self.judge.judge(&text, &context).await
            }
            None => JudgeVerdict::new(Judgment::Unknown, REASON_CONTENT_UNAVAILABLE),
        };

        UrlVerdict {
            url: url.to_string(),
            judgment: verdict.judgment,
            reason: truncate_reason(&verdict.reason),
            confidence: Confidence::Medium,
            analysis_type: AnalysisType::ScrapeAndJudge,
            search_method: None,
            platform: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use bookleak_common::{PlatformSource, SearchMethod, SearchSource};

    use super::*;
    use crate::testing::{MockFetcher, MockJudge, MockPlatform};

    fn analyzer(
        fetcher: MockFetcher,
        platforms: MockPlatform,
        judge: MockJudge,
    ) -> (UrlAnalyzer, Arc<MockFetcher>, Arc<MockPlatform>, Arc<MockJudge>) {
        let fetcher = Arc::new(fetcher);
        let platforms = Arc::new(platforms);
        let judge = Arc::new(judge);
        let analyzer = UrlAnalyzer::new(
            DomainClassifier::default(),
            fetcher.clone(),
            platforms.clone(),
            judge.clone(),
        );
        (analyzer, fetcher, platforms, judge)
    }

    #[tokio::test]
    async fn trusted_domain_short_circuits() {
        let (analyzer, fetcher, platforms, judge) =
            analyzer(MockFetcher::new(), MockPlatform::new(), MockJudge::new());
        let v = analyzer.check_url("https://www.kodansha.co.jp/comic/123").await;
        assert_eq!(v.judgment, Judgment::Safe);
        assert_eq!(v.analysis_type, AnalysisType::TrustedDomain);
        assert_eq!(fetcher.calls(), 0);
        assert_eq!(platforms.calls(), 0);
        assert_eq!(judge.calls(), 0);
    }

    #[tokio::test]
    async fn generic_page_is_scraped_and_judged() {
        let url = "https://raw-manga.example/vol3";
        let (analyzer, fetcher, _, judge) = analyzer(
            MockFetcher::new().on_page(url, "Title: Vol 3 raw\n\nBody: read free"),
            MockPlatform::new(),
            MockJudge::new().on_content("read free", Judgment::Danger, "free full chapters"),
        );
        let v = analyzer.check_url(url).await;
        assert_eq!(v.judgment, Judgment::Danger);
        assert_eq!(v.reason, "free full chapters");
        assert_eq!(v.analysis_type, AnalysisType::ScrapeAndJudge);
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(judge.calls(), 1);
        assert_eq!(judge.last_category(), Some(DomainCategory::Other));
    }

    #[tokio::test]
    async fn unreadable_page_is_unknown_without_judging() {
        let (analyzer, fetcher, _, judge) =
            analyzer(MockFetcher::new(), MockPlatform::new(), MockJudge::new());
        let v = analyzer.check_url("https://mega.nz/file/abc").await;
        assert_eq!(v.judgment, Judgment::Unknown);
        assert_eq!(v.reason, REASON_CONTENT_UNAVAILABLE);
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(judge.calls(), 0);
    }

    #[tokio::test]
    async fn platform_content_is_judged_with_platform_context() {
        let url = "https://www.instagram.com/p/abc/";
        let (analyzer, fetcher, platforms, judge) = analyzer(
            MockFetcher::new(),
            MockPlatform::new().on_post(url, "Platform: instagram\nPost: my new shelf"),
            MockJudge::new().with_default(Judgment::Safe, "reader photo"),
        );
        let v = analyzer.check_url(url).await;
        assert_eq!(v.judgment, Judgment::Safe);
        assert_eq!(v.analysis_type, AnalysisType::PlatformApi);
        assert_eq!(v.platform.as_ref().unwrap().source, PlatformSource::Api);
        assert_eq!(fetcher.calls(), 0);
        assert_eq!(platforms.calls(), 1);
        assert_eq!(judge.last_category(), Some(DomainCategory::SocialMedia));
    }

    #[tokio::test]
    async fn unresolvable_platform_names_the_platform() {
        let (analyzer, _, _, judge) =
            analyzer(MockFetcher::new(), MockPlatform::new(), MockJudge::new());
        let v = analyzer.check_url("https://www.threads.net/@u/post/1").await;
        assert_eq!(v.judgment, Judgment::Unknown);
        assert!(v.reason.starts_with("threads content could not be retrieved"));
        assert_eq!(v.platform.unwrap().source, PlatformSource::Unavailable);
        assert_eq!(judge.calls(), 0);
    }

    #[tokio::test]
    async fn slow_platform_extraction_times_out_to_unknown() {
        let url = "https://www.instagram.com/p/slow/";
        let (analyzer, _, platforms, judge) = analyzer(
            MockFetcher::new(),
            MockPlatform::new()
                .on_post(url, "Platform: instagram\nPost: chapter 40 scans")
                .delayed(Duration::from_secs(30)),
            MockJudge::new().with_default(Judgment::Danger, "scans"),
        );
        let analyzer = analyzer.with_platform_timeout(Duration::from_millis(50));

        let started = std::time::Instant::now();
        let v = analyzer.check_url(url).await;
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(v.judgment, Judgment::Unknown);
        assert!(v.reason.starts_with("instagram content could not be retrieved"));
        assert_eq!(v.platform.unwrap().source, PlatformSource::Unavailable);
        assert_eq!(platforms.calls(), 1);
        assert_eq!(judge.calls(), 0);
    }

    #[tokio::test]
    async fn candidate_metadata_carries_into_verdict() {
        let url = "https://blog.example/review";
        let (analyzer, _, _, _) = analyzer(
            MockFetcher::new().on_page(url, "Title: review"),
            MockPlatform::new(),
            MockJudge::new().with_default(Judgment::Safe, "book review"),
        );
        let candidate = UrlCandidate {
            url: url.into(),
            search_method: SearchMethod::Partial,
            source: SearchSource::Vision,
            score: 0.7,
            confidence: Confidence::Low,
            title: None,
        };
        let v = analyzer.analyze(&candidate).await;
        assert_eq!(v.search_method, Some(SearchMethod::Partial));
        assert_eq!(v.confidence, Confidence::Low);
    }
}
