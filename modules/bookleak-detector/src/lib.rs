pub mod batch;
pub mod detector;
pub mod domains;
pub mod fetcher;
pub mod history;
pub mod judge;
pub mod orchestrator;
pub mod preprocess;
pub mod search;
pub mod store;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use ai_client::{Claude, Gemini, Oracle};
use apify_client::ApifyClient;
use bookleak_common::{Config, OracleProvider};
use serpapi_client::SerpApiClient;
use vision_client::VisionClient;

pub use batch::{BatchCoordinator, BatchStatus, ItemStatus};
pub use detector::{Detector, ImageAnalysis, ResultsView};
pub use domains::{DomainClassifier, DomainTable};
pub use orchestrator::UrlAnalyzer;

const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";
const DEFAULT_CLAUDE_MODEL: &str = "claude-3-5-haiku-latest";

/// Build the oracle selected by config, if its key is present.
pub fn build_oracle(config: &Config) -> Option<Arc<dyn Oracle>> {
    let Some(key) = config.oracle_api_key() else {
        warn!(provider = ?config.oracle_provider, "Oracle key not set, content will not be judged");
        return None;
    };
    let oracle: Arc<dyn Oracle> = match config.oracle_provider {
        OracleProvider::Gemini => Arc::new(
            Gemini::new(key, config.oracle_model.as_deref().unwrap_or(DEFAULT_GEMINI_MODEL))
                .with_timeout(config.backend_timeout),
        ),
        OracleProvider::Claude => Arc::new(
            Claude::new(key, config.oracle_model.as_deref().unwrap_or(DEFAULT_CLAUDE_MODEL))
                .with_timeout(config.backend_timeout),
        ),
    };
    Some(oracle)
}

/// Wire the URL cascade from config: domain table, page fetcher, platform
/// extractor and judge.
pub fn build_analyzer(config: &Config, table: DomainTable) -> UrlAnalyzer {
    let classifier = DomainClassifier::new(table);
    let pages = fetcher::PageClient::new(config.fetch_timeout);
    let apify = config.apify_api_key.clone().map(ApifyClient::new);
    let judge = match build_oracle(config) {
        Some(oracle) => judge::OracleJudge::new(oracle),
        None => judge::OracleJudge::unconfigured(),
    };

    let platforms = fetcher::SocialPlatformExtractor::new(apify, pages.clone())
        .with_api_timeout(config.backend_timeout);

    UrlAnalyzer::new(
        classifier.clone(),
        Arc::new(fetcher::HttpContentFetcher::new(pages, classifier)),
        Arc::new(platforms),
        Arc::new(judge),
    )
    .with_platform_timeout(config.backend_timeout + config.fetch_timeout)
}

pub fn build_aggregator(config: &Config) -> search::Aggregator {
    let tuning = search::SearchTuning {
        target_count: config.target_candidates,
        ..search::SearchTuning::default()
    };
    let vision = config
        .google_vision_api_key
        .clone()
        .map(|key| VisionClient::new(key, config.backend_timeout));
    let lens = config
        .serpapi_api_key
        .clone()
        .map(|key| SerpApiClient::new(key, config.backend_timeout));

    let backends: Vec<Arc<dyn search::SearchBackend>> = vec![
        Arc::new(search::VisionBackend::new(vision, tuning.max_backend_results)),
        Arc::new(search::LensBackend::new(lens)),
    ];
    search::Aggregator::new(backends, tuning, config.backend_timeout)
}

/// Load the domain table from the configured file, or the built-in one.
pub fn load_domain_table(config: &Config) -> Result<DomainTable> {
    match &config.domains_file {
        Some(path) => {
            let table = DomainTable::load(path)?;
            info!(path = %path.display(), version = table.version, "Loaded domain table");
            Ok(table)
        }
        None => Ok(DomainTable::builtin()),
    }
}

/// The full detector over JSON file stores in `config.data_dir`.
pub async fn build_detector(config: &Config) -> Result<Detector> {
    let table = load_domain_table(config)?;
    let data_dir = &config.data_dir;
    let uploads = store::JsonUploadStore::open(data_dir)
        .await
        .context("Failed to open upload store")?;
    let results = store::JsonResultStore::open(data_dir)
        .await
        .context("Failed to open result store")?;
    let history = store::JsonHistoryStore::open(data_dir)
        .await
        .context("Failed to open history store")?;

    Ok(Detector::new(
        Arc::new(uploads),
        Arc::new(results),
        Arc::new(history),
        build_aggregator(config),
        build_analyzer(config, table),
    )
    .with_max_urls(config.max_urls_per_image)
    .with_public_base_url(config.public_base_url.clone()))
}
