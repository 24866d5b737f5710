use std::path::PathBuf;
use std::time::Duration;

use crate::error::BookLeakError;

/// Which natural-language oracle judges page content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OracleProvider {
    Gemini,
    Claude,
}

impl std::str::FromStr for OracleProvider {
    type Err = BookLeakError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gemini" | "" => Ok(OracleProvider::Gemini),
            "claude" | "anthropic" => Ok(OracleProvider::Claude),
            other => Err(BookLeakError::Config(format!("unknown ORACLE_PROVIDER: {other}"))),
        }
    }
}

/// Application configuration loaded from environment variables.
/// Every credential is optional: a missing key disables that provider
/// instead of failing startup.
#[derive(Debug, Clone)]
pub struct Config {
    // Oracle
    pub oracle_provider: OracleProvider,
    pub oracle_model: Option<String>,
    pub gemini_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,

    // Search backends
    pub google_vision_api_key: Option<String>,
    pub serpapi_api_key: Option<String>,
    /// Base URL under which uploads are publicly reachable (Lens needs an image URL).
    pub public_base_url: Option<String>,

    // Social platforms
    pub apify_api_key: Option<String>,

    // Storage
    pub data_dir: PathBuf,
    pub domains_file: Option<PathBuf>,

    // Pipeline
    pub max_urls_per_image: usize,
    pub target_candidates: usize,
    pub fetch_timeout: Duration,
    pub backend_timeout: Duration,
    pub batch_concurrency: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            oracle_provider: OracleProvider::Gemini,
            oracle_model: None,
            gemini_api_key: None,
            anthropic_api_key: None,
            google_vision_api_key: None,
            serpapi_api_key: None,
            public_base_url: None,
            apify_api_key: None,
            data_dir: PathBuf::from("./data"),
            domains_file: None,
            max_urls_per_image: 10,
            target_candidates: 20,
            fetch_timeout: Duration::from_secs(10),
            backend_timeout: Duration::from_secs(60),
            batch_concurrency: 3,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, BookLeakError> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let config = Self {
            oracle_provider: optional_env("ORACLE_PROVIDER")
                .map(|v| v.parse())
                .transpose()?
                .unwrap_or(defaults.oracle_provider),
            oracle_model: optional_env("ORACLE_MODEL"),
            gemini_api_key: optional_env("GEMINI_API_KEY"),
            anthropic_api_key: optional_env("ANTHROPIC_API_KEY"),
            google_vision_api_key: optional_env("GOOGLE_VISION_API_KEY"),
            serpapi_api_key: optional_env("SERPAPI_API_KEY"),
            public_base_url: optional_env("PUBLIC_BASE_URL"),
            apify_api_key: optional_env("APIFY_API_KEY"),
            data_dir: optional_env("BOOKLEAK_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            domains_file: optional_env("BOOKLEAK_DOMAINS_FILE").map(PathBuf::from),
            max_urls_per_image: parsed_env("MAX_URLS_PER_IMAGE", defaults.max_urls_per_image)?,
            target_candidates: parsed_env("TARGET_CANDIDATES", defaults.target_candidates)?,
            fetch_timeout: Duration::from_secs(parsed_env(
                "FETCH_TIMEOUT_SECS",
                defaults.fetch_timeout.as_secs(),
            )?),
            backend_timeout: Duration::from_secs(parsed_env(
                "BACKEND_TIMEOUT_SECS",
                defaults.backend_timeout.as_secs(),
            )?),
            batch_concurrency: parsed_env("BATCH_CONCURRENCY", defaults.batch_concurrency)?,
        };

        config.log_keys();
        Ok(config)
    }

    /// The key for the selected oracle, if configured.
    pub fn oracle_api_key(&self) -> Option<&str> {
        match self.oracle_provider {
            OracleProvider::Gemini => self.gemini_api_key.as_deref(),
            OracleProvider::Claude => self.anthropic_api_key.as_deref(),
        }
    }

    fn log_keys(&self) {
        fn preview_opt(val: &Option<String>) -> String {
            match val {
                Some(v) if !v.is_empty() => {
                    let n = v.char_indices().nth(5).map(|(i, _)| i).unwrap_or(v.len());
                    format!("{}...({} chars)", &v[..n], v.len())
                }
                _ => "<not set>".to_string(),
            }
        }

        tracing::info!("Config loaded:");
        tracing::info!("  ORACLE_PROVIDER: {:?}", self.oracle_provider);
        tracing::info!("  GEMINI_API_KEY: {}", preview_opt(&self.gemini_api_key));
        tracing::info!("  ANTHROPIC_API_KEY: {}", preview_opt(&self.anthropic_api_key));
        tracing::info!("  GOOGLE_VISION_API_KEY: {}", preview_opt(&self.google_vision_api_key));
        tracing::info!("  SERPAPI_API_KEY: {}", preview_opt(&self.serpapi_api_key));
        tracing::info!("  APIFY_API_KEY: {}", preview_opt(&self.apify_api_key));
        tracing::info!("  PUBLIC_BASE_URL: {}", self.public_base_url.as_deref().unwrap_or("<not set>"));
        tracing::info!("  BOOKLEAK_DATA_DIR: {}", self.data_dir.display());
    }
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T, BookLeakError> {
    match optional_env(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| BookLeakError::Config(format!("{key} must be a number, got {raw:?}"))),
        None => Ok(default),
    }
}
