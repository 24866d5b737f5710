// Test mocks for the detector pipeline.
//
// One mock per trait boundary, each counting calls so tests can assert what
// was (not) reached:
// - MockBackend (SearchBackend): fixed matches or a fixed error
// - MockFetcher (ContentFetcher): URL -> page text
// - MockPlatform (PlatformExtractor): URL -> post text
// - MockJudge (ContentJudge): content substring -> verdict
// - MockOracle (Oracle): fixed reply or error, for driving OracleJudge
//
// Plus small builders for images and verdicts.

use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use ai_client::{AiError, Oracle};
use async_trait::async_trait;
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};

use bookleak_common::{
    AnalysisType, Confidence, Judgment, PlatformMetadata, PlatformSource, SearchSource, UrlVerdict,
};

use crate::domains::{DomainCategory, Platform};
use crate::fetcher::{ContentFetcher, PlatformContent, PlatformExtractor};
use crate::judge::{ContentJudge, JudgeContext, JudgeVerdict};
use crate::search::{BackendError, BackendMatch, SearchBackend, SearchImage};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// A solid-colour PNG of the given size.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = ImageBuffer::from_pixel(width, height, Rgb([30u8, 90, 160]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, ImageFormat::Png)
        .expect("encoding an in-memory PNG cannot fail");
    out.into_inner()
}

/// A scraped-and-judged verdict with the given judgment.
pub fn verdict(url: &str, judgment: Judgment) -> UrlVerdict {
    UrlVerdict {
        url: url.to_string(),
        judgment,
        reason: format!("{} by test", judgment.as_str()),
        confidence: Confidence::Medium,
        analysis_type: AnalysisType::ScrapeAndJudge,
        search_method: None,
        platform: None,
    }
}

// ---------------------------------------------------------------------------
// MockBackend
// ---------------------------------------------------------------------------

/// Search backend returning a fixed list, or a fixed error.
/// An empty list is reported as `NoMatches`, like the real adapters do.
pub struct MockBackend {
    name: &'static str,
    source: SearchSource,
    matches: Vec<BackendMatch>,
    error: Option<BackendError>,
    delay: Option<std::time::Duration>,
    public_urls: Arc<Mutex<Vec<Option<String>>>>,
    panic_for: Arc<Mutex<HashSet<uuid::Uuid>>>,
    calls: AtomicUsize,
}

impl MockBackend {
    pub fn vision() -> Self {
        Self::named("mock-vision", SearchSource::Vision)
    }

    pub fn lens() -> Self {
        Self::named("mock-lens", SearchSource::Lens)
    }

    fn named(name: &'static str, source: SearchSource) -> Self {
        Self {
            name,
            source,
            matches: Vec::new(),
            error: None,
            delay: None,
            public_urls: Arc::new(Mutex::new(Vec::new())),
            panic_for: Arc::new(Mutex::new(HashSet::new())),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_match(mut self, m: BackendMatch) -> Self {
        self.matches.push(m);
        self
    }

    pub fn failing(mut self, error: BackendError) -> Self {
        self.error = Some(error);
        self
    }

    /// Sleep before answering, for timeout tests.
    pub fn delayed(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Shared log of the public URL each query was given.
    pub fn seen_public_urls(&self) -> Arc<Mutex<Vec<Option<String>>>> {
        self.public_urls.clone()
    }

    /// Shared set of image ids whose query panics, for task isolation tests.
    pub fn panic_for(&self) -> Arc<Mutex<HashSet<uuid::Uuid>>> {
        self.panic_for.clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchBackend for MockBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    fn source(&self) -> SearchSource {
        self.source
    }

    async fn query(&self, image: &SearchImage) -> Result<Vec<BackendMatch>, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.public_urls.lock().unwrap().push(image.public_url.clone());
        if self.panic_for.lock().unwrap().contains(&image.image_id) {
            panic!("mock backend told to panic for {}", image.image_id);
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(e) = &self.error {
            return Err(e.clone());
        }
        if self.matches.is_empty() {
            return Err(BackendError::NoMatches);
        }
        Ok(self.matches.clone())
    }
}

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// URL -> page text. Unregistered URLs are unreadable.
#[derive(Default)]
pub struct MockFetcher {
    pages: HashMap<String, String>,
    calls: AtomicUsize,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_page(mut self, url: &str, text: &str) -> Self {
        self.pages.insert(url.to_string(), text.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentFetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Option<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.pages.get(url).cloned()
    }
}

// ---------------------------------------------------------------------------
// MockPlatform
// ---------------------------------------------------------------------------

/// URL -> post text, reported as API-sourced. Unregistered URLs are
/// unavailable.
#[derive(Default)]
pub struct MockPlatform {
    posts: HashMap<String, String>,
    delay: Option<std::time::Duration>,
    calls: AtomicUsize,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_post(mut self, url: &str, text: &str) -> Self {
        self.posts.insert(url.to_string(), text.to_string());
        self
    }

    /// Sleep before answering, for timeout tests.
    pub fn delayed(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlatformExtractor for MockPlatform {
    async fn extract(&self, url: &str, platform: Platform) -> PlatformContent {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.posts.get(url) {
            Some(text) => PlatformContent {
                text: Some(text.clone()),
                metadata: PlatformMetadata {
                    platform: platform.as_str().to_string(),
                    source: PlatformSource::Api,
                    author: None,
                    likes: None,
                    comments: None,
                    shares: None,
                },
            },
            None => PlatformContent::unavailable(platform),
        }
    }
}

// ---------------------------------------------------------------------------
// MockJudge
// ---------------------------------------------------------------------------

/// Returns the verdict of the first rule whose substring occurs in the
/// content, else the default (unknown unless set).
pub struct MockJudge {
    rules: Vec<(String, JudgeVerdict)>,
    default: JudgeVerdict,
    calls: AtomicUsize,
    last_category: Mutex<Option<DomainCategory>>,
}

impl Default for MockJudge {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            default: JudgeVerdict::new(Judgment::Unknown, "no rule matched"),
            calls: AtomicUsize::new(0),
            last_category: Mutex::new(None),
        }
    }
}

impl MockJudge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_content(mut self, needle: &str, judgment: Judgment, reason: &str) -> Self {
        self.rules
            .push((needle.to_string(), JudgeVerdict::new(judgment, reason)));
        self
    }

    pub fn with_default(mut self, judgment: Judgment, reason: &str) -> Self {
        self.default = JudgeVerdict::new(judgment, reason);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_category(&self) -> Option<DomainCategory> {
        *self.last_category.lock().unwrap()
    }
}

#[async_trait]
impl ContentJudge for MockJudge {
    async fn judge(&self, content: &str, context: &JudgeContext) -> JudgeVerdict {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_category.lock().unwrap() = Some(context.category);
        self.rules
            .iter()
            .find(|(needle, _)| content.contains(needle.as_str()))
            .map(|(_, v)| v.clone())
            .unwrap_or_else(|| self.default.clone())
    }
}

// ---------------------------------------------------------------------------
// MockOracle
// ---------------------------------------------------------------------------

type ErrorFactory = Box<dyn Fn() -> AiError + Send + Sync>;

/// Oracle with a fixed reply, or a fixed error.
pub struct MockOracle {
    reply: String,
    error: Option<ErrorFactory>,
    prompts: Mutex<Vec<String>>,
}

impl MockOracle {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            error: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: impl Fn() -> AiError + Send + Sync + 'static) -> Self {
        Self {
            reply: String::new(),
            error: Some(Box::new(error)),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Oracle for MockOracle {
    async fn complete(&self, _system: &str, prompt: &str) -> ai_client::Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match &self.error {
            Some(make) => Err(make()),
            None => Ok(self.reply.clone()),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}
