// Page content retrieval.
//
// ContentFetcher turns a URL into judge-ready text, or nothing. "Nothing"
// covers every reason a page cannot be read (binary resource, image CDN,
// platform URL, non-HTML, timeout, non-2xx); the orchestrator reports all of
// them as insufficient information.

pub mod html;
pub mod platform;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, info, warn};

use crate::domains::DomainClassifier;

pub use platform::{PlatformContent, PlatformExtractor, SocialPlatformExtractor};

pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Pages declaring a larger body are skipped; undeclared ones are cut to
/// this many characters before parsing.
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Judge-ready text for `url`, or `None` when the page cannot be read.
    async fn fetch(&self, url: &str) -> Option<String>;
}

// ---------------------------------------------------------------------------
// PageClient: HEAD-then-GET HTML retrieval shared by scraping and meta tags
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PageClient {
    client: reqwest::Client,
    user_agent: String,
}

impl PageClient {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            user_agent: BROWSER_USER_AGENT.to_string(),
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Raw HTML of `url`, or `None` if it is not a readable HTML page.
    ///
    /// A HEAD request screens out non-HTML resources; if HEAD itself fails the
    /// GET goes ahead and its own content type decides.
    pub async fn fetch_html(&self, url: &str) -> Option<String> {
        match self
            .client
            .head(url)
            .header("User-Agent", &self.user_agent)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => {
                if let Some(content_type) = header_content_type(&resp) {
                    if !is_html(&content_type) {
                        info!(url, content_type = %content_type, "Skipping non-HTML resource");
                        return None;
                    }
                }
            }
            Ok(resp) => {
                debug!(url, status = resp.status().as_u16(), "HEAD rejected, trying GET");
            }
            Err(e) => {
                warn!(url, error = %e, "HEAD request failed, trying GET");
            }
        }

        let resp = match self
            .client
            .get(url)
            .header("User-Agent", &self.user_agent)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                warn!(url, error = %e, "Page fetch failed");
                return None;
            }
        };

        let status = resp.status();
        if !status.is_success() {
            warn!(url, status = status.as_u16(), "Page returned non-success status");
            return None;
        }
        if let Some(content_type) = header_content_type(&resp) {
            if !is_html(&content_type) {
                info!(url, content_type = %content_type, "Skipping non-HTML resource");
                return None;
            }
        }

        if let Some(len) = resp.content_length() {
            if len > MAX_BODY_BYTES as u64 {
                info!(url, bytes = len, "Skipping oversized page");
                return None;
            }
        }

        // Decodes by the Content-Type charset (Shift_JIS, EUC-JP, ...).
        let body = match resp.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!(url, error = %e, "Failed to read page body");
                return None;
            }
        };
        Some(html::truncate_chars(&body, MAX_BODY_BYTES))
    }
}

fn header_content_type(resp: &reqwest::Response) -> Option<String> {
    resp.headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_lowercase())
}

fn is_html(content_type: &str) -> bool {
    content_type.contains("text/html") || content_type.contains("application/xhtml")
}

// ---------------------------------------------------------------------------
// HttpContentFetcher
// ---------------------------------------------------------------------------

/// Scrapes generic pages. Platform URLs, image CDNs and binary resources are
/// refused up front without any network traffic.
pub struct HttpContentFetcher {
    pages: PageClient,
    classifier: DomainClassifier,
}

impl HttpContentFetcher {
    pub fn new(pages: PageClient, classifier: DomainClassifier) -> Self {
        Self { pages, classifier }
    }

    /// Why a URL is never fetched, if it is one of those.
    pub fn skip_reason(&self, url: &str) -> Option<&'static str> {
        if self.classifier.has_skipped_extension(url) {
            Some("binary or image extension")
        } else if self.classifier.is_image_cdn(url) {
            Some("image hosting domain")
        } else if self.classifier.platform(url).is_some() {
            Some("social platform URL")
        } else {
            None
        }
    }
}

#[async_trait]
impl ContentFetcher for HttpContentFetcher {
    async fn fetch(&self, url: &str) -> Option<String> {
        if let Some(reason) = self.skip_reason(url) {
            info!(url, reason, "Skipping scrape");
            return None;
        }

        let page = self.pages.fetch_html(url).await?;
        let text = html::extract_page_text(&page);
        match &text {
            Some(t) => info!(url, chars = t.chars().count(), "Scraped page"),
            None => info!(url, "Page had no title or paragraphs"),
        }
        text
    }
}
