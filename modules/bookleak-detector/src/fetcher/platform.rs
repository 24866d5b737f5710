// Social platform extraction.
//
// Platform pages are mostly script-rendered, so scraping them yields nothing
// useful. Extraction runs a fallback chain: structured post via the Apify API
// (when a token is configured), then Open Graph meta tags, then nothing.

use std::time::Duration;

use apify_client::{ApifyClient, SocialPost};
use async_trait::async_trait;
use tracing::{info, warn};

use bookleak_common::{PlatformMetadata, PlatformSource};

use super::html::{self, MAX_CONTENT_CHARS};
use super::PageClient;
use crate::domains::Platform;

/// What could be learned about a platform post.
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformContent {
    /// Judge-ready text, absent when nothing could be read.
    pub text: Option<String>,
    pub metadata: PlatformMetadata,
}

impl PlatformContent {
    pub fn unavailable(platform: Platform) -> Self {
        Self {
            text: None,
            metadata: PlatformMetadata {
                platform: platform.as_str().to_string(),
                source: PlatformSource::Unavailable,
                author: None,
                likes: None,
                comments: None,
                shares: None,
            },
        }
    }

    pub fn from_post(platform: Platform, post: &SocialPost) -> Self {
        let mut text = format!("Platform: {platform}\n");
        if let Some(author) = &post.author {
            text.push_str(&format!("Author: {author}\n"));
        }
        text.push_str(&format!("Post: {}\n", post.text.trim()));

        let engagement: Vec<String> = [
            (post.likes, "likes"),
            (post.comments, "comments"),
            (post.shares, "shares"),
        ]
        .into_iter()
        .filter_map(|(n, label)| n.map(|n| format!("{n} {label}")))
        .collect();
        if !engagement.is_empty() {
            text.push_str(&format!("Engagement: {}\n", engagement.join(", ")));
        }

        Self {
            text: Some(html::truncate_chars(text.trim_end(), MAX_CONTENT_CHARS)),
            metadata: PlatformMetadata {
                platform: platform.as_str().to_string(),
                source: PlatformSource::Api,
                author: post.author.clone(),
                likes: post.likes,
                comments: post.comments,
                shares: post.shares,
            },
        }
    }

    pub fn from_meta(platform: Platform, meta: &html::PageMeta) -> Self {
        if meta.is_empty() {
            return Self::unavailable(platform);
        }

        let mut text = format!("Platform: {platform}\n");
        if let Some(title) = &meta.title {
            text.push_str(&format!("Title: {title}\n"));
        }
        if let Some(description) = &meta.description {
            text.push_str(&format!("Description: {description}\n"));
        }

        Self {
            text: Some(html::truncate_chars(text.trim_end(), MAX_CONTENT_CHARS)),
            metadata: PlatformMetadata {
                platform: platform.as_str().to_string(),
                source: PlatformSource::MetaTags,
                author: None,
                likes: None,
                comments: None,
                shares: None,
            },
        }
    }
}

#[async_trait]
pub trait PlatformExtractor: Send + Sync {
    async fn extract(&self, url: &str, platform: Platform) -> PlatformContent;
}

/// Upper bound on one actor run, polling included.
const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(90);

/// Apify-backed extractor with a meta-tag fallback. A missing token is a
/// normal configuration: extraction simply starts at the meta tags.
pub struct SocialPlatformExtractor {
    apify: Option<ApifyClient>,
    pages: PageClient,
    api_timeout: Duration,
}

impl SocialPlatformExtractor {
    pub fn new(apify: Option<ApifyClient>, pages: PageClient) -> Self {
        Self {
            apify,
            pages,
            api_timeout: DEFAULT_API_TIMEOUT,
        }
    }

    pub fn with_api_timeout(mut self, timeout: Duration) -> Self {
        self.api_timeout = timeout;
        self
    }

    async fn from_api(&self, url: &str, platform: Platform) -> Option<SocialPost> {
        let apify = self.apify.as_ref()?;
        let result = match platform {
            Platform::Instagram => apify.scrape_instagram_post(url).await,
            Platform::Facebook => apify.scrape_facebook_post(url).await,
            Platform::X => apify.scrape_tweet(url).await,
            Platform::Tiktok => apify.scrape_tiktok_video(url).await,
            Platform::Threads => return None,
        };

        match result {
            Ok(Some(post)) if !post.text.trim().is_empty() => Some(post),
            Ok(_) => {
                info!(url, %platform, "Platform API returned no post text");
                None
            }
            Err(e) if e.is_auth() => {
                warn!(url, %platform, error = %e, "Platform API rejected credentials");
                None
            }
            Err(e) => {
                warn!(url, %platform, error = %e, "Platform API lookup failed");
                None
            }
        }
    }
}

#[async_trait]
impl PlatformExtractor for SocialPlatformExtractor {
    async fn extract(&self, url: &str, platform: Platform) -> PlatformContent {
        match tokio::time::timeout(self.api_timeout, self.from_api(url, platform)).await {
            Ok(Some(post)) => return PlatformContent::from_post(platform, &post),
            Ok(None) => {}
            Err(_) => {
                warn!(url, %platform, timeout_secs = self.api_timeout.as_secs(), "Platform API lookup timed out");
            }
        }

        match self.pages.fetch_html(url).await {
            Some(page) => {
                let content = PlatformContent::from_meta(platform, &html::extract_meta(&page));
                if content.text.is_none() {
                    info!(url, %platform, "No usable meta tags on platform page");
                }
                content
            }
            None => PlatformContent::unavailable(platform),
        }
    }
}
