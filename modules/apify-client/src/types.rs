use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Platform-agnostic post ---

/// A single post from any social platform, normalized for content judging.
/// Platform-specific dataset items convert into this.
#[derive(Debug, Clone, PartialEq)]
pub struct SocialPost {
    pub platform: String, // "instagram", "facebook", "x", "tiktok"
    pub post_url: String,
    pub text: String,
    pub author: Option<String>,
    pub likes: Option<i64>,
    pub comments: Option<i64>,
    pub shares: Option<i64>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Wrapper for Apify API responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

/// Apify actor run metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct RunData {
    pub id: String,
    pub status: String,
    #[serde(rename = "defaultDatasetId")]
    pub default_dataset_id: String,
    #[serde(rename = "startedAt")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(rename = "finishedAt")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// A start URL entry for actors that take `startUrls`.
#[derive(Debug, Clone, Serialize)]
pub struct StartUrl {
    pub url: String,
}

// --- Instagram ---

/// Input for the apify/instagram-scraper actor, pointed at one post URL.
#[derive(Debug, Clone, Serialize)]
pub struct InstagramPostInput {
    #[serde(rename = "directUrls")]
    pub direct_urls: Vec<String>,
    #[serde(rename = "resultsType")]
    pub results_type: String,
    #[serde(rename = "resultsLimit")]
    pub results_limit: u32,
}

/// A single Instagram post from the Apify dataset.
#[derive(Debug, Clone, Deserialize)]
pub struct InstagramPost {
    pub caption: Option<String>,
    #[serde(rename = "ownerUsername")]
    pub owner_username: Option<String>,
    pub url: Option<String>,
    #[serde(rename = "likesCount")]
    pub likes_count: Option<i64>,
    #[serde(rename = "commentsCount")]
    pub comments_count: Option<i64>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl InstagramPost {
    pub fn into_social_post(self, requested_url: &str) -> SocialPost {
        SocialPost {
            platform: "instagram".to_string(),
            post_url: self.url.unwrap_or_else(|| requested_url.to_string()),
            text: self.caption.unwrap_or_default(),
            author: self.owner_username,
            likes: self.likes_count,
            comments: self.comments_count,
            shares: None,
            timestamp: self.timestamp,
        }
    }
}

// --- Facebook ---

/// Input for the apify/facebook-posts-scraper actor.
#[derive(Debug, Clone, Serialize)]
pub struct FacebookPostInput {
    #[serde(rename = "startUrls")]
    pub start_urls: Vec<StartUrl>,
    #[serde(rename = "resultsLimit")]
    pub results_limit: u32,
}

/// A single Facebook post from the Apify dataset.
#[derive(Debug, Clone, Deserialize)]
pub struct FacebookPost {
    pub url: Option<String>,
    pub text: Option<String>,
    #[serde(rename = "pageName")]
    pub page_name: Option<String>,
    pub likes: Option<i64>,
    pub comments: Option<i64>,
    pub shares: Option<i64>,
}

impl FacebookPost {
    pub fn into_social_post(self, requested_url: &str) -> SocialPost {
        SocialPost {
            platform: "facebook".to_string(),
            post_url: self.url.unwrap_or_else(|| requested_url.to_string()),
            text: self.text.unwrap_or_default(),
            author: self.page_name,
            likes: self.likes,
            comments: self.comments,
            shares: self.shares,
            timestamp: None,
        }
    }
}

// --- X / Twitter ---

/// Input for the apidojo/tweet-scraper actor, pointed at tweet URLs.
#[derive(Debug, Clone, Serialize)]
pub struct TweetInput {
    #[serde(rename = "startUrls")]
    pub start_urls: Vec<String>,
    #[serde(rename = "maxItems")]
    pub max_items: u32,
}

/// Author info nested inside a Tweet.
#[derive(Debug, Clone, Deserialize)]
pub struct TweetAuthor {
    #[serde(rename = "userName")]
    pub user_name: Option<String>,
    pub name: Option<String>,
}

/// A single tweet from the Apify dataset.
#[derive(Debug, Clone, Deserialize)]
pub struct Tweet {
    pub text: Option<String>,
    #[serde(rename = "full_text")]
    pub full_text: Option<String>,
    pub url: Option<String>,
    pub author: Option<TweetAuthor>,
    #[serde(rename = "likeCount")]
    pub like_count: Option<i64>,
    #[serde(rename = "retweetCount")]
    pub retweet_count: Option<i64>,
    #[serde(rename = "replyCount")]
    pub reply_count: Option<i64>,
}

impl Tweet {
    /// Returns whichever text field is populated, preferring `full_text`.
    pub fn content(&self) -> Option<&str> {
        self.full_text.as_deref().or(self.text.as_deref())
    }

    pub fn into_social_post(self, requested_url: &str) -> SocialPost {
        let text = self.content().unwrap_or_default().to_string();
        SocialPost {
            platform: "x".to_string(),
            post_url: self.url.unwrap_or_else(|| requested_url.to_string()),
            text,
            author: self.author.and_then(|a| a.user_name.or(a.name)),
            likes: self.like_count,
            comments: self.reply_count,
            shares: self.retweet_count,
            timestamp: None,
        }
    }
}

// --- TikTok ---

/// Input for the clockworks/tiktok-scraper actor, pointed at video URLs.
#[derive(Debug, Clone, Serialize)]
pub struct TikTokVideoInput {
    #[serde(rename = "postURLs")]
    pub post_urls: Vec<String>,
    #[serde(rename = "resultsPerPage")]
    pub results_per_page: u32,
}

/// Author metadata from a TikTok post.
#[derive(Debug, Clone, Deserialize)]
pub struct TikTokAuthor {
    pub name: Option<String>,
}

/// A single TikTok post from the Apify dataset.
#[derive(Debug, Clone, Deserialize)]
pub struct TikTokPost {
    pub text: Option<String>,
    #[serde(rename = "webVideoUrl")]
    pub web_video_url: Option<String>,
    #[serde(rename = "authorMeta")]
    pub author_meta: Option<TikTokAuthor>,
    #[serde(rename = "diggCount")]
    pub digg_count: Option<i64>,
    #[serde(rename = "shareCount")]
    pub share_count: Option<i64>,
    #[serde(rename = "commentCount")]
    pub comment_count: Option<i64>,
}

impl TikTokPost {
    pub fn into_social_post(self, requested_url: &str) -> SocialPost {
        SocialPost {
            platform: "tiktok".to_string(),
            post_url: self.web_video_url.unwrap_or_else(|| requested_url.to_string()),
            text: self.text.unwrap_or_default(),
            author: self.author_meta.and_then(|a| a.name),
            likes: self.digg_count,
            comments: self.comment_count,
            shares: self.share_count,
            timestamp: None,
        }
    }
}
