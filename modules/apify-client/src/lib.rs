pub mod error;
pub mod types;

pub use error::{ApifyError, Result};
pub use types::{
    FacebookPost, InstagramPost, RunData, SocialPost, StartUrl, TikTokPost, Tweet, TweetAuthor,
};

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use types::{ApiResponse, FacebookPostInput, InstagramPostInput, TikTokVideoInput, TweetInput};

const BASE_URL: &str = "https://api.apify.com/v2";

/// Actor ID for apify/instagram-scraper.
const INSTAGRAM_SCRAPER: &str = "shu8hvrXbJbY3Eb9W";

/// Actor ID for apify/facebook-posts-scraper.
const FACEBOOK_POSTS_SCRAPER: &str = "KoJrdxJCTtpon81KY";

/// Actor ID for apidojo/tweet-scraper.
const TWEET_SCRAPER: &str = "61RPP7dywgiy0JPD0";

/// Actor ID for clockworks/tiktok-scraper.
const TIKTOK_SCRAPER: &str = "GdWCkxBtKWOsKjdch";

/// Each poll long-waits up to 60s server side; cap the total wait.
const MAX_POLLS: u32 = 5;

pub struct ApifyClient {
    client: reqwest::Client,
    token: String,
    base_url: String,
}

impl ApifyClient {
    pub fn new(token: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(90))
                .build()
                .unwrap_or_default(),
            token,
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    /// Start an actor run with the given input. Returns immediately with run metadata.
    pub async fn start_run<I: Serialize>(&self, actor_id: &str, input: &I) -> Result<RunData> {
        let url = format!("{}/acts/{}/runs", self.base_url, actor_id);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(input)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApifyError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let api_resp: ApiResponse<RunData> = resp.json().await?;
        Ok(api_resp.data)
    }

    /// Poll until a run completes. Uses `waitForFinish=60` for efficient long-polling.
    pub async fn wait_for_run(&self, run_id: &str) -> Result<RunData> {
        for _ in 0..MAX_POLLS {
            let url = format!("{}/actor-runs/{}?waitForFinish=60", self.base_url, run_id);
            let resp = self
                .client
                .get(&url)
                .bearer_auth(&self.token)
                .send()
                .await?;

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(ApifyError::Api {
                    status: status.as_u16(),
                    message: body,
                });
            }

            let api_resp: ApiResponse<RunData> = resp.json().await?;
            match api_resp.data.status.as_str() {
                "SUCCEEDED" => return Ok(api_resp.data),
                "FAILED" | "ABORTED" | "TIMED-OUT" => {
                    return Err(ApifyError::RunFailed(api_resp.data.status));
                }
                _ => {
                    tracing::debug!(run_id, status = %api_resp.data.status, "Run still in progress");
                }
            }
        }
        Err(ApifyError::RunTimedOut(run_id.to_string()))
    }

    /// Fetch dataset items from a completed run.
    pub async fn get_dataset_items<T: DeserializeOwned>(&self, dataset_id: &str) -> Result<Vec<T>> {
        let url = format!("{}/datasets/{}/items?format=json", self.base_url, dataset_id);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApifyError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let items: Vec<T> = resp.json().await?;
        Ok(items)
    }

    /// Start a run, poll until it finishes, and return the dataset items.
    async fn run_actor<I: Serialize, T: DeserializeOwned>(
        &self,
        actor_id: &str,
        input: &I,
    ) -> Result<Vec<T>> {
        let run = self.start_run(actor_id, input).await?;
        tracing::info!(run_id = %run.id, actor_id, "Apify run started, polling for completion");

        let completed = self.wait_for_run(&run.id).await?;
        tracing::info!(
            run_id = %completed.id,
            dataset_id = %completed.default_dataset_id,
            "Run completed, fetching results"
        );

        self.get_dataset_items(&completed.default_dataset_id).await
    }

    /// Look up a single Instagram post by URL.
    pub async fn scrape_instagram_post(&self, post_url: &str) -> Result<Option<SocialPost>> {
        tracing::info!(post_url, "Scraping Instagram post");
        let input = InstagramPostInput {
            direct_urls: vec![post_url.to_string()],
            results_type: "posts".to_string(),
            results_limit: 1,
        };
        let posts: Vec<InstagramPost> = self.run_actor(INSTAGRAM_SCRAPER, &input).await?;
        Ok(posts
            .into_iter()
            .next()
            .map(|p| p.into_social_post(post_url)))
    }

    /// Look up a single Facebook post by URL.
    pub async fn scrape_facebook_post(&self, post_url: &str) -> Result<Option<SocialPost>> {
        tracing::info!(post_url, "Scraping Facebook post");
        let input = FacebookPostInput {
            start_urls: vec![StartUrl {
                url: post_url.to_string(),
            }],
            results_limit: 1,
        };
        let posts: Vec<FacebookPost> = self.run_actor(FACEBOOK_POSTS_SCRAPER, &input).await?;
        Ok(posts
            .into_iter()
            .next()
            .map(|p| p.into_social_post(post_url)))
    }

    /// Look up a single X/Twitter post by URL.
    pub async fn scrape_tweet(&self, post_url: &str) -> Result<Option<SocialPost>> {
        tracing::info!(post_url, "Scraping X post");
        let input = TweetInput {
            start_urls: vec![post_url.to_string()],
            max_items: 1,
        };
        let tweets: Vec<Tweet> = self.run_actor(TWEET_SCRAPER, &input).await?;
        Ok(tweets
            .into_iter()
            .next()
            .map(|t| t.into_social_post(post_url)))
    }

    /// Look up a single TikTok video by URL.
    pub async fn scrape_tiktok_video(&self, post_url: &str) -> Result<Option<SocialPost>> {
        tracing::info!(post_url, "Scraping TikTok video");
        let input = TikTokVideoInput {
            post_urls: vec![post_url.to_string()],
            results_per_page: 1,
        };
        let posts: Vec<TikTokPost> = self.run_actor(TIKTOK_SCRAPER, &input).await?;
        Ok(posts
            .into_iter()
            .next()
            .map(|p| p.into_social_post(post_url)))
    }
}
