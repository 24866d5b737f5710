pub mod error;
pub mod types;

pub use error::{Result, SerpApiError};
pub use types::LensMatch;

use std::time::Duration;

use types::{is_no_results_message, LensResponse};

const BASE_URL: &str = "https://serpapi.com";

pub struct SerpApiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl SerpApiClient {
    pub fn new(api_key: String, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            api_key,
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    /// Google Lens exact-match search for a publicly reachable image URL.
    pub async fn lens_exact_matches(&self, image_url: &str) -> Result<Vec<LensMatch>> {
        tracing::info!(image_url, "SerpAPI Google Lens request");

        let url = format!("{}/search.json", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("engine", "google_lens"),
                ("type", "exact_matches"),
                ("url", image_url),
                ("api_key", self.api_key.as_str()),
            ])
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;

        // SerpAPI answers "no results" with a JSON error body, sometimes on a
        // non-2xx status, so inspect the body before the status.
        let parsed: Option<LensResponse> = serde_json::from_str(&body).ok();

        if let Some(ref r) = parsed {
            if let Some(ref message) = r.error {
                if is_no_results_message(message) {
                    return Err(SerpApiError::NoResults(message.clone()));
                }
                if status.is_success() {
                    return Err(SerpApiError::Search(message.clone()));
                }
            }
        }

        if !status.is_success() {
            return Err(SerpApiError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let parsed = match parsed {
            Some(p) => p,
            None => serde_json::from_str::<LensResponse>(&body)?,
        };

        if let Some(status) = parsed
            .search_metadata
            .as_ref()
            .and_then(|m| m.status.as_deref())
        {
            tracing::debug!(status, "SerpAPI search status");
        }

        let matches: Vec<LensMatch> = parsed
            .into_matches()
            .into_iter()
            .filter(|m| !m.link.is_empty())
            .collect();

        tracing::info!(count = matches.len(), "SerpAPI Google Lens complete");
        Ok(matches)
    }
}
