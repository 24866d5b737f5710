pub mod error;
pub mod types;

pub use error::{Result, VisionError};
pub use types::{WebDetection, WebImage, WebPage};

use std::time::Duration;

use base64::Engine;
use types::{
    AnnotateImageRequest, AnnotateImagesRequest, AnnotateImagesResponse, Feature, ImageContent,
};

const BASE_URL: &str = "https://vision.googleapis.com/v1";

pub struct VisionClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl VisionClient {
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

    /// Run WEB_DETECTION on raw image bytes. An image with no matches comes
    /// back as an empty `WebDetection`, not an error.
    pub async fn web_detection(&self, image: &[u8], max_results: u32) -> Result<WebDetection> {
        let body = AnnotateImagesRequest {
            requests: vec![AnnotateImageRequest {
                image: ImageContent {
                    content: base64::engine::general_purpose::STANDARD.encode(image),
                },
                features: vec![Feature {
                    feature_type: "WEB_DETECTION".to_string(),
                    max_results,
                }],
            }],
        };

        tracing::info!(bytes = image.len(), max_results, "Vision web detection request");

        let url = format!("{}/images:annotate", self.base_url);
        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(VisionError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: AnnotateImagesResponse = resp.json().await?;
        let first = parsed.responses.into_iter().next();

        match first {
            Some(r) => {
                if let Some(err) = r.error {
                    return Err(VisionError::Annotate {
                        code: err.code,
                        message: err.message,
                    });
                }
                Ok(r.web_detection.unwrap_or_default())
            }
            None => Ok(WebDetection::default()),
        }
    }
}
