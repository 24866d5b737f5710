use async_trait::async_trait;
use vision_client::{VisionClient, VisionError, WebDetection};

use bookleak_common::SearchSource;

use super::{BackendError, BackendMatch, SearchBackend, SearchImage};

/// Image-similarity backend over Cloud Vision web detection.
pub struct VisionBackend {
    client: Option<VisionClient>,
    max_results: u32,
}

impl VisionBackend {
    pub fn new(client: Option<VisionClient>, max_results: u32) -> Self {
        Self {
            client,
            max_results,
        }
    }
}

#[async_trait]
impl SearchBackend for VisionBackend {
    fn name(&self) -> &'static str {
        "vision"
    }

    fn source(&self) -> SearchSource {
        SearchSource::Vision
    }

    async fn query(&self, image: &SearchImage) -> Result<Vec<BackendMatch>, BackendError> {
        let Some(client) = &self.client else {
            return Err(BackendError::NotConfigured(
                "GOOGLE_VISION_API_KEY not set".into(),
            ));
        };

        let detection = client
            .web_detection(&image.bytes, self.max_results)
            .await
            .map_err(classify_error)?;

        let matches = matches_from_detection(detection);
        if matches.is_empty() {
            return Err(BackendError::NoMatches);
        }
        Ok(matches)
    }
}

fn classify_error(err: VisionError) -> BackendError {
    if err.is_permanent() {
        BackendError::Permanent(err.to_string())
    } else {
        BackendError::Transient(err.to_string())
    }
}

/// Flatten a web detection into tagged matches. Visually similar images are
/// not matches of this image and are dropped.
pub fn matches_from_detection(detection: WebDetection) -> Vec<BackendMatch> {
    let full = detection
        .full_matching_images
        .into_iter()
        .map(|img| BackendMatch::FullImage {
            url: img.url,
            score: img.score,
        });
    let partial = detection
        .partial_matching_images
        .into_iter()
        .map(|img| BackendMatch::PartialImage {
            url: img.url,
            score: img.score,
        });
    let pages = detection
        .pages_with_matching_images
        .into_iter()
        .map(|page| BackendMatch::Page {
            full_matches: page.full_matching_images.len(),
            partial_matches: page.partial_matching_images.len(),
            url: page.url,
            title: page.page_title.filter(|t| !t.trim().is_empty()),
            score: page.score,
        });

    full.chain(partial)
        .chain(pages)
        .filter(|m| !m.url().trim().is_empty())
        .collect()
}
