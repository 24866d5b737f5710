use async_trait::async_trait;
use serpapi_client::{SerpApiClient, SerpApiError};

use bookleak_common::SearchSource;

use super::{BackendError, BackendMatch, SearchBackend, SearchImage};

/// Exact-match backend over SerpAPI Google Lens. Lens fetches the image by
/// URL, so the backend only runs when the upload is publicly addressable.
pub struct LensBackend {
    client: Option<SerpApiClient>,
}

impl LensBackend {
    pub fn new(client: Option<SerpApiClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SearchBackend for LensBackend {
    fn name(&self) -> &'static str {
        "lens"
    }

    fn source(&self) -> SearchSource {
        SearchSource::Lens
    }

    async fn query(&self, image: &SearchImage) -> Result<Vec<BackendMatch>, BackendError> {
        let Some(client) = &self.client else {
            return Err(BackendError::NotConfigured("SERPAPI_API_KEY not set".into()));
        };
        let Some(image_url) = &image.public_url else {
            return Err(BackendError::NotConfigured(
                "no public image URL (PUBLIC_BASE_URL not set)".into(),
            ));
        };

        let matches = client
            .lens_exact_matches(image_url)
            .await
            .map_err(classify_error)?;

        let matches: Vec<BackendMatch> = matches
            .into_iter()
            .map(|m| BackendMatch::VisualExact {
                url: m.link,
                title: Some(m.title).filter(|t| !t.trim().is_empty()),
                position: m.position,
            })
            .collect();
        if matches.is_empty() {
            return Err(BackendError::NoMatches);
        }
        Ok(matches)
    }
}

fn classify_error(err: SerpApiError) -> BackendError {
    match err {
        SerpApiError::NoResults(_) => BackendError::NoMatches,
        e if e.is_permanent() => BackendError::Permanent(e.to_string()),
        e => BackendError::Transient(e.to_string()),
    }
}
