// Reverse image search.
//
// Backends speak their own wire formats; each adapter converts its response
// into `BackendMatch` values at the boundary so the aggregator only ever sees
// one tagged shape.

pub mod aggregator;
pub mod lens;
pub mod threshold;
pub mod vision;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use bookleak_common::{SearchMethod, SearchSource};

pub use aggregator::{Aggregator, BackendOutcome, BackendReport, SearchReport};
pub use lens::LensBackend;
pub use threshold::SearchTuning;
pub use vision::VisionBackend;

/// The image as backends see it.
#[derive(Debug, Clone)]
pub struct SearchImage {
    pub image_id: Uuid,
    pub bytes: Arc<[u8]>,
    /// Where the image can be fetched from outside, for URL-based backends.
    pub public_url: Option<String>,
}

/// One hit from a backend, tagged by what kind of match it is.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendMatch {
    /// The whole image appears at this URL.
    FullImage { url: String, score: Option<f32> },
    /// A crop or composite of the image appears at this URL.
    PartialImage { url: String, score: Option<f32> },
    /// A page embedding matching images.
    Page {
        url: String,
        title: Option<String>,
        score: Option<f32>,
        full_matches: usize,
        partial_matches: usize,
    },
    /// Exact visual match from the dedicated exact-match backend.
    VisualExact {
        url: String,
        title: Option<String>,
        position: Option<u32>,
    },
}

impl BackendMatch {
    pub fn url(&self) -> &str {
        match self {
            BackendMatch::FullImage { url, .. }
            | BackendMatch::PartialImage { url, .. }
            | BackendMatch::Page { url, .. }
            | BackendMatch::VisualExact { url, .. } => url,
        }
    }

    /// Search method implied by the match type. Pages inherit the strongest
    /// kind of image they embed.
    pub fn search_method(&self) -> SearchMethod {
        match self {
            BackendMatch::FullImage { .. } => SearchMethod::Exact,
            BackendMatch::PartialImage { .. } => SearchMethod::Partial,
            BackendMatch::Page {
                full_matches,
                partial_matches,
                ..
            } => {
                if *full_matches > 0 {
                    SearchMethod::Exact
                } else if *partial_matches > 0 {
                    SearchMethod::Partial
                } else {
                    SearchMethod::RelatedPage
                }
            }
            BackendMatch::VisualExact { .. } => SearchMethod::LensExact,
        }
    }

    /// Bare image URLs rather than pages. These are rarely readable, so they
    /// rank after pages of the same tier.
    pub fn is_image_file(&self) -> bool {
        matches!(
            self,
            BackendMatch::FullImage { .. } | BackendMatch::PartialImage { .. }
        )
    }

    /// Score in [0, 1]. Exact matches without a score count as certain.
    pub fn score(&self) -> f32 {
        let raw = match self {
            BackendMatch::FullImage { score, .. } => score.unwrap_or(1.0),
            BackendMatch::PartialImage { score, .. } | BackendMatch::Page { score, .. } => {
                score.unwrap_or(0.0)
            }
            BackendMatch::VisualExact { .. } => 1.0,
        };
        raw.clamp(0.0, 1.0)
    }

    pub fn title(&self) -> Option<&str> {
        match self {
            BackendMatch::Page { title, .. } | BackendMatch::VisualExact { title, .. } => {
                title.as_deref()
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum BackendError {
    /// The search ran and found nothing. Not a failure.
    #[error("no matches")]
    NoMatches,

    #[error("not configured: {0}")]
    NotConfigured(String),

    /// May succeed on a later pass (timeouts, 5xx, network).
    #[error("transient failure: {0}")]
    Transient(String),

    /// Will not succeed without operator action (bad key, exhausted plan).
    #[error("permanent failure: {0}")]
    Permanent(String),
}

#[async_trait]
pub trait SearchBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn source(&self) -> SearchSource;

    async fn query(&self, image: &SearchImage) -> Result<Vec<BackendMatch>, BackendError>;
}
