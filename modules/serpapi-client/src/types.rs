use serde::Deserialize;

/// A single Lens match: a page that shows the queried image.
#[derive(Debug, Clone, Deserialize)]
pub struct LensMatch {
    pub position: Option<u32>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub link: String,
    pub source: Option<String>,
    pub thumbnail: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchMetadata {
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct LensResponse {
    pub search_metadata: Option<SearchMetadata>,
    #[serde(default)]
    pub exact_matches: Vec<LensMatch>,
    #[serde(default)]
    pub visual_matches: Vec<LensMatch>,
    pub error: Option<String>,
}

impl LensResponse {
    /// Exact matches when present, otherwise visual matches.
    pub fn into_matches(self) -> Vec<LensMatch> {
        if self.exact_matches.is_empty() {
            self.visual_matches
        } else {
            self.exact_matches
        }
    }
}

/// SerpAPI reports "nothing found" through the error field; tell it apart
/// from real failures.
pub(crate) fn is_no_results_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("hasn't returned any results") || lower.contains("no results")
}
