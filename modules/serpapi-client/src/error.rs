use thiserror::Error;

pub type Result<T> = std::result::Result<T, SerpApiError>;

#[derive(Debug, Error)]
pub enum SerpApiError {
    /// The search ran but Lens found nothing. Not a failure.
    #[error("No results: {0}")]
    NoResults(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Search error: {0}")]
    Search(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl SerpApiError {
    /// Invalid key or exhausted plan; retrying within the same pass is pointless.
    pub fn is_permanent(&self) -> bool {
        match self {
            SerpApiError::Api { status, .. } => matches!(status, 400 | 401 | 403),
            SerpApiError::Search(msg) => {
                let lower = msg.to_lowercase();
                lower.contains("invalid api key") || lower.contains("run out of searches")
            }
            _ => false,
        }
    }
}

impl From<reqwest::Error> for SerpApiError {
    fn from(err: reqwest::Error) -> Self {
        SerpApiError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for SerpApiError {
    fn from(err: serde_json::Error) -> Self {
        SerpApiError::Parse(err.to_string())
    }
}
