use thiserror::Error;

pub type Result<T> = std::result::Result<T, AiError>;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication failed (status {status}): {message}")]
    Auth { status: u16, message: String },

    #[error("Rate limited (status {status}): {message}")]
    RateLimited { status: u16, message: String },

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Empty response from {0}")]
    EmptyResponse(&'static str),
}

/// Coarse error category, used by callers to pick a user-facing reason and
/// decide whether a later retry makes sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiErrorKind {
    Config,
    Auth,
    RateLimited,
    ModelNotFound,
    Network,
    Api,
    Parse,
}

impl AiError {
    /// Map a non-success HTTP status (plus body) onto the taxonomy.
    pub fn from_status(status: u16, message: String) -> Self {
        let lower = message.to_lowercase();
        match status {
            401 | 403 => AiError::Auth { status, message },
            429 => AiError::RateLimited { status, message },
            404 if lower.contains("model") => AiError::ModelNotFound(message),
            _ if lower.contains("quota") || lower.contains("resource_exhausted") => {
                AiError::RateLimited { status, message }
            }
            _ => AiError::Api { status, message },
        }
    }

    pub fn kind(&self) -> AiErrorKind {
        match self {
            AiError::Config(_) => AiErrorKind::Config,
            AiError::Auth { .. } => AiErrorKind::Auth,
            AiError::RateLimited { .. } => AiErrorKind::RateLimited,
            AiError::ModelNotFound(_) => AiErrorKind::ModelNotFound,
            AiError::Network(_) => AiErrorKind::Network,
            AiError::Api { .. } => AiErrorKind::Api,
            AiError::Parse(_) | AiError::EmptyResponse(_) => AiErrorKind::Parse,
        }
    }

    /// Quota and transport failures may succeed on a later pass; auth and
    /// configuration failures will not.
    pub fn is_retryable(&self) -> bool {
        match self {
            AiError::RateLimited { .. } | AiError::Network(_) => true,
            AiError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for AiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            AiError::Parse(err.to_string())
        } else {
            AiError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AiError {
    fn from(err: serde_json::Error) -> Self {
        AiError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(AiError::from_status(401, "bad key".into()).kind(), AiErrorKind::Auth);
        assert_eq!(AiError::from_status(403, "denied".into()).kind(), AiErrorKind::Auth);
        assert_eq!(AiError::from_status(429, "slow down".into()).kind(), AiErrorKind::RateLimited);
        assert_eq!(
            AiError::from_status(404, "models/gemini-x is not found".into()).kind(),
            AiErrorKind::ModelNotFound
        );
        assert_eq!(
            AiError::from_status(400, "Quota exceeded for metric".into()).kind(),
            AiErrorKind::RateLimited
        );
        assert_eq!(AiError::from_status(500, "boom".into()).kind(), AiErrorKind::Api);
    }

    #[test]
    fn retryable_only_for_transient_failures() {
        assert!(AiError::Network("timeout".into()).is_retryable());
        assert!(AiError::from_status(429, String::new()).is_retryable());
        assert!(AiError::from_status(503, String::new()).is_retryable());
        assert!(!AiError::from_status(401, String::new()).is_retryable());
        assert!(!AiError::Config("missing key".into()).is_retryable());
        assert!(!AiError::from_status(400, "bad request".into()).is_retryable());
    }
}
