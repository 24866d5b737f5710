use thiserror::Error;

pub type Result<T> = std::result::Result<T, VisionError>;

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Annotate error (code {code}): {message}")]
    Annotate { code: i32, message: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl VisionError {
    /// Bad credentials or a disabled API; retrying will not help.
    pub fn is_permanent(&self) -> bool {
        match self {
            VisionError::Api { status, .. } => matches!(status, 400 | 401 | 403 | 404),
            // google.rpc.Code: INVALID_ARGUMENT, PERMISSION_DENIED, UNAUTHENTICATED
            VisionError::Annotate { code, .. } => matches!(code, 3 | 7 | 16),
            VisionError::Network(_) | VisionError::Parse(_) => false,
        }
    }
}

impl From<reqwest::Error> for VisionError {
    fn from(err: reqwest::Error) -> Self {
        VisionError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for VisionError {
    fn from(err: serde_json::Error) -> Self {
        VisionError::Parse(err.to_string())
    }
}
