use thiserror::Error;

/// Request-level failures. Per-URL and per-backend problems never surface
/// here; they become verdicts or empty search contributions.
#[derive(Error, Debug)]
pub enum BookLeakError {
    #[error("Image could not be decoded: {0}")]
    ImageDecode(String),

    #[error("Unsupported image: {0}")]
    UnsupportedImage(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
