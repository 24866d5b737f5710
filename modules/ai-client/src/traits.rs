use async_trait::async_trait;

use crate::error::Result;

/// A text-in, text-out completion endpoint.
///
/// Implementations send one system prompt and one user prompt and return the
/// first text block of the reply.
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String>;

    /// Provider name for logs.
    fn name(&self) -> &str;
}
