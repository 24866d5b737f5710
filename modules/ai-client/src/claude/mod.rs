mod client;
pub(crate) mod types;

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::error::{AiError, Result};
use crate::traits::Oracle;

use client::ClaudeClient;
use types::*;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(90);

// =============================================================================
// Claude
// =============================================================================

#[derive(Clone)]
pub struct Claude {
    api_key: String,
    pub(crate) model: String,
    base_url: Option<String>,
    timeout: Duration,
}

impl Claude {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn from_env(model: impl Into<String>) -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| AiError::Config("ANTHROPIC_API_KEY environment variable not set".into()))?;
        Ok(Self::new(api_key, model))
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn client(&self) -> ClaudeClient {
        let client = ClaudeClient::new(&self.api_key, self.timeout);
        if let Some(ref url) = self.base_url {
            client.with_base_url(url)
        } else {
            client
        }
    }

    pub async fn chat_completion(
        &self,
        system: impl Into<String>,
        user: impl Into<String>,
    ) -> Result<String> {
        let request = ChatRequest::new(&self.model)
            .system(system)
            .message(WireMessage::user(user))
            .max_tokens(1024)
            .temperature(0.0);

        let response = self.client().chat(&request).await?;

        if response.truncated() {
            warn!(model = %self.model, "Claude reply hit max_tokens");
        }

        response.text().ok_or(AiError::EmptyResponse("Claude"))
    }
}

#[async_trait]
impl Oracle for Claude {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        self.chat_completion(system, prompt).await
    }

    fn name(&self) -> &str {
        "claude"
    }
}
