mod client;
pub(crate) mod types;

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::error::{AiError, Result};
use crate::traits::Oracle;

use client::GeminiClient;
use types::*;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(90);

// =============================================================================
// Gemini
// =============================================================================

#[derive(Clone)]
pub struct Gemini {
    api_key: String,
    model: String,
    base_url: Option<String>,
    timeout: Duration,
}

impl Gemini {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn from_env(model: impl Into<String>) -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| AiError::Config("GEMINI_API_KEY environment variable not set".into()))?;
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

    fn client(&self) -> GeminiClient {
        let client = GeminiClient::new(&self.api_key, self.timeout);
        if let Some(ref url) = self.base_url {
            client.with_base_url(url)
        } else {
            client
        }
    }

    pub async fn generate_text(
        &self,
        system: impl Into<String>,
        user: impl Into<String>,
    ) -> Result<String> {
        let request = GenerateRequest {
            system_instruction: Some(Content::system(system)),
            contents: vec![Content::user(user)],
            generation_config: GenerationConfig {
                temperature: 0.0,
                max_output_tokens: 1024,
            },
        };

        let response = self.client().generate(&self.model, &request).await?;

        if let Some(reason) = response.block_reason() {
            warn!(model = %self.model, reason, "Gemini blocked the prompt");
        }

        response.text().ok_or(AiError::EmptyResponse("Gemini"))
    }
}

#[async_trait]
impl Oracle for Gemini {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        self.generate_text(system, prompt).await
    }

    fn name(&self) -> &str {
        "gemini"
    }
}
