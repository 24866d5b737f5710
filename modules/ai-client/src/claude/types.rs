use serde::{Deserialize, Serialize};

// =============================================================================
// Messages
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Role {
    User,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct WireMessage {
    pub role: Role,
    pub content: String,
}

impl WireMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub(crate) enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

// =============================================================================
// Chat Request
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ChatRequest {
    pub model: String,
    pub max_tokens: u32,
    pub messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            max_tokens: 1024,
            messages: Vec::new(),
            system: None,
            temperature: None,
        }
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn message(mut self, message: WireMessage) -> Self {
        self.messages.push(message);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

// =============================================================================
// Chat Response
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ChatResponse {
    pub content: Vec<ContentBlock>,
    pub stop_reason: Option<String>,
}

impl ChatResponse {
    /// The reply hit the token limit, so any verdict line may be cut off.
    pub fn truncated(&self) -> bool {
        self.stop_reason.as_deref() == Some("max_tokens")
    }

    pub fn text(&self) -> Option<String> {
        self.content.iter().find_map(|block| match block {
            ContentBlock::Text { text } => Some(text.clone()),
            ContentBlock::Other => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_text_skips_non_text_blocks() {
        let json = r#"{
            "content": [
                {"type": "thinking", "thinking": "..."},
                {"type": "text", "text": "判定：○"}
            ],
            "stop_reason": "end_turn"
        }"#;
        let resp: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.text().as_deref(), Some("判定：○"));
        assert!(!resp.truncated());
    }

    #[test]
    fn max_tokens_stop_is_truncated() {
        let json = r#"{"content": [{"type": "text", "text": "判定"}], "stop_reason": "max_tokens"}"#;
        let resp: ChatResponse = serde_json::from_str(json).unwrap();
        assert!(resp.truncated());
    }

    #[test]
    fn request_omits_unset_fields() {
        let req = ChatRequest::new("claude-haiku-4-5").message(WireMessage::user("hi"));
        let value = serde_json::to_value(&req).unwrap();
        assert!(value.get("system").is_none());
        assert!(value.get("temperature").is_none());
        assert_eq!(value["messages"][0]["role"], "user");
    }
}
