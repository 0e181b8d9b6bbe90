use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiMessage {
    pub role: String,
    pub content: String,
}

impl AiMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AiConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Ask the model to think before answering (Ollama `think`).
    pub reasoning_enabled: Option<bool>,
}

/// Response from an AI provider, containing the main content and optional thinking.
///
/// Providers that expose their reasoning separately put it in `thinking`; the
/// verdict is only ever read from `content`.
#[derive(Debug, Clone, Default)]
pub struct AiProviderResponse {
    pub content: String,
    pub thinking: Option<String>,
}

/// One remembered exchange with the judgment model.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationTurn {
    pub user: String,
    pub assistant: String,
}
