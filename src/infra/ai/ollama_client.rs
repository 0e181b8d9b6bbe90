use crate::core::ai::{
    models::{AiConfig, AiMessage, AiProviderResponse},
    AiError, AiProvider,
};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

/// Local Ollama server, `/api/chat` without streaming.
pub struct OllamaClient {
    client: Client,
    chat_url: String,
}

impl OllamaClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AiError::Http(e.to_string()))?;
        Ok(Self {
            client,
            chat_url: chat_url(base_url),
        })
    }
}

/// Accepts both `http://host:11434` and `http://host:11434/api`.
fn chat_url(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if base.ends_with("/api") {
        format!("{}/chat", base)
    } else {
        format!("{}/api/chat", base)
    }
}

#[async_trait]
impl AiProvider for OllamaClient {
    async fn chat_complete(
        &self,
        messages: &[AiMessage],
        config: &AiConfig,
    ) -> Result<AiProviderResponse, AiError> {
        let payload = json!({
            "model": config.model,
            "messages": messages,
            "stream": false,
            "think": config.reasoning_enabled.unwrap_or(false),
        });

        let response = self
            .client
            .post(&self.chat_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| AiError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::Api { status, body });
        }

        let response_json: Value = response
            .json()
            .await
            .map_err(|e| AiError::Http(e.to_string()))?;

        let message = &response_json["message"];
        let content = message["content"]
            .as_str()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or(AiError::EmptyResponse)?
            .to_string();
        let thinking = message["thinking"].as_str().map(str::to_string);

        Ok(AiProviderResponse { content, thinking })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_url_variants() {
        assert_eq!(chat_url("http://127.0.0.1:11434"), "http://127.0.0.1:11434/api/chat");
        assert_eq!(chat_url("http://127.0.0.1:11434/"), "http://127.0.0.1:11434/api/chat");
        assert_eq!(chat_url("http://host/api/"), "http://host/api/chat");
    }
}
