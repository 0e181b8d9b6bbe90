use crate::core::ai::{
    models::{AiConfig, AiMessage, AiProviderResponse},
    AiError, AiProvider,
};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

/// Any OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl OpenAiClient {
    pub fn new(base_url: &str, api_key: String, timeout: Duration) -> Result<Self, AiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AiError::Http(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl AiProvider for OpenAiClient {
    async fn chat_complete(
        &self,
        messages: &[AiMessage],
        config: &AiConfig,
    ) -> Result<AiProviderResponse, AiError> {
        if self.api_key.is_empty() {
            return Err(AiError::Api {
                status: 401,
                body: "no API key configured".to_string(),
            });
        }

        let url = format!("{}/chat/completions", self.base_url);
        let payload = json!({
            "model": config.model,
            "messages": messages,
            "temperature": config.temperature,
            "max_tokens": config.max_tokens,
            "stream": false,
        });

        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
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
        parse_completion(&response_json)
    }
}

fn parse_completion(response: &Value) -> Result<AiProviderResponse, AiError> {
    let message = &response["choices"][0]["message"];
    let content = message["content"]
        .as_str()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or(AiError::EmptyResponse)?
        .to_string();

    // Some compatible servers return reasoning separately.
    let thinking = message["reasoning_content"]
        .as_str()
        .or_else(|| message["reasoning"].as_str())
        .map(str::to_string);

    Ok(AiProviderResponse { content, thinking })
}
