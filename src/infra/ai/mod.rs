pub mod ollama_client;
pub mod openai_client;

pub use ollama_client::OllamaClient;
pub use openai_client::OpenAiClient;

use crate::core::ai::{AiConfig, AiError, AiProvider};
use crate::core::config::AiSettings;
use std::time::Duration;

/// Build the configured provider and its request settings.
///
/// `ollama` selects the local server; anything else means an OpenAI-compatible API.
pub fn create_provider(settings: &AiSettings) -> Result<(Box<dyn AiProvider>, AiConfig), AiError> {
    let timeout = Duration::from_secs(settings.request_timeout_secs.max(1));

    if settings.provider.trim().eq_ignore_ascii_case("ollama") {
        let ollama = &settings.ollama;
        tracing::info!(model = %ollama.model_name, url = %ollama.base_url, "Using Ollama provider");
        let client = OllamaClient::new(&ollama.base_url, timeout)?;
        let config = AiConfig {
            model: ollama.model_name.clone(),
            temperature: 0.7,
            max_tokens: None,
            reasoning_enabled: Some(ollama.thinking_enabled),
        };
        return Ok((Box::new(client), config));
    }

    let openai = &settings.openai;
    let api_key = std::env::var(&openai.api_key_env).unwrap_or_default();
    if api_key.is_empty() {
        tracing::error!(env = %openai.api_key_env, "AI API key is not set; AI judgments will fail open");
    }
    tracing::info!(model = %openai.model_name, url = %openai.api_base_url, "Using OpenAI-compatible provider");
    let client = OpenAiClient::new(&openai.api_base_url, api_key, timeout)?;
    let config = AiConfig {
        model: openai.model_name.clone(),
        temperature: 0.7,
        max_tokens: Some(2000),
        reasoning_enabled: None,
    };
    Ok((Box::new(client), config))
}
