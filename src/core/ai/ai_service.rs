use super::models::{AiConfig, AiMessage, AiProviderResponse, ConversationTurn};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use thiserror::Error;

/// Remembered turns replayed with each new message.
pub const HISTORY_WINDOW: usize = 10;

static THINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("valid regex"));
static VERDICT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)```\s*(true|false)\s*```").expect("valid regex"));

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum AiError {
    #[error("AI request failed: {0}")]
    Http(String),

    #[error("AI API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("AI returned an empty response")]
    EmptyResponse,
}

// ============================================================================
// PROVIDER TRAIT (PORT)
// ============================================================================

#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Sends a chat completion request to the AI provider.
    ///
    /// Returns an `AiProviderResponse` containing both the main content
    /// and optional thinking/reasoning from the model.
    async fn chat_complete(
        &self,
        messages: &[AiMessage],
        config: &AiConfig,
    ) -> Result<AiProviderResponse, AiError>;
}

// Lets main pick the provider at runtime and still hand AiService one type.
#[async_trait]
impl AiProvider for Box<dyn AiProvider> {
    async fn chat_complete(
        &self,
        messages: &[AiMessage],
        config: &AiConfig,
    ) -> Result<AiProviderResponse, AiError> {
        (**self).chat_complete(messages, config).await
    }
}

/// Decides whether a formatted message violates policy.
#[async_trait]
pub trait AiJudge: Send + Sync {
    async fn judge(&self, text: &str) -> Result<bool, AiError>;
}

// ============================================================================
// SERVICE
// ============================================================================

pub struct AiService<P: AiProvider> {
    provider: P,
    system_prompt: String,
    config: AiConfig,
    max_history: usize,
    history: Mutex<Vec<ConversationTurn>>,
}

impl<P: AiProvider> AiService<P> {
    pub fn new(provider: P, system_prompt: String, config: AiConfig, max_history: usize) -> Self {
        Self {
            provider,
            system_prompt,
            config,
            max_history,
            history: Mutex::new(Vec::new()),
        }
    }

    /// Send one priming message so the first real judgment doesn't pay for
    /// model loading.
    pub async fn warm_up(&self) -> Result<(), AiError> {
        self.chat("ready").await.map(|_| ())
    }

    /// One exchange with the model. The reply (minus think blocks) is
    /// remembered for later requests.
    pub async fn chat(&self, message: &str) -> Result<String, AiError> {
        let messages = self.build_messages(message);
        let response = self.provider.chat_complete(&messages, &self.config).await?;
        if let Some(thinking) = response.thinking.as_deref().filter(|t| !t.is_empty()) {
            tracing::debug!(chars = thinking.chars().count(), "Model reasoning: {}", thinking);
        }

        let content = response.content.trim().to_string();
        if content.is_empty() {
            return Err(AiError::EmptyResponse);
        }

        self.remember(message, strip_think_tags(&content));
        Ok(content)
    }

    fn build_messages(&self, message: &str) -> Vec<AiMessage> {
        let history = self.history.lock();
        let start = history.len().saturating_sub(HISTORY_WINDOW);

        let mut messages = Vec::with_capacity(2 + 2 * (history.len() - start));
        messages.push(AiMessage::system(self.system_prompt.clone()));
        for turn in &history[start..] {
            messages.push(AiMessage::user(turn.user.clone()));
            messages.push(AiMessage::assistant(turn.assistant.clone()));
        }
        messages.push(AiMessage::user(message));
        messages
    }

    /// Keeps the very first turn plus the most recent ones, `max_history` in total.
    fn remember(&self, user: &str, assistant: String) {
        if self.max_history == 0 {
            return;
        }
        let mut history = self.history.lock();
        history.push(ConversationTurn {
            user: user.to_string(),
            assistant,
        });
        if history.len() > self.max_history {
            let excess = history.len() - self.max_history;
            history.drain(1..1 + excess);
        }
    }

    #[cfg(test)]
    pub fn history_len(&self) -> usize {
        self.history.lock().len()
    }
}

#[async_trait]
impl<P: AiProvider> AiJudge for AiService<P> {
    async fn judge(&self, text: &str) -> Result<bool, AiError> {
        if text.trim().is_empty() {
            return Ok(false);
        }
        let reply = self.chat(text).await?;
        Ok(parse_verdict(&reply))
    }
}

pub fn strip_think_tags(text: &str) -> String {
    THINK_RE.replace_all(text, "").trim().to_string()
}

/// `true` only for an explicit fenced ```` ```true``` ```` outside think blocks.
pub fn parse_verdict(reply: &str) -> bool {
    let cleaned = strip_think_tags(reply);
    VERDICT_RE
        .captures(&cleaned)
        .map(|caps| caps[1].eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}
