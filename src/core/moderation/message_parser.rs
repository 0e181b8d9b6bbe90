// Flattens structured chat messages into the plain text every text rule runs on.

use super::chat_backend::ChatBackend;
use super::moderation_models::{RawMessage, Segment};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Forwards nested deeper than this are not fetched.
pub const MAX_FORWARD_DEPTH: usize = 5;

static BRACKET_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[.*?\]").expect("valid regex"));

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub struct MessageParser {
    backend: Arc<dyn ChatBackend>,
}

impl MessageParser {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self { backend }
    }

    pub async fn flatten(&self, message: &RawMessage) -> String {
        match message {
            RawMessage::Text(text) => text.trim().to_string(),
            RawMessage::Segments(segments) => {
                let mut parts = Vec::new();
                for segment in segments {
                    match segment.kind.as_str() {
                        "text" => parts.extend(segment.field("text")),
                        "forward" => {
                            let content = self.forward_text(segment, 1).await;
                            if !content.is_empty() {
                                parts.push(format!("[Forwarded: {}]", content));
                            }
                        }
                        "json" => {
                            let content = segment
                                .field("data")
                                .map(|card| json_visible_content(&card))
                                .unwrap_or_default();
                            if !content.is_empty() {
                                parts.push(format!("[Shared: {}]", content));
                            }
                        }
                        _ => {}
                    }
                }
                parts.concat().trim().to_string()
            }
        }
    }

    /// Text of every message in a forward bundle, nested forwards inlined.
    fn forward_text<'a>(&'a self, segment: &'a Segment, depth: usize) -> BoxFuture<'a, String> {
        Box::pin(async move {
            if depth > MAX_FORWARD_DEPTH {
                return String::new();
            }
            let Some(forward_id) = segment.field("id") else {
                return String::new();
            };

            let messages = match self.backend.get_forward_messages(&forward_id).await {
                Ok(messages) => messages,
                Err(e) => {
                    tracing::warn!(forward_id = %forward_id, "Failed to fetch forwarded messages: {}", e);
                    return String::new();
                }
            };

            let mut texts = Vec::new();
            for message in &messages {
                let text = match message {
                    RawMessage::Text(text) => text.clone(),
                    RawMessage::Segments(segments) => {
                        let mut text = String::new();
                        for inner in segments {
                            match inner.kind.as_str() {
                                "text" => text.push_str(&inner.field("text").unwrap_or_default()),
                                "forward" => text.push_str(&self.forward_text(inner, depth + 1).await),
                                _ => {}
                            }
                        }
                        text
                    }
                };
                let text = text.trim();
                if !text.is_empty() {
                    texts.push(text.to_string());
                }
            }
            texts.join(" ")
        })
    }
}

/// What a user actually sees on a JSON card: the prompt without bracketed
/// tags, plus titles, descriptions and host nicknames from `meta`. A card
/// that isn't JSON is returned as-is.
pub fn json_visible_content(card: &str) -> String {
    let data: Value = match serde_json::from_str(card) {
        Ok(data) => data,
        Err(e) => {
            tracing::debug!("Card is not JSON, using raw text: {}", e);
            return card.to_string();
        }
    };

    let mut parts = Vec::new();
    if let Some(prompt) = data["prompt"].as_str() {
        let prompt = BRACKET_TAG_RE.replace_all(prompt, "");
        let prompt = prompt.trim();
        if !prompt.is_empty() {
            parts.push(prompt.to_string());
        }
    }

    if let Some(meta) = data["meta"].as_object() {
        for value in meta.values().filter(|v| v.is_object()) {
            for text in [&value["title"], &value["desc"], &value["host"]["nick"]] {
                if let Some(text) = text.as_str().filter(|t| !t.is_empty()) {
                    parts.push(text.to_string());
                }
            }
        }
    }

    parts.join(" ")
}
