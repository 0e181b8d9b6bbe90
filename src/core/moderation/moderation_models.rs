// Moderation domain models - data structures shared by the pipeline, the AI
// queue and the chat-backend adapters.
//
// These are pure domain types. Adapters convert wire payloads into them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// INBOUND MESSAGES
// ============================================================================

/// One element of a structured chat message: `{type, data: {...}}`.
///
/// Kept as a loose struct because the backend sends many segment types we
/// don't care about and their `data` shapes vary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Segment {
    #[cfg(test)]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            data: serde_json::json!({ "text": text.into() }),
        }
    }

    #[cfg(test)]
    pub fn forward(id: impl Into<String>) -> Self {
        Self {
            kind: "forward".to_string(),
            data: serde_json::json!({ "id": id.into() }),
        }
    }

    #[cfg(test)]
    pub fn json(card: impl Into<String>) -> Self {
        Self {
            kind: "json".to_string(),
            data: serde_json::json!({ "data": card.into() }),
        }
    }

    /// String field from `data`, treating numbers as strings (forward ids
    /// arrive as either).
    pub fn field(&self, key: &str) -> Option<String> {
        match self.data.get(key)? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Message body as delivered: either a plain string or a segment list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawMessage {
    Text(String),
    Segments(Vec<Segment>),
}

impl Default for RawMessage {
    fn default() -> Self {
        RawMessage::Text(String::new())
    }
}

impl RawMessage {
    pub fn is_empty(&self) -> bool {
        match self {
            RawMessage::Text(text) => text.is_empty(),
            RawMessage::Segments(segments) => segments.is_empty(),
        }
    }

    /// Typed text only: the string itself, or the `text` segments joined.
    pub fn plain_text(&self) -> String {
        match self {
            RawMessage::Text(text) => text.clone(),
            RawMessage::Segments(segments) => segments
                .iter()
                .filter(|segment| segment.kind == "text")
                .filter_map(|segment| segment.field("text"))
                .collect(),
        }
    }

    /// Segments of a structured message; a plain string has none.
    pub fn segments(&self) -> &[Segment] {
        match self {
            RawMessage::Text(_) => &[],
            RawMessage::Segments(segments) => segments,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventSender {
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub card: Option<String>,
}

/// Event as received from the chat backend (pushed or polled).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    #[serde(default)]
    pub post_type: Option<String>,
    #[serde(default)]
    pub message_type: Option<String>,
    #[serde(default)]
    pub user_id: Option<u64>,
    #[serde(default)]
    pub group_id: Option<u64>,
    #[serde(default)]
    pub message_id: Option<i64>,
    #[serde(default)]
    pub message: RawMessage,
    /// Unix seconds.
    #[serde(default)]
    pub time: i64,
    #[serde(default)]
    pub sender: Option<EventSender>,
}

impl InboundEvent {
    /// Group card first, then nickname, ignoring blanks.
    pub fn sender_name(&self) -> Option<String> {
        let sender = self.sender.as_ref()?;
        [sender.card.as_deref(), sender.nickname.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|name| !name.is_empty())
            .map(str::to_string)
    }
}

/// A message ready for rule evaluation. Immutable once built.
#[derive(Debug, Clone)]
pub struct Message {
    pub user_id: u64,
    pub group_id: u64,
    pub message_id: i64,
    pub username: String,
    pub raw: RawMessage,
    /// Flattened plain text used by every text rule.
    pub parsed_text: String,
    pub received_at: DateTime<Utc>,
}

// ============================================================================
// VERDICTS
// ============================================================================

/// Which rule produced a violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationType {
    GroupShare,
    Website,
    Blacklist,
    Ai,
}

impl ViolationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationType::GroupShare => "group_share",
            ViolationType::Website => "website",
            ViolationType::Blacklist => "blacklist",
            ViolationType::Ai => "ai",
        }
    }

    /// Cause as worded in operator notifications.
    pub fn describe(&self) -> &'static str {
        match self {
            ViolationType::GroupShare => "for sharing a non-whitelisted group",
            ViolationType::Website => "for linking a non-whitelisted website",
            ViolationType::Blacklist => "for a blacklisted keyword",
            ViolationType::Ai => "after AI review",
        }
    }

    /// Notification action: `recalled <cause>`, or `flagged <cause> (recall
    /// failed)` when the message is still up.
    pub fn action(&self, recalled: bool) -> String {
        if recalled {
            format!("recalled {}", self.describe())
        } else {
            format!("flagged {} (recall failed)", self.describe())
        }
    }
}

impl std::fmt::Display for ViolationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub kind: ViolationType,
    pub reason: String,
}

impl Violation {
    pub fn new(kind: ViolationType, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }
}

/// The pipeline's decision for one message.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Nothing to evaluate (empty text). No action, no log.
    Ignored,
    /// Sender is a trusted member; every later stage was skipped.
    Whitelisted,
    Violation(Violation),
    /// All synchronous stages passed; hand off to the AI queue.
    Deferred,
}

/// Outcome of a detected violation. Created once, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct ViolationRecord {
    pub user_id: u64,
    pub group_id: u64,
    pub message_id: i64,
    pub violation_type: ViolationType,
    pub reason: String,
    pub recalled: bool,
}

/// A message waiting for AI judgment.
#[derive(Debug, Clone)]
pub struct AiTask {
    pub user_id: u64,
    pub username: String,
    pub group_id: u64,
    pub message_id: i64,
    pub parsed_text: String,
    pub enqueued_at: DateTime<Utc>,
}

impl AiTask {
    pub fn from_message(message: &Message) -> Self {
        Self {
            user_id: message.user_id,
            username: message.username.clone(),
            group_id: message.group_id,
            message_id: message.message_id,
            parsed_text: message.parsed_text.clone(),
            enqueued_at: Utc::now(),
        }
    }

    /// Text handed to the judgment backend.
    pub fn formatted_text(&self) -> String {
        format!("User {} sent: {}", self.user_id, self.parsed_text)
    }
}
