// Policy configuration model - the human-editable YAML document.
//
// Every section is optional in the file; missing sections fall back to their
// defaults so a half-written config still loads.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;

/// The whole configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    #[serde(deserialize_with = "lenient_ids")]
    pub monitor_groups: Vec<u64>,
    #[serde(deserialize_with = "lenient_ids")]
    pub white_members: Vec<u64>,
    #[serde(deserialize_with = "lenient_ids")]
    pub white_groups: Vec<u64>,
    #[serde(deserialize_with = "lenient_strings")]
    pub black_rules: Vec<String>,
    #[serde(deserialize_with = "lenient_strings")]
    pub website_whitelist: Vec<String>,
    #[serde(deserialize_with = "lenient_ids")]
    pub admins: Vec<u64>,

    pub bot: BotSettings,
    pub ai: AiSettings,
    pub report: ReportSettings,
    pub workers: WorkerSettings,

    /// Sections we don't model are kept so `save` never drops them.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// Connection settings for the OneBot HTTP API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotSettings {
    pub http_url: String,
    pub token: String,
    pub polling_interval_secs: u64,
    pub history_count: u32,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            http_url: "http://127.0.0.1:3000".to_string(),
            token: String::new(),
            polling_interval_secs: 1,
            history_count: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiSettings {
    /// `openai` or `ollama`
    pub provider: String,
    pub max_history: usize,
    pub request_timeout_secs: u64,
    pub prompt_dir: Option<String>,
    pub prompt_file: Option<String>,
    pub openai: OpenAiSettings,
    pub ollama: OllamaSettings,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            max_history: 30,
            request_timeout_secs: 600,
            prompt_dir: None,
            prompt_file: None,
            openai: OpenAiSettings::default(),
            ollama: OllamaSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiSettings {
    pub api_base_url: String,
    pub model_name: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.openai.com/v1".to_string(),
            model_name: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaSettings {
    pub base_url: String,
    pub model_name: String,
    pub thinking_enabled: bool,
}

impl Default for OllamaSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:11434".to_string(),
            model_name: "qwen2.5".to_string(),
            thinking_enabled: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSettings {
    pub ranking_interval_secs: u64,
    pub ranking_top_n: usize,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            ranking_interval_secs: 3600,
            ranking_top_n: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    pub max_concurrent_messages: usize,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            max_concurrent_messages: 16,
        }
    }
}

/// An immutable, versioned view of the configuration.
///
/// The store swaps whole snapshots; nothing ever mutates one in place, so two
/// readers holding the same `version` always see identical sections.
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    pub version: u64,
    /// Modification time of the backing source when this snapshot was read.
    pub modified: Option<SystemTime>,
    pub config: Arc<PolicyConfig>,
}

// ============================================================================
// LENIENT LIST PARSING
// ============================================================================
// Hand-edited files end up with quoted ids and stray entries. A bad entry is
// dropped on its own instead of failing the whole document.

#[derive(Deserialize)]
#[serde(untagged)]
enum IdEntry {
    Number(u64),
    Text(String),
    Other(serde::de::IgnoredAny),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TextEntry {
    Text(String),
    Number(i64),
    Other(serde::de::IgnoredAny),
}

fn lenient_ids<'de, D>(deserializer: D) -> Result<Vec<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries: Option<Vec<IdEntry>> = Option::deserialize(deserializer)?;
    Ok(entries
        .unwrap_or_default()
        .into_iter()
        .filter_map(|entry| match entry {
            IdEntry::Number(id) => Some(id),
            IdEntry::Text(text) => {
                let parsed = text.trim().parse::<u64>().ok();
                if parsed.is_none() {
                    tracing::warn!(entry = %text, "Skipping non-numeric id in config");
                }
                parsed
            }
            IdEntry::Other(_) => None,
        })
        .collect())
}

fn lenient_strings<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries: Option<Vec<TextEntry>> = Option::deserialize(deserializer)?;
    Ok(entries
        .unwrap_or_default()
        .into_iter()
        .filter_map(|entry| match entry {
            TextEntry::Text(text) => Some(text),
            TextEntry::Number(n) => Some(n.to_string()),
            TextEntry::Other(_) => None,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_sections_fall_back_to_defaults() {
        let config: PolicyConfig = serde_yaml::from_str("admins: [1]\n").unwrap();
        assert_eq!(config.admins, vec![1]);
        assert!(config.white_members.is_empty());
        assert_eq!(config.bot.polling_interval_secs, 1);
        assert_eq!(config.report.ranking_top_n, 10);
    }

    #[test]
    fn test_ids_accept_digit_strings_and_skip_garbage() {
        let yaml = "white_members: [10001, \"10002\", \"abc\", [1]]\n";
        let config: PolicyConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.white_members, vec![10001, 10002]);
    }

    #[test]
    fn test_null_section_is_empty() {
        let config: PolicyConfig = serde_yaml::from_str("black_rules:\n").unwrap();
        assert!(config.black_rules.is_empty());
    }

    #[test]
    fn test_unknown_sections_survive_roundtrip() {
        let yaml = "admins: [1]\nweb_ui:\n  port: 8000\n";
        let config: PolicyConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.extra.contains_key("web_ui"));

        let text = serde_yaml::to_string(&config).unwrap();
        let again: PolicyConfig = serde_yaml::from_str(&text).unwrap();
        assert_eq!(again, config);
    }
}
