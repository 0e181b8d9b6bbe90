// Group-recommendation share cards.
//
// A "recommend a group" card is a JSON segment. We pull the target group id out
// of it and only let the share through when that group is whitelisted.

use super::cached_section::CachedSection;
use crate::core::config::{ConfigError, ConfigStore, PolicyConfig};
use crate::core::moderation::Segment;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

/// Text the chat client embeds in every group recommendation card.
pub const GROUP_SHARE_MARKER: &str = "推荐群聊";

static UIN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"uin=([0-9]+)").expect("valid regex"));

/// Result of inspecting a message for group shares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupShareCheck {
    pub is_share: bool,
    /// `true` for non-share messages.
    pub whitelisted: bool,
    pub group_id: Option<u64>,
}

impl GroupShareCheck {
    fn not_a_share() -> Self {
        Self {
            is_share: false,
            whitelisted: true,
            group_id: None,
        }
    }

    pub fn is_violation(&self) -> bool {
        self.is_share && !self.whitelisted
    }
}

fn parse_groups(config: &PolicyConfig) -> HashSet<u64> {
    config.white_groups.iter().copied().collect()
}

pub struct GroupShareWhitelist {
    section: CachedSection<HashSet<u64>>,
}

impl GroupShareWhitelist {
    pub fn new(store: Arc<ConfigStore>) -> Self {
        Self {
            section: CachedSection::new("white_groups", store, parse_groups),
        }
    }

    /// Inspect the first group-recommendation card in `segments`.
    ///
    /// A card whose target can't be resolved counts as a share that is not
    /// whitelisted.
    pub fn check(&self, segments: &[Segment]) -> GroupShareCheck {
        let card = segments
            .iter()
            .filter(|segment| segment.kind == "json")
            .filter_map(|segment| segment.field("data"))
            .find(|card| card.contains(GROUP_SHARE_MARKER));

        let Some(card) = card else {
            return GroupShareCheck::not_a_share();
        };

        let group_id = extract_group_id(&card);
        let whitelisted = match group_id {
            Some(id) => self.is_whitelisted(id),
            None => {
                tracing::warn!("Group share card without a resolvable group id");
                false
            }
        };

        GroupShareCheck {
            is_share: true,
            whitelisted,
            group_id,
        }
    }

    pub fn is_whitelisted(&self, group_id: u64) -> bool {
        self.section.current().contains(&group_id)
    }

    pub fn groups(&self) -> Vec<u64> {
        let mut groups: Vec<u64> = self.section.current().iter().copied().collect();
        groups.sort_unstable();
        groups
    }

    pub fn add_group(&self, group_id: u64) -> Result<(), ConfigError> {
        self.section.update(|config| {
            config.white_groups.push(group_id);
            config.white_groups.sort_unstable();
            config.white_groups.dedup();
        })?;
        Ok(())
    }

    pub fn remove_group(&self, group_id: u64) -> Result<(), ConfigError> {
        self.section
            .update(|config| config.white_groups.retain(|id| *id != group_id))?;
        Ok(())
    }
}

/// Target group of a share card.
///
/// Tries `meta.contact.jumpUrl` (`...uin=<id>...`) first, then the `param`
/// query value of `meta.contact.pcJumpUrl`, which is percent-encoded base64
/// JSON carrying `groupUin`.
pub fn extract_group_id(card: &str) -> Option<u64> {
    let card: Value = match serde_json::from_str(card) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("Malformed share card JSON: {}", e);
            return None;
        }
    };
    let contact = &card["meta"]["contact"];

    if let Some(jump_url) = contact["jumpUrl"].as_str() {
        let id = UIN_RE
            .captures(jump_url)
            .and_then(|caps| caps[1].parse::<u64>().ok());
        if id.is_some() {
            return id;
        }
    }

    contact["pcJumpUrl"].as_str().and_then(decode_pc_jump_param)
}

fn decode_pc_jump_param(pc_jump_url: &str) -> Option<u64> {
    let query = pc_jump_url
        .split_once('?')
        .map(|(_, query)| query)
        .unwrap_or(pc_jump_url);

    let (_, param) = url::form_urlencoded::parse(query.as_bytes()).find(|(key, _)| key == "param")?;
    // Form decoding turns a literal '+' into a space; base64 never has spaces.
    let param = param.replace(' ', "+");

    let bytes = STANDARD.decode(param.trim()).ok()?;
    let decoded: Value = serde_json::from_slice(&bytes).ok()?;

    let id = match &decoded["groupUin"] {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    id.filter(|id| *id != 0)
}
