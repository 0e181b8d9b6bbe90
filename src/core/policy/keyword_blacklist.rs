// Keyword blacklist: plain substring rules, first match in stored order wins.

use super::cached_section::CachedSection;
use crate::core::config::{ConfigError, ConfigStore, PolicyConfig};
use std::sync::Arc;

fn parse_rules(config: &PolicyConfig) -> Vec<String> {
    config
        .black_rules
        .iter()
        .filter(|rule| !rule.is_empty())
        .cloned()
        .collect()
}

pub struct KeywordBlacklist {
    section: CachedSection<Vec<String>>,
}

impl KeywordBlacklist {
    pub fn new(store: Arc<ConfigStore>) -> Self {
        Self {
            section: CachedSection::new("black_rules", store, parse_rules),
        }
    }

    /// The first rule contained in `text`, if any.
    pub fn check(&self, text: &str) -> Option<String> {
        self.section
            .current()
            .iter()
            .find(|rule| text.contains(rule.as_str()))
            .cloned()
    }

    pub fn rules(&self) -> Vec<String> {
        self.section.current().as_ref().clone()
    }

    /// Returns `false` if the rule was blank or already present.
    pub fn add_rule(&self, rule: &str) -> Result<bool, ConfigError> {
        let rule = rule.trim();
        if rule.is_empty() || self.section.current().iter().any(|r| r == rule) {
            return Ok(false);
        }
        self.section.update(|config| {
            if !config.black_rules.iter().any(|r| r == rule) {
                config.black_rules.push(rule.to_string());
            }
        })?;
        Ok(true)
    }

    pub fn remove_rule(&self, rule: &str) -> Result<bool, ConfigError> {
        let rule = rule.trim();
        if !self.section.current().iter().any(|r| r == rule) {
            return Ok(false);
        }
        self.section
            .update(|config| config.black_rules.retain(|r| r != rule))?;
        Ok(true)
    }
}
