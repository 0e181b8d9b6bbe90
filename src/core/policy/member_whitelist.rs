// Trusted senders. A whitelisted member bypasses every later rule.

use super::cached_section::CachedSection;
use crate::core::config::{ConfigError, ConfigStore, PolicyConfig};
use std::collections::HashSet;
use std::sync::Arc;

fn parse_members(config: &PolicyConfig) -> HashSet<u64> {
    config.white_members.iter().copied().collect()
}

pub struct MemberWhitelist {
    section: CachedSection<HashSet<u64>>,
}

impl MemberWhitelist {
    pub fn new(store: Arc<ConfigStore>) -> Self {
        Self {
            section: CachedSection::new("white_members", store, parse_members),
        }
    }

    pub fn is_whitelisted(&self, user_id: u64) -> bool {
        self.section.current().contains(&user_id)
    }

    /// All whitelisted members, sorted.
    pub fn members(&self) -> Vec<u64> {
        let mut members: Vec<u64> = self.section.current().iter().copied().collect();
        members.sort_unstable();
        members
    }

    pub fn add_member(&self, user_id: u64) -> Result<(), ConfigError> {
        self.section.update(|config| {
            config.white_members.push(user_id);
            config.white_members.sort_unstable();
            config.white_members.dedup();
        })?;
        Ok(())
    }

    pub fn remove_member(&self, user_id: u64) -> Result<(), ConfigError> {
        self.section
            .update(|config| config.white_members.retain(|id| *id != user_id))?;
        Ok(())
    }

    #[cfg(test)]
    pub fn cached_version(&self) -> u64 {
        self.section.cached_version()
    }
}
