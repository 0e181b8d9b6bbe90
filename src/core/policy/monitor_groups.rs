// Groups we moderate. Events from anywhere else are dropped on arrival.

use super::cached_section::CachedSection;
use crate::core::config::{ConfigError, ConfigStore, PolicyConfig};
use std::sync::Arc;

fn parse_groups(config: &PolicyConfig) -> Vec<u64> {
    config.monitor_groups.clone()
}

pub struct MonitorGroups {
    section: CachedSection<Vec<u64>>,
}

impl MonitorGroups {
    pub fn new(store: Arc<ConfigStore>) -> Self {
        Self {
            section: CachedSection::new("monitor_groups", store, parse_groups),
        }
    }

    pub fn is_monitored(&self, group_id: u64) -> bool {
        self.section.current().contains(&group_id)
    }

    pub fn groups(&self) -> Vec<u64> {
        self.section.current().as_ref().clone()
    }

    pub fn add_group(&self, group_id: u64) -> Result<(), ConfigError> {
        self.section.update(|config| {
            if !config.monitor_groups.contains(&group_id) {
                config.monitor_groups.push(group_id);
            }
        })?;
        Ok(())
    }

    pub fn remove_group(&self, group_id: u64) -> Result<(), ConfigError> {
        self.section
            .update(|config| config.monitor_groups.retain(|id| *id != group_id))?;
        Ok(())
    }
}
