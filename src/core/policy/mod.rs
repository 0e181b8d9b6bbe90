// Policy rule checkers. Each one caches a parsed view of its own config
// section and only re-parses when the store's version moves.

pub mod cached_section;
pub mod group_share_whitelist;
pub mod keyword_blacklist;
pub mod member_whitelist;
pub mod monitor_groups;
pub mod website_whitelist;

pub use group_share_whitelist::{GroupShareCheck, GroupShareWhitelist};
pub use keyword_blacklist::KeywordBlacklist;
pub use member_whitelist::MemberWhitelist;
pub use monitor_groups::MonitorGroups;
pub use website_whitelist::{WebsiteCheck, WebsiteWhitelistMatcher, WhitelistParseError};

use crate::core::config::{ConfigError, ConfigStore};
use crate::core::moderation::Segment;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid whitelist entry: {0}")]
    InvalidEntry(#[from] WhitelistParseError),
}

/// The synchronous checks the pipeline runs, in pipeline order.
pub trait PolicyRules: Send + Sync {
    fn is_member_whitelisted(&self, user_id: u64) -> bool;

    fn check_group_share(&self, segments: &[Segment]) -> GroupShareCheck;

    fn check_websites(&self, text: &str) -> WebsiteCheck;

    /// First matching blacklist rule, if any.
    fn check_keywords(&self, text: &str) -> Option<String>;
}

/// All checkers over one store.
#[derive(Clone)]
pub struct PolicyEngine {
    pub members: Arc<MemberWhitelist>,
    pub group_shares: Arc<GroupShareWhitelist>,
    pub websites: Arc<WebsiteWhitelistMatcher>,
    pub keywords: Arc<KeywordBlacklist>,
}

impl PolicyEngine {
    pub fn new(store: Arc<ConfigStore>) -> Self {
        Self {
            members: Arc::new(MemberWhitelist::new(Arc::clone(&store))),
            group_shares: Arc::new(GroupShareWhitelist::new(Arc::clone(&store))),
            websites: Arc::new(WebsiteWhitelistMatcher::new(Arc::clone(&store))),
            keywords: Arc::new(KeywordBlacklist::new(store)),
        }
    }
}

impl PolicyRules for PolicyEngine {
    fn is_member_whitelisted(&self, user_id: u64) -> bool {
        self.members.is_whitelisted(user_id)
    }

    fn check_group_share(&self, segments: &[Segment]) -> GroupShareCheck {
        self.group_shares.check(segments)
    }

    fn check_websites(&self, text: &str) -> WebsiteCheck {
        self.websites.check(text)
    }

    fn check_keywords(&self, text: &str) -> Option<String> {
        self.keywords.check(text)
    }
}
