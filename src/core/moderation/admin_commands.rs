// Admin commands typed into a monitored group.
//
// A configured admin can inspect and edit the policy lists without touching
// the config file:
//
//   /guard status
//   /guard check <domain or ip>
//   /guard <list> [show]
//   /guard <list> add|remove <value>
//
// where <list> is one of members, shares, monitor, keywords, websites, admins.
// Edits go through the checkers, so they are saved and picked up at once.
// The reply goes back to the group the command came from.

use super::admin_notifier::AdminNotifier;
use super::chat_backend::ChatBackend;
use crate::core::config::ConfigError;
use crate::core::policy::{MonitorGroups, PolicyEngine, PolicyError};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

pub const COMMAND_PREFIX: &str = "/guard";

const HELP: &str = "/guard status | /guard check <domain or ip> | \
/guard <list> [show] | /guard <list> add|remove <value> \
(lists: members, shares, monitor, keywords, websites, admins)";

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Unknown command: {0}")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("Not a valid id: {0}")]
    InvalidId(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Policy(#[from] PolicyError),
}

// ============================================================================
// COMMANDS
// ============================================================================

/// Policy list an admin command can show or edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminList {
    Members,
    ShareGroups,
    Monitor,
    Keywords,
    Websites,
    Admins,
}

impl AdminList {
    fn as_str(&self) -> &'static str {
        match self {
            AdminList::Members => "members",
            AdminList::ShareGroups => "shares",
            AdminList::Monitor => "monitor",
            AdminList::Keywords => "keywords",
            AdminList::Websites => "websites",
            AdminList::Admins => "admins",
        }
    }
}

impl FromStr for AdminList {
    type Err = CommandError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "members" => Ok(AdminList::Members),
            "shares" => Ok(AdminList::ShareGroups),
            "monitor" => Ok(AdminList::Monitor),
            "keywords" => Ok(AdminList::Keywords),
            "websites" => Ok(AdminList::Websites),
            "admins" => Ok(AdminList::Admins),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

impl fmt::Display for AdminList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListEdit {
    Add,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    Help,
    Status,
    Check(String),
    Show(AdminList),
    Edit {
        list: AdminList,
        edit: ListEdit,
        value: String,
    },
}

impl AdminCommand {
    /// `None` when `text` is not a command at all.
    pub fn parse(text: &str) -> Option<Result<Self, CommandError>> {
        let rest = text.trim().strip_prefix(COMMAND_PREFIX)?;
        if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
            return None;
        }
        Some(Self::parse_args(rest.trim()))
    }

    fn parse_args(args: &str) -> Result<Self, CommandError> {
        let (head, rest) = split_word(args);
        match head {
            "" | "help" => Ok(AdminCommand::Help),
            "status" => Ok(AdminCommand::Status),
            "check" if rest.is_empty() => Err(CommandError::Usage("/guard check <domain or ip>")),
            "check" => Ok(AdminCommand::Check(rest.to_string())),
            _ => {
                let list: AdminList = head.parse()?;
                let (verb, value) = split_word(rest);
                let edit = match verb {
                    "" | "show" => return Ok(AdminCommand::Show(list)),
                    "add" => ListEdit::Add,
                    "remove" => ListEdit::Remove,
                    other => return Err(CommandError::Unknown(other.to_string())),
                };
                if value.is_empty() {
                    return Err(CommandError::Usage("/guard <list> add|remove <value>"));
                }
                Ok(AdminCommand::Edit {
                    list,
                    edit,
                    value: value.to_string(),
                })
            }
        }
    }
}

/// First word and the trimmed remainder.
fn split_word(text: &str) -> (&str, &str) {
    match text.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (text, ""),
    }
}

fn parse_id(value: &str) -> Result<u64, CommandError> {
    value
        .parse()
        .map_err(|_| CommandError::InvalidId(value.to_string()))
}

fn join_ids(ids: Vec<u64>) -> Vec<String> {
    ids.into_iter().map(|id| id.to_string()).collect()
}

// ============================================================================
// HANDLER
// ============================================================================

pub struct AdminCommands {
    policy: Arc<PolicyEngine>,
    monitor: Arc<MonitorGroups>,
    notifier: Arc<AdminNotifier>,
    backend: Arc<dyn ChatBackend>,
}

impl AdminCommands {
    pub fn new(
        policy: Arc<PolicyEngine>,
        monitor: Arc<MonitorGroups>,
        notifier: Arc<AdminNotifier>,
        backend: Arc<dyn ChatBackend>,
    ) -> Self {
        Self {
            policy,
            monitor,
            notifier,
            backend,
        }
    }

    /// Run `text` as a command if it is one and `user_id` is an admin, then
    /// reply in `group_id`. Returns `false` when the message is not a command
    /// for us and should be moderated as usual.
    pub async fn try_handle(&self, group_id: u64, user_id: u64, text: &str) -> bool {
        let Some(parsed) = AdminCommand::parse(text) else {
            return false;
        };
        if !self.notifier.is_admin(user_id) {
            return false;
        }

        let result = parsed.and_then(|command| {
            tracing::info!(target: "audit", user_id, group_id, command = ?command, "Admin command");
            self.execute(&command)
        });
        let reply = match result {
            Ok(reply) => reply,
            Err(e) => {
                tracing::debug!(user_id, group_id, "Admin command rejected: {}", e);
                format!("Error: {}", e)
            }
        };

        if let Err(e) = self.backend.send_group_message(group_id, &reply).await {
            tracing::warn!(group_id, "Failed to reply to admin command: {}", e);
        }
        true
    }

    pub fn execute(&self, command: &AdminCommand) -> Result<String, CommandError> {
        match command {
            AdminCommand::Help => Ok(HELP.to_string()),
            AdminCommand::Status => Ok(self.status()),
            AdminCommand::Check(target) => {
                let verdict = if self.policy.websites.is_target_whitelisted(target) {
                    "is"
                } else {
                    "is not"
                };
                Ok(format!("{} {} whitelisted", target, verdict))
            }
            AdminCommand::Show(list) => Ok(self.show(*list)),
            AdminCommand::Edit { list, edit, value } => self.edit(*list, *edit, value),
        }
    }

    fn status(&self) -> String {
        let websites = self.policy.websites.summary();
        format!(
            "Monitoring {} groups. Whitelisted: {} members, {} share groups. {} keyword rules. \
             Websites: {} domains, {} IP blocks, {} IP ranges, {} subdomain patterns, {} TLD patterns. \
             {} admins.",
            self.monitor.groups().len(),
            self.policy.members.members().len(),
            self.policy.group_shares.groups().len(),
            self.policy.keywords.rules().len(),
            websites.domains.len(),
            websites.ip_blocks.len(),
            websites.ip_ranges.len(),
            websites.subdomain_patterns.len(),
            websites.tld_patterns.len(),
            self.notifier.admins().len(),
        )
    }

    fn show(&self, list: AdminList) -> String {
        let items = match list {
            AdminList::Members => join_ids(self.policy.members.members()),
            AdminList::ShareGroups => join_ids(self.policy.group_shares.groups()),
            AdminList::Monitor => join_ids(self.monitor.groups()),
            AdminList::Keywords => self.policy.keywords.rules(),
            AdminList::Websites => self
                .policy
                .websites
                .entries()
                .iter()
                .map(ToString::to_string)
                .collect(),
            AdminList::Admins => join_ids(self.notifier.admins()),
        };

        if items.is_empty() {
            format!("{}: (empty)", list)
        } else {
            format!("{}: {}", list, items.join(", "))
        }
    }

    fn edit(&self, list: AdminList, edit: ListEdit, value: &str) -> Result<String, CommandError> {
        let changed = match (list, edit) {
            (AdminList::Members, ListEdit::Add) => {
                self.policy.members.add_member(parse_id(value)?)?;
                true
            }
            (AdminList::Members, ListEdit::Remove) => {
                self.policy.members.remove_member(parse_id(value)?)?;
                true
            }
            (AdminList::ShareGroups, ListEdit::Add) => {
                self.policy.group_shares.add_group(parse_id(value)?)?;
                true
            }
            (AdminList::ShareGroups, ListEdit::Remove) => {
                self.policy.group_shares.remove_group(parse_id(value)?)?;
                true
            }
            (AdminList::Monitor, ListEdit::Add) => {
                self.monitor.add_group(parse_id(value)?)?;
                true
            }
            (AdminList::Monitor, ListEdit::Remove) => {
                self.monitor.remove_group(parse_id(value)?)?;
                true
            }
            (AdminList::Keywords, ListEdit::Add) => self.policy.keywords.add_rule(value)?,
            (AdminList::Keywords, ListEdit::Remove) => self.policy.keywords.remove_rule(value)?,
            (AdminList::Websites, ListEdit::Add) => self.policy.websites.add_entry(value)?,
            (AdminList::Websites, ListEdit::Remove) => self.policy.websites.remove_entry(value)?,
            (AdminList::Admins, ListEdit::Add) => {
                self.notifier.add_admin(parse_id(value)?)?;
                true
            }
            (AdminList::Admins, ListEdit::Remove) => {
                self.notifier.remove_admin(parse_id(value)?)?;
                true
            }
        };

        Ok(match (changed, edit) {
            (false, _) => format!("No change to {}", list),
            (true, ListEdit::Add) => format!("Added {} to {}", value, list),
            (true, ListEdit::Remove) => format!("Removed {} from {}", value, list),
        })
    }
}
