// Moderation service - core business logic for group message policing.
//
// This module handles:
// - Event intake (message filtering, monitored groups, sender names)
// - Admin commands, which are answered instead of moderated
// - The staged rule pipeline with its short-circuit order
// - Routing verdicts to immediate handling or the AI queue
//
// NO transport dependencies here - the chat backend is a port.

use super::admin_commands::AdminCommands;
use super::ai_queue::AiModerationQueue;
use super::chat_backend::ChatBackend;
use super::message_parser::MessageParser;
use super::moderation_models::{
    AiTask, InboundEvent, Message, Verdict, Violation, ViolationType,
};
use super::violation_handler::ViolationHandler;
use crate::core::config::ConfigStore;
use crate::core::policy::{MonitorGroups, PolicyRules};
use chrono::Utc;
use std::sync::Arc;

// ============================================================================
// PIPELINE
// ============================================================================

/// Pure, synchronous rule evaluation. Stages run in a fixed order and the
/// first decisive one wins:
/// member whitelist → (empty text) → group share → websites → blacklist → AI.
pub struct ModerationPipeline {
    rules: Arc<dyn PolicyRules>,
}

impl ModerationPipeline {
    pub fn new(rules: Arc<dyn PolicyRules>) -> Self {
        Self { rules }
    }

    pub fn evaluate(&self, message: &Message) -> Verdict {
        if self.rules.is_member_whitelisted(message.user_id) {
            return Verdict::Whitelisted;
        }

        if message.parsed_text.trim().is_empty() {
            return Verdict::Ignored;
        }

        let share = self.rules.check_group_share(message.raw.segments());
        if share.is_violation() {
            let reason = match share.group_id {
                Some(id) => id.to_string(),
                None => "unresolved group".to_string(),
            };
            return Verdict::Violation(Violation::new(ViolationType::GroupShare, reason));
        }

        let websites = self.rules.check_websites(&message.parsed_text);
        if !websites.passed {
            tracing::debug!(
                message_id = message.message_id,
                targets = ?websites.targets,
                "Website check failed"
            );
            return Verdict::Violation(Violation::new(
                ViolationType::Website,
                websites.unmatched.join(", "),
            ));
        }

        if let Some(rule) = self.rules.check_keywords(&message.parsed_text) {
            return Verdict::Violation(Violation::new(ViolationType::Blacklist, rule));
        }

        Verdict::Deferred
    }
}

// ============================================================================
// CORE SERVICE
// ============================================================================

pub struct ModerationService {
    store: Arc<ConfigStore>,
    monitor: Arc<MonitorGroups>,
    pipeline: ModerationPipeline,
    parser: MessageParser,
    backend: Arc<dyn ChatBackend>,
    handler: Arc<ViolationHandler>,
    queue: Arc<AiModerationQueue>,
    commands: Option<Arc<AdminCommands>>,
}

impl ModerationService {
    pub fn new(
        store: Arc<ConfigStore>,
        monitor: Arc<MonitorGroups>,
        rules: Arc<dyn PolicyRules>,
        backend: Arc<dyn ChatBackend>,
        handler: Arc<ViolationHandler>,
        queue: Arc<AiModerationQueue>,
    ) -> Self {
        Self {
            store,
            monitor,
            pipeline: ModerationPipeline::new(rules),
            parser: MessageParser::new(Arc::clone(&backend)),
            backend,
            handler,
            queue,
            commands: None,
        }
    }

    pub fn with_admin_commands(mut self, commands: Arc<AdminCommands>) -> Self {
        self.commands = Some(commands);
        self
    }

    /// Take one event from the chat backend through the whole flow.
    ///
    /// Returns the verdict, or `None` when the event was dropped at intake or
    /// answered as an admin command.
    pub async fn handle_event(&self, event: InboundEvent) -> Option<Verdict> {
        if event.post_type.as_deref().map_or(false, |t| t != "message")
            || event.message_type.as_deref().map_or(false, |t| t != "group")
        {
            return None;
        }

        // Pick up config edits once per message; checkers then only compare versions.
        self.store.refresh();

        let group_id = event.group_id?;
        if !self.monitor.is_monitored(group_id) {
            return None;
        }

        let (Some(user_id), Some(message_id)) = (event.user_id, event.message_id) else {
            tracing::debug!(group_id, "Dropping event without sender or message id");
            return None;
        };
        if event.message.is_empty() {
            return None;
        }

        if let Some(commands) = &self.commands {
            if commands
                .try_handle(group_id, user_id, &event.message.plain_text())
                .await
            {
                return None;
            }
        }

        let username = self.resolve_username(&event, group_id, user_id).await;
        let parsed_text = self.parser.flatten(&event.message).await;

        let message = Message {
            user_id,
            group_id,
            message_id,
            username,
            raw: event.message,
            parsed_text,
            received_at: Utc::now(),
        };

        let verdict = self.pipeline.evaluate(&message);
        self.act_on(&message, &verdict).await;
        tracing::debug!(
            message_id,
            verdict = ?verdict,
            elapsed_ms = (Utc::now() - message.received_at).num_milliseconds(),
            "Message handled"
        );
        Some(verdict)
    }

    async fn act_on(&self, message: &Message, verdict: &Verdict) {
        match verdict {
            Verdict::Ignored => {}
            Verdict::Whitelisted => {
                tracing::info!(
                    target: "audit",
                    user_id = message.user_id,
                    username = %message.username,
                    group_id = message.group_id,
                    message_id = message.message_id,
                    "Whitelisted member"
                );
            }
            Verdict::Violation(violation) => {
                self.handler
                    .handle(
                        message.user_id,
                        message.group_id,
                        message.message_id,
                        violation.clone(),
                    )
                    .await;
            }
            Verdict::Deferred => {
                self.queue.enqueue(AiTask::from_message(message));
            }
        }
    }

    async fn resolve_username(&self, event: &InboundEvent, group_id: u64, user_id: u64) -> String {
        if let Some(name) = event.sender_name() {
            return name;
        }
        match self.backend.get_member_name(group_id, user_id).await {
            Ok(Some(name)) => name,
            Ok(None) => user_id.to_string(),
            Err(e) => {
                tracing::debug!(user_id, group_id, "Member lookup failed: {}", e);
                user_id.to_string()
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
