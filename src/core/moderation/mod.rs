// Core moderation module - message intake, the rule pipeline, and everything
// that happens after a verdict.

pub mod admin_commands;
pub mod admin_notifier;
pub mod ai_queue;
pub mod chat_backend;
pub mod dedup;
pub mod dispatcher;
pub mod message_parser;
pub mod moderation_models;
pub mod moderation_service;
pub mod violation_handler;
pub mod violation_stats;

pub use admin_commands::AdminCommands;
pub use admin_notifier::AdminNotifier;
pub use ai_queue::AiModerationQueue;
pub use chat_backend::{AdapterError, ChatBackend};
pub use dedup::IngestionDedup;
pub use dispatcher::MessageDispatcher;
pub use moderation_models::*;
pub use moderation_service::ModerationService;
pub use violation_handler::ViolationHandler;
pub use violation_stats::{render_ranking, ViolationStats};
