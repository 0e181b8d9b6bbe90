// The core module contains all business logic.
// Each feature gets its own submodule.

#[path = "config/mod.rs"]
pub mod config;

#[path = "policy/mod.rs"]
pub mod policy;

#[path = "moderation/mod.rs"]
pub mod moderation;

#[path = "ai/mod.rs"]
pub mod ai;
