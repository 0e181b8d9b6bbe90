// The infra module contains implementations of core traits.
// Each adapter gets its own submodule.

#[path = "config/mod.rs"]
pub mod config;

#[path = "onebot/mod.rs"]
pub mod onebot;

#[path = "ai/mod.rs"]
pub mod ai;
