// Configuration module - versioned snapshot store plus the document model.

pub mod config_models;
pub mod config_store;

pub use config_models::*;
pub use config_store::{ConfigError, ConfigSource, ConfigStore};
