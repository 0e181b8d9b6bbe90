pub mod ai_service;
pub mod models;
pub mod prompt_loader;

pub use ai_service::{AiError, AiJudge, AiProvider, AiService};
pub use models::AiConfig;
pub use prompt_loader::load_prompt;
