pub mod yaml_file_source;

pub use yaml_file_source::YamlFileSource;

use crate::core::config::PolicyConfig;
use std::env;
use std::path::PathBuf;

pub const DEFAULT_CONFIG_PATH: &str = "config/app_config.yaml";

/// Policy file location: `GROUP_GUARD_CONFIG` or the default path.
pub fn config_path() -> PathBuf {
    env::var("GROUP_GUARD_CONFIG")
        .ok()
        .filter(|p| !p.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Overlay connection settings from the environment. Applied to a copy used to
/// build clients, never saved back to the file.
pub fn apply_env_overrides(config: &mut PolicyConfig) {
    if let Some(url) = non_empty_var("GROUP_GUARD_HTTP_URL") {
        config.bot.http_url = url;
    }
    if let Some(token) = non_empty_var("GROUP_GUARD_TOKEN") {
        config.bot.token = token;
    }
    if let Some(provider) = non_empty_var("GROUP_GUARD_AI_PROVIDER") {
        config.ai.provider = provider.trim().to_lowercase();
    }
    if let Some(flag) = non_empty_var("GROUP_GUARD_OLLAMA_THINKING").and_then(|v| parse_flag(&v)) {
        config.ai.ollama.thinking_enabled = flag;
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// `1/true/yes/on` and `0/false/no/off`, case-insensitive.
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("ON"), Some(true));
        assert_eq!(parse_flag(" 0 "), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
