use crate::core::config::{ConfigError, ConfigSource, PolicyConfig};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// The policy document as a YAML file on disk. Its mtime is the reload trigger.
pub struct YamlFileSource {
    path: PathBuf,
}

impl YamlFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn missing_or_io(&self, e: std::io::Error) -> ConfigError {
        if e.kind() == ErrorKind::NotFound {
            ConfigError::Missing(self.path.display().to_string())
        } else {
            ConfigError::Io(e)
        }
    }
}

impl ConfigSource for YamlFileSource {
    fn modified(&self) -> Result<Option<SystemTime>, ConfigError> {
        let metadata = fs::metadata(&self.path).map_err(|e| self.missing_or_io(e))?;
        Ok(metadata.modified().ok())
    }

    fn load(&self) -> Result<PolicyConfig, ConfigError> {
        let text = fs::read_to_string(&self.path).map_err(|e| self.missing_or_io(e))?;
        if text.trim().is_empty() {
            return Ok(PolicyConfig::default());
        }
        serde_yaml::from_str(&text)
            .map_err(|e| ConfigError::Parse(format!("{}: {}", self.path.display(), e)))
    }

    /// Writes to a sibling temp file and renames it over the original so a
    /// concurrent reader never sees a half-written document.
    fn persist(&self, config: &PolicyConfig) -> Result<Option<SystemTime>, ConfigError> {
        let text = serde_yaml::to_string(config).map_err(|e| ConfigError::Parse(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, text)?;
        fs::rename(&tmp, &self.path)?;
        tracing::debug!(path = %self.path.display(), "Config saved");

        self.modified()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ConfigStore;
    use std::time::Duration;
    use tempfile::tempdir;

    fn touch_later(path: &Path) {
        let file = fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(10))
            .unwrap();
    }

    #[test]
    fn test_missing_file_is_reported() {
        let dir = tempdir().unwrap();
        let source = YamlFileSource::new(dir.path().join("absent.yaml"));
        assert!(matches!(source.load(), Err(ConfigError::Missing(_))));
        assert!(matches!(ConfigStore::open(source), Err(ConfigError::Missing(_))));
    }

    #[test]
    fn test_load_parses_sections() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app_config.yaml");
        fs::write(
            &path,
            "monitor_groups: [\"123\"]\nwebsite_whitelist:\n  - qq.com\n  - top>.cn\nbot:\n  history_count: 5\n",
        )
        .unwrap();

        let config = YamlFileSource::new(&path).load().unwrap();
        assert_eq!(config.monitor_groups, vec![123]);
        assert_eq!(config.website_whitelist, vec!["qq.com", "top>.cn"]);
        assert_eq!(config.bot.history_count, 5);
    }

    #[test]
    fn test_empty_file_is_default_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app_config.yaml");
        fs::write(&path, "\n").unwrap();
        assert_eq!(YamlFileSource::new(&path).load().unwrap(), PolicyConfig::default());
    }

    #[test]
    fn test_persist_keeps_unknown_sections() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app_config.yaml");
        fs::write(&path, "admins: [1]\nweb_ui:\n  port: 8000\n").unwrap();

        let source = YamlFileSource::new(&path);
        let mut config = source.load().unwrap();
        config.admins.push(2);
        source.persist(&config).unwrap();

        let reloaded = source.load().unwrap();
        assert_eq!(reloaded.admins, vec![1, 2]);
        assert!(reloaded.extra.contains_key("web_ui"));
    }

    #[test]
    fn test_store_reloads_after_file_edit() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app_config.yaml");
        fs::write(&path, "black_rules: [spam]\n").unwrap();

        let store = ConfigStore::open(YamlFileSource::new(&path)).unwrap();
        assert_eq!(store.refresh(), 1);

        fs::write(&path, "black_rules: [spam, scam]\n").unwrap();
        touch_later(&path);
        assert_eq!(store.refresh(), 2);
        assert_eq!(store.get().config.black_rules, vec!["spam", "scam"]);

        // A broken edit keeps the last good document.
        fs::write(&path, "black_rules: [unclosed\n").unwrap();
        let file = fs::File::options().write(true).open(&path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(20))
            .unwrap();
        assert_eq!(store.refresh(), 2);
        assert_eq!(store.get().config.black_rules, vec!["spam", "scam"]);
    }
}
