// Versioned configuration store - the single source of truth for every checker.
//
// Checkers never read the backing file themselves. They compare the integer
// `version()` against the version their cached view was built from and only
// re-parse their section when it changed.

use super::config_models::{ConfigSnapshot, PolicyConfig};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::SystemTime;
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Parse(String),

    #[error("Config source not found: {0}")]
    Missing(String),
}

// ============================================================================
// SOURCE TRAIT (PORT)
// ============================================================================

/// Where the configuration document lives.
///
/// `modified` is the reload trigger: the store reloads whenever the value it
/// returns differs from the one recorded at the last load.
pub trait ConfigSource: Send + Sync {
    fn modified(&self) -> Result<Option<SystemTime>, ConfigError>;

    fn load(&self) -> Result<PolicyConfig, ConfigError>;

    /// Write the document and return the new modification time.
    fn persist(&self, config: &PolicyConfig) -> Result<Option<SystemTime>, ConfigError>;
}

// ============================================================================
// STORE
// ============================================================================

pub struct ConfigStore {
    source: Box<dyn ConfigSource>,
    current: Mutex<Arc<ConfigSnapshot>>,
}

impl ConfigStore {
    /// Perform the first load. A failure here is fatal: there is no previous
    /// snapshot to fall back to.
    pub fn open(source: impl ConfigSource + 'static) -> Result<Self, ConfigError> {
        let modified = source.modified()?;
        let config = source.load()?;
        tracing::info!(
            monitor_groups = config.monitor_groups.len(),
            admins = config.admins.len(),
            "Loaded policy configuration"
        );

        Ok(Self {
            source: Box::new(source),
            current: Mutex::new(Arc::new(ConfigSnapshot {
                version: 1,
                modified,
                config: Arc::new(config),
            })),
        })
    }

    /// Current version. No I/O.
    pub fn version(&self) -> u64 {
        self.current.lock().version
    }

    /// Last loaded snapshot without touching the source.
    pub fn snapshot(&self) -> Arc<ConfigSnapshot> {
        Arc::clone(&self.current.lock())
    }

    /// Current snapshot, reloading first if the source changed since the last
    /// load. A failed reload keeps serving the last good snapshot.
    pub fn get(&self) -> Arc<ConfigSnapshot> {
        let mut current = self.current.lock();
        self.reload_if_changed(&mut current);
        Arc::clone(&current)
    }

    /// Check the source for changes and return the resulting version.
    pub fn refresh(&self) -> u64 {
        self.get().version
    }

    /// Persist `config` and bump the version.
    #[allow(dead_code)]
    pub fn save(&self, config: PolicyConfig) -> Result<Arc<ConfigSnapshot>, ConfigError> {
        let mut current = self.current.lock();
        Self::persist_locked(&*self.source, &mut current, config)
    }

    /// Read-modify-write against the latest document.
    ///
    /// The lock is held across reload, mutation and save so two concurrent
    /// edits to different sections can't clobber each other.
    pub fn modify<F>(&self, mutate: F) -> Result<Arc<ConfigSnapshot>, ConfigError>
    where
        F: FnOnce(&mut PolicyConfig),
    {
        let mut current = self.current.lock();
        self.reload_if_changed(&mut current);
        let mut config = (*current.config).clone();
        mutate(&mut config);
        Self::persist_locked(&*self.source, &mut current, config)
    }

    fn persist_locked(
        source: &dyn ConfigSource,
        current: &mut Arc<ConfigSnapshot>,
        config: PolicyConfig,
    ) -> Result<Arc<ConfigSnapshot>, ConfigError> {
        let modified = source.persist(&config)?;
        let next = Arc::new(ConfigSnapshot {
            version: current.version + 1,
            modified,
            config: Arc::new(config),
        });
        *current = Arc::clone(&next);
        Ok(next)
    }

    fn reload_if_changed(&self, current: &mut Arc<ConfigSnapshot>) {
        let modified = match self.source.modified() {
            Ok(modified) => modified,
            Err(e) => {
                tracing::warn!("Config source unavailable, keeping version {}: {}", current.version, e);
                return;
            }
        };

        if modified == current.modified {
            return;
        }

        match self.source.load() {
            Ok(config) => {
                let version = current.version + 1;
                tracing::info!(version, "Policy configuration reloaded");
                *current = Arc::new(ConfigSnapshot {
                    version,
                    modified,
                    config: Arc::new(config),
                });
            }
            Err(e) => {
                tracing::warn!("Config reload failed, keeping version {}: {}", current.version, e);
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

/// In-memory source with a manually driven modification clock.
#[cfg(test)]
pub mod test_support {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    pub struct MemorySource {
        state: Mutex<MemoryState>,
        pub loads: AtomicUsize,
    }

    struct MemoryState {
        config: Option<PolicyConfig>,
        tick: u64,
        corrupt: bool,
    }

    impl MemorySource {
        pub fn new(config: PolicyConfig) -> Self {
            Self {
                state: Mutex::new(MemoryState {
                    config: Some(config),
                    tick: 0,
                    corrupt: false,
                }),
                loads: AtomicUsize::new(0),
            }
        }

        pub fn missing() -> Self {
            Self {
                state: Mutex::new(MemoryState {
                    config: None,
                    tick: 0,
                    corrupt: false,
                }),
                loads: AtomicUsize::new(0),
            }
        }

        /// Simulate an operator editing the file.
        pub fn edit(&self, mutate: impl FnOnce(&mut PolicyConfig)) {
            let mut state = self.state.lock();
            if let Some(config) = state.config.as_mut() {
                mutate(config);
            }
            state.tick += 1;
        }

        /// Simulate a half-written file: it changes but can't be parsed.
        pub fn corrupt(&self) {
            let mut state = self.state.lock();
            state.corrupt = true;
            state.tick += 1;
        }

        fn stamp(tick: u64) -> Option<SystemTime> {
            Some(SystemTime::UNIX_EPOCH + Duration::from_secs(tick))
        }
    }

    impl ConfigSource for MemorySource {
        fn modified(&self) -> Result<Option<SystemTime>, ConfigError> {
            let state = self.state.lock();
            match state.config {
                Some(_) => Ok(Self::stamp(state.tick)),
                None => Err(ConfigError::Missing("memory".to_string())),
            }
        }

        fn load(&self) -> Result<PolicyConfig, ConfigError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            let state = self.state.lock();
            if state.corrupt {
                return Err(ConfigError::Parse("corrupt".to_string()));
            }
            state
                .config
                .clone()
                .ok_or_else(|| ConfigError::Missing("memory".to_string()))
        }

        fn persist(&self, config: &PolicyConfig) -> Result<Option<SystemTime>, ConfigError> {
            let mut state = self.state.lock();
            state.config = Some(config.clone());
            state.corrupt = false;
            state.tick += 1;
            Ok(Self::stamp(state.tick))
        }
    }

    impl ConfigSource for Arc<MemorySource> {
        fn modified(&self) -> Result<Option<SystemTime>, ConfigError> {
            (**self).modified()
        }

        fn load(&self) -> Result<PolicyConfig, ConfigError> {
            (**self).load()
        }

        fn persist(&self, config: &PolicyConfig) -> Result<Option<SystemTime>, ConfigError> {
            (**self).persist(config)
        }
    }

    /// Build a store over a shared memory source so tests can edit it later.
    pub fn store_with(config: PolicyConfig) -> (Arc<ConfigStore>, Arc<MemorySource>) {
        let source = Arc::new(MemorySource::new(config));
        let store = ConfigStore::open(Arc::clone(&source)).unwrap();
        (Arc::new(store), source)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{store_with, MemorySource};
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn test_first_load_failure_is_fatal() {
        let result = ConfigStore::open(MemorySource::missing());
        assert!(matches!(result, Err(ConfigError::Missing(_))));
    }

    #[test]
    fn test_version_is_stable_without_changes() {
        let (store, source) = store_with(PolicyConfig::default());
        let v = store.version();

        for _ in 0..5 {
            assert_eq!(store.get().version, v);
        }
        assert_eq!(source.loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_edit_triggers_exactly_one_reload() {
        let (store, source) = store_with(PolicyConfig::default());
        let before = store.version();

        source.edit(|c| c.admins.push(42));
        let after = store.get();
        assert_eq!(after.version, before + 1);
        assert_eq!(after.config.admins, vec![42]);

        // Further reads see the same version and don't reload again.
        assert_eq!(store.get().version, before + 1);
        assert_eq!(source.loads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_version_does_not_touch_source() {
        let (store, source) = store_with(PolicyConfig::default());
        source.edit(|c| c.admins.push(1));

        // version() alone never notices the edit.
        assert_eq!(store.version(), 1);
        assert_eq!(store.refresh(), 2);
    }

    #[test]
    fn test_corrupt_reload_keeps_last_good_snapshot() {
        let mut config = PolicyConfig::default();
        config.black_rules.push("spam".to_string());
        let (store, source) = store_with(config);

        source.corrupt();
        let snapshot = store.get();
        assert_eq!(snapshot.version, 1);
        assert_eq!(snapshot.config.black_rules, vec!["spam".to_string()]);
    }

    #[test]
    fn test_save_bumps_version_and_persists() {
        let (store, source) = store_with(PolicyConfig::default());
        let mut config = (*store.get().config).clone();
        config.white_groups.push(7);

        let saved = store.save(config).unwrap();
        assert_eq!(saved.version, 2);
        assert_eq!(source.load().unwrap().white_groups, vec![7]);

        // Our own write must not look like an external change.
        assert_eq!(store.get().version, 2);
    }

    #[test]
    fn test_modify_applies_to_latest_external_edit() {
        let (store, source) = store_with(PolicyConfig::default());
        source.edit(|c| c.admins.push(1));

        let saved = store.modify(|c| c.white_members.push(2)).unwrap();
        assert_eq!(saved.config.admins, vec![1]);
        assert_eq!(saved.config.white_members, vec![2]);
        assert_eq!(saved.version, 3);
    }
}
