// Per-checker cached view of one config section.
//
// Each checker owns one of these. A query compares the store's integer version
// with the version the view was built from and re-parses only on mismatch, so
// steady-state lookups never touch the backing file.

use crate::core::config::{ConfigError, ConfigStore, PolicyConfig};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

struct CachedState<T> {
    version: u64,
    view: Arc<T>,
}

pub struct CachedSection<T> {
    name: &'static str,
    store: Arc<ConfigStore>,
    parse: fn(&PolicyConfig) -> T,
    state: RwLock<CachedState<T>>,
    reloads: AtomicU64,
}

impl<T> CachedSection<T> {
    pub fn new(name: &'static str, store: Arc<ConfigStore>, parse: fn(&PolicyConfig) -> T) -> Self {
        let snapshot = store.snapshot();
        let view = Arc::new(parse(&snapshot.config));
        Self {
            name,
            store,
            parse,
            state: RwLock::new(CachedState {
                version: snapshot.version,
                view,
            }),
            reloads: AtomicU64::new(0),
        }
    }

    /// The parsed view for the store's current version.
    pub fn current(&self) -> Arc<T> {
        let latest = self.store.version();
        {
            let state = self.state.read();
            if state.version == latest {
                return Arc::clone(&state.view);
            }
        }

        let mut state = self.state.write();
        // Another caller may have refreshed while we waited for the write lock.
        if state.version != latest {
            let snapshot = self.store.snapshot();
            state.view = Arc::new((self.parse)(&snapshot.config));
            state.version = snapshot.version;
            self.reloads.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(section = self.name, version = snapshot.version, "Section reloaded");
        }
        Arc::clone(&state.view)
    }

    /// Apply `mutate` to the latest document, save it, and adopt the saved
    /// version as our own.
    pub fn update<F>(&self, mutate: F) -> Result<Arc<T>, ConfigError>
    where
        F: FnOnce(&mut PolicyConfig),
    {
        let snapshot = self.store.modify(mutate)?;
        let view = Arc::new((self.parse)(&snapshot.config));

        let mut state = self.state.write();
        state.view = Arc::clone(&view);
        state.version = snapshot.version;
        tracing::info!(section = self.name, version = snapshot.version, "Section saved");
        Ok(view)
    }

    #[cfg(test)]
    pub fn cached_version(&self) -> u64 {
        self.state.read().version
    }

    #[cfg(test)]
    /// How many times the view was rebuilt because the store moved on.
    pub fn reloads(&self) -> u64 {
        self.reloads.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::config_store::test_support::store_with;

    fn admins(config: &PolicyConfig) -> Vec<u64> {
        config.admins.clone()
    }

    #[test]
    fn test_reload_only_after_version_change() {
        let (store, source) = store_with(PolicyConfig::default());
        let section = CachedSection::new("admins", Arc::clone(&store), admins);

        assert!(section.current().is_empty());
        assert!(section.current().is_empty());
        assert_eq!(section.reloads(), 0);

        source.edit(|c| c.admins.push(9));
        // Still the old view: nobody asked the store to look at the source yet.
        assert!(section.current().is_empty());

        store.refresh();
        assert_eq!(*section.current(), vec![9]);
        assert_eq!(*section.current(), vec![9]);
        assert_eq!(section.reloads(), 1);
        assert!(section.cached_version() <= store.version());
    }

    #[test]
    fn test_update_adopts_saved_version() {
        let (store, _source) = store_with(PolicyConfig::default());
        let section = CachedSection::new("admins", Arc::clone(&store), admins);

        section.update(|c| c.admins.push(3)).unwrap();
        assert_eq!(section.cached_version(), store.version());
        assert_eq!(*section.current(), vec![3]);
        assert_eq!(section.reloads(), 0);
    }
}
