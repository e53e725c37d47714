use core::sync::atomic::{AtomicU64, Ordering};
use crossbeam_epoch::{self as epoch, Atomic, Owned};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::config::ServerConfig;
use crate::error::ConfigError;
use crate::snapshot::ConfigSnapshot;

/// Holds the live configuration generation.
///
/// ## Shadow-Swap
/// Request handlers call `load` for an `Arc` to the current snapshot and keep
/// using it even if a reload lands meanwhile. `swap` publishes a new
/// generation through an atomic pointer; the previous one is reclaimed once no
/// pinned reader can still observe the pointer. Writers are serialized so
/// generations go live in the order they are numbered; readers never lock.
pub struct ConfigStore {
    current: Atomic<Arc<ConfigSnapshot>>,
    generation: AtomicU64,
    writer: Mutex<()>,
}

impl ConfigStore {
    pub fn new(snapshot: ConfigSnapshot) -> Self {
        Self {
            current: Atomic::new(Arc::new(snapshot.with_generation(1))),
            generation: AtomicU64::new(1),
            writer: Mutex::new(()),
        }
    }

    pub fn from_config(config: &ServerConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(ConfigSnapshot::build(config)?))
    }

    pub fn load(&self) -> Arc<ConfigSnapshot> {
        let guard = epoch::pin();
        let shared = self.current.load(Ordering::Acquire, &guard);
        // # Safety: `current` is non-null from `new` until `drop`, and the guard
        // keeps the pointee alive while the Arc is cloned out of it.
        unsafe { Arc::clone(shared.deref()) }
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Publishes `snapshot` as the next generation and returns its number.
    pub fn swap(&self, snapshot: ConfigSnapshot) -> u64 {
        let _writer = self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let new_owned = Owned::new(Arc::new(snapshot.with_generation(generation)));
        let guard = epoch::pin();
        let old = self.current.swap(new_owned, Ordering::AcqRel, &guard);

        // # Safety: `old` is unreachable through `current` now; destruction is
        // deferred until every reader pinned before the swap has unpinned.
        unsafe {
            if !old.is_null() {
                guard.defer_destroy(old);
            }
        }
        tracing::info!("ConfigStore: generation {} is live", generation);
        generation
    }

    /// Builds and publishes a snapshot from `config`. On error the current
    /// generation stays live.
    pub fn reload(&self, config: &ServerConfig) -> Result<u64, ConfigError> {
        let snapshot = ConfigSnapshot::build(config)?;
        Ok(self.swap(snapshot))
    }

    pub fn reload_from(&self, path: impl AsRef<Path>) -> Result<u64, ConfigError> {
        let config = ServerConfig::load(path)?;
        self.reload(&config)
    }
}

impl Drop for ConfigStore {
    fn drop(&mut self) {
        let guard = epoch::pin();
        let old = self.current.swap(epoch::Shared::null(), Ordering::AcqRel, &guard);
        unsafe {
            if !old.is_null() {
                guard.defer_destroy(old);
            }
        }
    }
}
