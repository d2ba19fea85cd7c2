//! Resource loading.
//!
//! The engine never touches the filesystem or the network. Hosts hand it a
//! [`ResourceLoader`] that maps a resource name to raw bytes; fonts and
//! images are decoded from those bytes inside the engine.
//!
//! [`LoadCache`] coalesces identical requests: the first caller for a key
//! runs the load, concurrent callers for the same key wait on that same
//! slot, and the outcome (including a failure) is kept for later callers.

use crate::error::{QuireError, ResourceError};
use dashmap::DashMap;
use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

/// Reference-counted resource bytes.
pub type SharedResourceData = Arc<Vec<u8>>;

/// Supplies raw bytes for named resources (font files, images).
pub trait ResourceLoader: Send + Sync + Debug {
    fn load(&self, name: &str) -> std::result::Result<SharedResourceData, ResourceError>;
}

/// A loader backed by a map of pre-registered byte buffers.
#[derive(Debug, Default)]
pub struct InMemoryLoader {
    resources: RwLock<HashMap<String, SharedResourceData>>,
    loads: AtomicUsize,
}

impl InMemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, name: impl Into<String>, data: Vec<u8>) {
        self.add_shared(name, Arc::new(data));
    }

    pub fn add_shared(&self, name: impl Into<String>, data: SharedResourceData) {
        let mut resources = self.resources.write().unwrap_or_else(PoisonError::into_inner);
        resources.insert(name.into(), data);
    }

    pub fn with(self, name: impl Into<String>, data: Vec<u8>) -> Self {
        self.add(name, data);
        self
    }

    /// Number of `load` calls served so far, successful or not.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl ResourceLoader for InMemoryLoader {
    fn load(&self, name: &str) -> std::result::Result<SharedResourceData, ResourceError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let resources = self.resources.read().map_err(|_| ResourceError::LoadFailed {
            name: name.to_string(),
            message: "resource store lock poisoned".to_string(),
        })?;
        resources
            .get(name)
            .cloned()
            .ok_or_else(|| ResourceError::NotFound(name.to_string()))
    }
}

type Slot<V, E> = Arc<OnceLock<Result<V, E>>>;

/// A keyed cache where each key is loaded at most once.
pub struct LoadCache<K, V, E = QuireError> {
    slots: DashMap<K, Slot<V, E>>,
}

impl<K: Eq + Hash, V, E> Default for LoadCache<K, V, E> {
    fn default() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }
}

impl<K: Eq + Hash + Clone, V: Clone, E: Clone> LoadCache<K, V, E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached outcome for `key`, running `load` if nobody has yet.
    /// The shard lock is released before `load` runs.
    pub fn get_or_load<F>(&self, key: &K, load: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        let slot = self.slots.entry(key.clone()).or_default().clone();
        slot.get_or_init(load).clone()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl<K: Eq + Hash, V, E> Debug for LoadCache<K, V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadCache")
            .field("entries", &self.slots.len())
            .finish()
    }
}
