//! Process-wide registry of keyed state
//!
//! Every store mounted for the same key shares one slot: the cached value,
//! the loading flag and the last reported error. The registry is an explicit
//! context object handed to consumers rather than ambient global state.

use dashmap::DashMap;
use globstate_core::{StateError, StateKey, StateResult};
use parking_lot::RwLock;
use std::any::{type_name, Any};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::debug;

/// Operations available on a slot without knowing its value type
trait ErasedSlot: Send + Sync {
    fn is_cached(&self) -> bool;
    fn clear(&self);
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// Shared state for one key
pub(crate) struct Slot<T> {
    value: watch::Sender<Option<T>>,
    loading: AtomicBool,
    error: RwLock<Option<StateError>>,
    pub(crate) load_lock: Mutex<()>,
}

impl<T: Clone + Send + Sync + 'static> Slot<T> {
    fn new() -> Self {
        let (value, _) = watch::channel(None);
        Self {
            value,
            loading: AtomicBool::new(false),
            error: RwLock::new(None),
            load_lock: Mutex::new(()),
        }
    }
    
    pub(crate) fn cached(&self) -> Option<T> {
        self.value.borrow().clone()
    }
    
    pub(crate) fn is_cached(&self) -> bool {
        self.value.borrow().is_some()
    }
    
    /// Overwrite the cached value and notify watchers
    pub(crate) fn replace(&self, value: T) {
        self.value.send_replace(Some(value));
    }
    
    /// Store `value` only if nothing is cached yet; returns the value in effect
    pub(crate) fn fill(&self, value: T) -> T {
        let mut in_effect = value;
        self.value.send_if_modified(|current| match current {
            Some(existing) => {
                in_effect = existing.clone();
                false
            }
            None => {
                *current = Some(in_effect.clone());
                true
            }
        });
        in_effect
    }
    
    pub(crate) fn clear(&self) {
        self.value.send_replace(None);
        *self.error.write() = None;
    }
    
    pub(crate) fn subscribe(&self) -> watch::Receiver<Option<T>> {
        self.value.subscribe()
    }
    
    pub(crate) fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }
    
    pub(crate) fn set_loading(&self, loading: bool) {
        self.loading.store(loading, Ordering::SeqCst);
    }
    
    pub(crate) fn last_error(&self) -> Option<StateError> {
        self.error.read().clone()
    }
    
    pub(crate) fn record_error(&self, error: Option<StateError>) {
        *self.error.write() = error;
    }
}

impl<T: Clone + Send + Sync + 'static> ErasedSlot for Slot<T> {
    fn is_cached(&self) -> bool {
        Slot::is_cached(self)
    }
    
    fn clear(&self) {
        Slot::clear(self)
    }
    
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Registry of all keyed state in a process
#[derive(Default)]
pub struct StateRegistry {
    slots: DashMap<StateKey, Arc<dyn ErasedSlot>>,
}

impl StateRegistry {
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }
    
    /// Get or create the typed slot for a key
    pub(crate) fn slot<T>(&self, key: &StateKey) -> StateResult<Arc<Slot<T>>>
    where
        T: Clone + Send + Sync + 'static,
    {
        let erased = self
            .slots
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Slot::<T>::new()) as Arc<dyn ErasedSlot>)
            .value()
            .clone();
        
        downcast(key, erased)
    }
    
    /// Current cached value of a key, if any
    pub fn cached<T>(&self, key: &StateKey) -> StateResult<Option<T>>
    where
        T: Clone + Send + Sync + 'static,
    {
        let erased = match self.slots.get(key) {
            Some(entry) => entry.value().clone(),
            None => return Ok(None),
        };
        Ok(downcast::<T>(key, erased)?.cached())
    }
    
    /// Subscribe to in-memory changes of a key
    pub fn subscribe<T>(&self, key: &StateKey) -> StateResult<watch::Receiver<Option<T>>>
    where
        T: Clone + Send + Sync + 'static,
    {
        Ok(self.slot::<T>(key)?.subscribe())
    }
    
    /// Whether a value is cached for the key
    pub fn contains(&self, key: &StateKey) -> bool {
        self.slots
            .get(key)
            .map(|entry| entry.value().is_cached())
            .unwrap_or(false)
    }
    
    /// Drop the cached value so the next load reads the persistor again.
    ///
    /// Mounted stores keep working; watchers see the key go back to empty.
    pub fn evict(&self, key: &StateKey) -> bool {
        match self.slots.get(key) {
            Some(entry) => {
                let was_cached = entry.value().is_cached();
                entry.value().clear();
                debug!(key = %key, "evicted cached state");
                was_cached
            }
            None => false,
        }
    }
    
    /// Evict every key
    pub fn clear(&self) {
        for entry in self.slots.iter() {
            entry.value().clear();
        }
    }
    
    pub fn keys(&self) -> Vec<StateKey> {
        self.slots.iter().map(|entry| entry.key().clone()).collect()
    }
    
    pub fn len(&self) -> usize {
        self.slots.len()
    }
    
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

fn downcast<T>(key: &StateKey, erased: Arc<dyn ErasedSlot>) -> StateResult<Arc<Slot<T>>>
where
    T: Clone + Send + Sync + 'static,
{
    erased
        .into_any()
        .downcast::<Slot<T>>()
        .map_err(|_| StateError::TypeMismatch {
            key: key.to_string(),
            expected: type_name::<T>(),
        })
}

/// Thread-safe registry wrapper
pub type SharedRegistry = Arc<StateRegistry>;

/// Create a shared registry
pub fn create_registry() -> SharedRegistry {
    Arc::new(StateRegistry::new())
}
