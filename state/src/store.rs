//! Store controller: a keyed value with read-through loading and
//! optionally rate-limited persistence
//!
//! A [`StoreDefinition`] describes a piece of state once; every
//! [`StoreDefinition::mount`] against a registry yields a [`Store`] handle.
//! All mounts of one key share the cached value, but each mount owns its own
//! rate limiter and persisting flag.

use crate::gate::{BoxFuture, GateHooks, PersistEffect, RateLimit, TimerGate};
use crate::registry::{SharedRegistry, Slot};
use globstate_core::{Persistor, StateError, StateKey, StateResult, StoreOptions, StorePhase};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Callback receiving every reported persistence failure
pub type ErrorCallback = Arc<dyn Fn(&StateError) + Send + Sync>;

/// Shared typed persistor
pub type SharedPersistor<T> = Arc<dyn Persistor<T>>;

/// Bounds required of a value held in a store
pub trait StoreValue: Clone + Serialize + Send + Sync + 'static {}

impl<T: Clone + Serialize + Send + Sync + 'static> StoreValue for T {}

/// New value for a store: a plain value or a function of the current one
pub enum Update<T> {
    Value(T),
    Apply(Box<dyn FnOnce(&T) -> StateResult<T> + Send>),
    Async(Box<dyn FnOnce(T) -> BoxFuture<'static, StateResult<T>> + Send>),
}

impl<T: Send + 'static> Update<T> {
    pub fn value(value: T) -> Self {
        Update::Value(value)
    }

    /// Derive the new value from the current one
    pub fn with<F>(f: F) -> Self
    where
        F: FnOnce(&T) -> T + Send + 'static,
    {
        Update::Apply(Box::new(move |current| Ok(f(current))))
    }

    /// Derive the new value, failing the `set` call on error
    pub fn try_with<F>(f: F) -> Self
    where
        F: FnOnce(&T) -> StateResult<T> + Send + 'static,
    {
        Update::Apply(Box::new(f))
    }

    /// Derive the new value asynchronously
    pub fn future<F, Fut>(f: F) -> Self
    where
        F: FnOnce(T) -> Fut + Send + 'static,
        Fut: Future<Output = StateResult<T>> + Send + 'static,
    {
        Update::Async(Box::new(move |current| Box::pin(f(current))))
    }

    async fn resolve(self, current: T) -> StateResult<T> {
        match self {
            Update::Value(value) => Ok(value),
            Update::Apply(f) => f(&current),
            Update::Async(f) => f(current).await,
        }
    }
}

impl<T> From<T> for Update<T> {
    fn from(value: T) -> Self {
        Update::Value(value)
    }
}

impl<T> fmt::Debug for Update<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Update::Value(_) => f.write_str("Update::Value"),
            Update::Apply(_) => f.write_str("Update::Apply"),
            Update::Async(_) => f.write_str("Update::Async"),
        }
    }
}

/// Status flags exposed next to a store's value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreMeta {
    /// The persistor read for this key is in progress
    pub is_loading: bool,
    /// Last failure reported for this key
    pub error: Option<StateError>,
    /// A rate-limited write of this mount is executing
    pub is_persisting: bool,
}

/// Reusable description of a store (key, initial value and persistence)
pub struct StoreDefinition<T> {
    key: StateKey,
    initial: T,
    persistor: Option<SharedPersistor<T>>,
    on_error: Option<ErrorCallback>,
    retry_on_error: bool,
    rate_limit: Option<RateLimit<T>>,
}

impl<T: Clone> Clone for StoreDefinition<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            initial: self.initial.clone(),
            persistor: self.persistor.clone(),
            on_error: self.on_error.clone(),
            retry_on_error: self.retry_on_error,
            rate_limit: self.rate_limit.clone(),
        }
    }
}

impl<T: StoreValue> StoreDefinition<T> {
    pub fn new(key: impl Into<StateKey>, initial: T) -> Self {
        Self {
            key: key.into(),
            initial,
            persistor: None,
            on_error: None,
            retry_on_error: true,
            rate_limit: None,
        }
    }

    pub fn persistor(self, persistor: impl Persistor<T> + 'static) -> Self {
        self.shared_persistor(Arc::new(persistor))
    }

    pub fn shared_persistor(mut self, persistor: SharedPersistor<T>) -> Self {
        self.persistor = Some(persistor);
        self
    }

    pub fn on_error(mut self, callback: impl Fn(&StateError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(callback));
        self
    }

    /// `true` (default): report failures and carry on.
    /// `false`: report failures and return them to the caller.
    pub fn retry_on_error(mut self, retry: bool) -> Self {
        self.retry_on_error = retry;
        self
    }

    pub fn rate_limit(mut self, rate_limit: impl Into<RateLimit<T>>) -> Self {
        self.rate_limit = Some(rate_limit.into());
        self
    }

    /// Apply configured options (retry policy and rate limit)
    pub fn options(mut self, options: &StoreOptions) -> Self {
        self.retry_on_error = options.retry_on_error;
        self.rate_limit = options.rate_limit.map(RateLimit::from);
        self
    }

    pub fn key(&self) -> &StateKey {
        &self.key
    }

    pub fn initial(&self) -> &T {
        &self.initial
    }

    pub fn mount(&self, registry: &SharedRegistry) -> StateResult<Store<T>> {
        self.mount_with_initial(registry, None)
    }

    /// Mount with a different initial value for this handle
    pub fn mount_with_initial(
        &self,
        registry: &SharedRegistry,
        initial: Option<T>,
    ) -> StateResult<Store<T>> {
        let slot = registry.slot::<T>(&self.key)?;
        let persisting = Arc::new(AtomicUsize::new(0));
        let reporter = ErrorReporter {
            key: self.key.clone(),
            on_error: self.on_error.clone(),
            slot: slot.clone(),
        };

        let gate = match (&self.persistor, &self.rate_limit) {
            (Some(persistor), Some(rate_limit)) => Some(TimerGate::new(
                persist_effect(persistor.clone(), reporter.clone(), self.retry_on_error),
                rate_limit.clone(),
                persisting_hooks(&persisting),
            )),
            _ => None,
        };

        debug!(key = %self.key, rate_limit = ?self.rate_limit, "mounted store");

        Ok(Store {
            inner: Arc::new(StoreInner {
                key: self.key.clone(),
                initial: initial.unwrap_or_else(|| self.initial.clone()),
                slot,
                persistor: self.persistor.clone(),
                reporter,
                retry_on_error: self.retry_on_error,
                gate,
                persisting,
            }),
        })
    }
}

/// Routes failures to the log, the shared slot and the `on_error` callback
struct ErrorReporter<T> {
    key: StateKey,
    on_error: Option<ErrorCallback>,
    slot: Arc<Slot<T>>,
}

impl<T> Clone for ErrorReporter<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            on_error: self.on_error.clone(),
            slot: self.slot.clone(),
        }
    }
}

impl<T: StoreValue> ErrorReporter<T> {
    fn report(&self, error: &StateError) {
        warn!(key = %self.key, error = %error, "persistence failure");
        self.slot.record_error(Some(error.clone()));
        if let Some(callback) = &self.on_error {
            callback(error);
        }
    }

    /// A later success supersedes the last reported failure
    fn clear(&self) {
        self.slot.record_error(None);
    }
}

fn persist_effect<T: StoreValue>(
    persistor: SharedPersistor<T>,
    reporter: ErrorReporter<T>,
    retry_on_error: bool,
) -> PersistEffect<T> {
    Arc::new(move |key: StateKey, value: T| -> BoxFuture<'static, StateResult<()>> {
        let persistor = persistor.clone();
        let reporter = reporter.clone();
        Box::pin(async move {
            match persistor.on_set(&key, &value).await {
                Ok(()) => {
                    reporter.clear();
                    Ok(())
                }
                Err(err) => {
                    reporter.report(&err);
                    if retry_on_error {
                        Ok(())
                    } else {
                        Err(err)
                    }
                }
            }
        })
    })
}

fn persisting_hooks(counter: &Arc<AtomicUsize>) -> GateHooks {
    let started = counter.clone();
    let ended = counter.clone();
    GateHooks::new()
        .on_start(move || {
            started.fetch_add(1, Ordering::SeqCst);
        })
        .on_end(move || {
            ended.fetch_sub(1, Ordering::SeqCst);
        })
}

struct StoreInner<T> {
    key: StateKey,
    initial: T,
    slot: Arc<Slot<T>>,
    persistor: Option<SharedPersistor<T>>,
    reporter: ErrorReporter<T>,
    retry_on_error: bool,
    gate: Option<TimerGate<T>>,
    // In-flight rate-limited writes; overlapping throttle fires each count
    persisting: Arc<AtomicUsize>,
}

impl<T: StoreValue> StoreInner<T> {
    fn get(&self) -> T {
        self.slot.cached().unwrap_or_else(|| self.initial.clone())
    }

    async fn load(&self) -> StateResult<T> {
        let slot = &self.slot;
        if let Some(value) = slot.cached() {
            return Ok(value);
        }

        let _lock = slot.load_lock.lock().await;
        if let Some(value) = slot.cached() {
            return Ok(value);
        }

        let Some(persistor) = &self.persistor else {
            return Ok(slot.fill(self.initial.clone()));
        };

        let _loading = LoadingGuard::new(slot.as_ref());
        match persistor.on_get(&self.key).await {
            Ok(found) => {
                debug!(key = %self.key, found = found.is_some(), "loaded state from persistor");
                slot.record_error(None);
                Ok(slot.fill(found.unwrap_or_else(|| self.initial.clone())))
            }
            Err(err) => {
                self.reporter.report(&err);
                if self.retry_on_error {
                    Ok(self.get())
                } else {
                    Err(err)
                }
            }
        }
    }

    async fn set(&self, update: Update<T>) -> StateResult<()> {
        // Updaters see the persisted value, not the initial one
        if !self.slot.is_cached() {
            self.load().await?;
        }
        let current = self.get();
        let next = update.resolve(current.clone()).await?;

        if equivalent(&current, &next) {
            // Still counts as set in this session, so later loads keep it
            self.slot.fill(next);
            debug!(key = %self.key, "value unchanged, skipping persistence");
            return Ok(());
        }

        self.slot.replace(next.clone());
        self.persist(next).await
    }

    async fn persist(&self, value: T) -> StateResult<()> {
        let Some(persistor) = &self.persistor else {
            return Ok(());
        };

        if let Some(gate) = &self.gate {
            gate.call(self.key.clone(), value);
            return Ok(());
        }

        match persistor.on_set(&self.key, &value).await {
            Ok(()) => {
                self.reporter.clear();
                debug!(key = %self.key, "persisted state");
                Ok(())
            }
            Err(err) => {
                self.reporter.report(&err);
                if self.retry_on_error {
                    Ok(())
                } else {
                    Err(err)
                }
            }
        }
    }
}

/// Structural comparison through the serialized form
fn equivalent<T: Serialize>(a: &T, b: &T) -> bool {
    match (serde_json::to_value(a), serde_json::to_value(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Clears the shared loading flag when a load ends
struct LoadingGuard<'a, T: StoreValue> {
    slot: &'a Slot<T>,
}

impl<'a, T: StoreValue> LoadingGuard<'a, T> {
    fn new(slot: &'a Slot<T>) -> Self {
        slot.set_loading(true);
        Self { slot }
    }
}

impl<T: StoreValue> Drop for LoadingGuard<'_, T> {
    fn drop(&mut self) {
        self.slot.set_loading(false);
    }
}

/// Handle to a mounted store
///
/// Clones share the same mount. Dropping the last handle cancels any
/// rate-limited write that has not started yet.
pub struct Store<T> {
    inner: Arc<StoreInner<T>>,
}

impl<T> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: StoreValue> Store<T> {
    pub fn key(&self) -> &StateKey {
        &self.inner.key
    }

    /// Current value: the cached value, or the initial value if none
    pub fn get(&self) -> T {
        self.inner.get()
    }

    /// Resolve the value for first use.
    ///
    /// A cached value wins over the persistor, which is then not read at all.
    /// Concurrent loads of the same key share one persistor read.
    pub async fn load(&self) -> StateResult<T> {
        self.inner.load().await
    }

    /// Update the value.
    ///
    /// A store that has not loaded yet loads first, so updaters run on the
    /// persisted value. A failing read aborts the update only when
    /// `retry_on_error` is off.
    ///
    /// The in-memory value changes before persistence is attempted and is
    /// never rolled back. Updater failures are returned as-is; persistence
    /// failures follow the retry policy. Values equal to the current one
    /// are not persisted.
    pub async fn set(&self, update: impl Into<Update<T>>) -> StateResult<()> {
        self.inner.set(update.into()).await
    }

    pub fn meta(&self) -> StoreMeta {
        StoreMeta {
            is_loading: self.inner.slot.is_loading(),
            error: self.inner.slot.last_error(),
            is_persisting: self.is_persisting(),
        }
    }

    /// Value, setter and status in one go
    pub fn state(&self) -> (T, Setter<T>, StoreMeta) {
        (
            self.get(),
            Setter {
                inner: self.inner.clone(),
            },
            self.meta(),
        )
    }

    pub fn is_persisting(&self) -> bool {
        self.inner.persisting.load(Ordering::SeqCst) > 0
    }

    /// Whether a rate-limited write is scheduled but not started
    pub fn has_pending_write(&self) -> bool {
        self.inner
            .gate
            .as_ref()
            .map(|gate| gate.has_pending())
            .unwrap_or(false)
    }

    pub fn phase(&self) -> StorePhase {
        if !self.inner.slot.is_cached() {
            StorePhase::Uninitialized
        } else if self.is_persisting() {
            StorePhase::Persisting
        } else {
            StorePhase::Idle
        }
    }

    pub fn subscribe(&self) -> StoreWatcher<T> {
        StoreWatcher {
            rx: self.inner.slot.subscribe(),
            initial: self.inner.initial.clone(),
        }
    }

    /// Cancel any scheduled rate-limited write
    pub fn cleanup(&self) {
        if let Some(gate) = &self.inner.gate {
            gate.cancel();
        }
    }
}

impl<T: StoreValue + fmt::Debug> fmt::Debug for Store<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("key", &self.inner.key)
            .field("value", &self.get())
            .field("phase", &self.phase())
            .finish()
    }
}

/// Write half of [`Store::state`]
pub struct Setter<T> {
    inner: Arc<StoreInner<T>>,
}

impl<T> Clone for Setter<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: StoreValue> Setter<T> {
    pub async fn set(&self, update: impl Into<Update<T>>) -> StateResult<()> {
        self.inner.set(update.into()).await
    }
}

/// Receives the store value after every in-memory change
pub struct StoreWatcher<T> {
    rx: watch::Receiver<Option<T>>,
    initial: T,
}

impl<T: StoreValue> StoreWatcher<T> {
    pub fn current(&self) -> T {
        self.rx
            .borrow()
            .clone()
            .unwrap_or_else(|| self.initial.clone())
    }

    /// Wait for the next change and return the value after it
    pub async fn changed(&mut self) -> StateResult<T> {
        self.rx
            .changed()
            .await
            .map_err(|_| StateError::Internal("state slot dropped".into()))?;
        Ok(self.current())
    }
}
