//! Demo commands

use crate::slow::SlowPersistor;
use crate::stores::{self, SearchHistory, Theme, UserProfile, ASYNC_PREFIX};
use anyhow::Context;
use globstate_core::{
    BackendKind, RateLimitConfig, StateBackend, StateConfig, StateKey, StoreOptions,
};
use globstate_state::{
    create_memory_backend, create_registry, create_sled_backend, JsonPersistor, SharedPersistor,
    SharedRegistry, Store, StoreDefinition, StoreValue, Update,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Poll interval while waiting for scheduled writes
const SETTLE_POLL: Duration = Duration::from_millis(25);

/// Backend shared by every store of a demo run
pub type DynBackend = Arc<dyn StateBackend>;

/// Rate limit chosen for the counter command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterPolicy {
    Debounce,
    Throttle,
    /// Every change is written straight through
    Direct,
}

/// Registry, backend and config of one demo run
pub struct DemoContext {
    config: StateConfig,
    registry: SharedRegistry,
    backend: DynBackend,
}

impl DemoContext {
    /// Open the backend selected in the config
    pub fn open(config: StateConfig) -> anyhow::Result<Self> {
        let backend: DynBackend = match config.backend {
            BackendKind::Memory => create_memory_backend(),
            BackendKind::Sled => {
                std::fs::create_dir_all(&config.data_dir).with_context(|| {
                    format!("creating data dir {}", config.data_dir.display())
                })?;
                create_sled_backend(config.data_dir.join("state.db"))?
            }
        };
        info!(name = %config.name, backend = ?config.backend, "opened state backend");
        Ok(Self::with_backend(config, backend))
    }

    pub fn with_backend(config: StateConfig, backend: DynBackend) -> Self {
        Self {
            config,
            registry: create_registry(),
            backend,
        }
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn backend(&self) -> &DynBackend {
        &self.backend
    }

    /// Synchronous-style JSON persistor
    pub fn persistor<T>(&self) -> SharedPersistor<T>
    where
        T: StoreValue + serde::de::DeserializeOwned,
    {
        Arc::new(JsonPersistor::new(self.backend.clone()))
    }

    /// Prefixed JSON persistor behind simulated async latency
    pub fn async_persistor(&self) -> Arc<SlowPersistor<JsonPersistor<dyn StateBackend>>> {
        Arc::new(SlowPersistor::new(JsonPersistor::with_prefix(
            self.backend.clone(),
            ASYNC_PREFIX,
        )))
    }

    /// Apply a per-key override from the config, if any
    pub fn configure<T: StoreValue>(&self, definition: StoreDefinition<T>) -> StoreDefinition<T> {
        match self.config.stores.get(definition.key().as_str()) {
            Some(options) => {
                debug!(key = %definition.key(), "applying configured store options");
                definition.options(options)
            }
            None => definition,
        }
    }
}

/// Wait until no write is scheduled or running
pub async fn settle<T: StoreValue>(store: &Store<T>) {
    while store.has_pending_write() || store.is_persisting() {
        tokio::time::sleep(SETTLE_POLL).await;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CounterReport {
    pub value: i64,
    pub updates: u32,
    pub writes: usize,
    pub elapsed_ms: u128,
}

/// Bump a persisted counter `steps` times and count the physical writes.
///
/// Without an explicit policy the configured async counter store is used.
pub async fn run_counter(
    ctx: &DemoContext,
    steps: u32,
    interval: Duration,
    policy: Option<(CounterPolicy, u64)>,
) -> anyhow::Result<CounterReport> {
    let persistor = ctx.async_persistor();
    let direct = StoreDefinition::new(stores::ASYNC_COUNTER_KEY, 0i64)
        .shared_persistor(persistor.clone());
    let definition = match policy {
        None => ctx.configure(stores::async_counter(persistor.clone())),
        Some((CounterPolicy::Debounce, ms)) => direct.rate_limit(RateLimitConfig::debounce(ms)),
        Some((CounterPolicy::Throttle, ms)) => direct.rate_limit(RateLimitConfig::throttle(ms)),
        Some((CounterPolicy::Direct, _)) => stores::count_persisted(persistor.clone()),
    };

    let store = definition.mount(ctx.registry())?;
    let start = Instant::now();
    let initial = store.load().await?;
    info!(value = initial, "counter loaded");

    for _ in 0..steps {
        store.set(Update::with(|n: &i64| n + 1)).await?;
        tokio::time::sleep(interval).await;
    }
    settle(&store).await;

    Ok(CounterReport {
        value: store.get(),
        updates: steps,
        writes: persistor.writes(),
        elapsed_ms: start.elapsed().as_millis(),
    })
}

/// Edits applied by the profile command
#[derive(Debug, Clone, Default)]
pub struct ProfileEdit {
    pub name: Option<String>,
    pub email: Option<String>,
    pub theme: Option<Theme>,
    pub toggle_notifications: bool,
}

/// Apply profile edits one at a time, each as its own update
pub async fn run_profile(ctx: &DemoContext, edit: ProfileEdit) -> anyhow::Result<UserProfile> {
    let persistor = ctx.async_persistor();
    let store = ctx
        .configure(stores::async_profile(persistor.clone()))
        .mount(ctx.registry())?;
    store.load().await?;

    if let Some(name) = edit.name {
        store
            .set(Update::with(move |p: &UserProfile| UserProfile { name, ..p.touched() }))
            .await?;
    }
    if let Some(email) = edit.email {
        store
            .set(Update::with(move |p: &UserProfile| UserProfile { email, ..p.touched() }))
            .await?;
    }
    if let Some(theme) = edit.theme {
        store
            .set(Update::with(move |p: &UserProfile| {
                let mut next = p.touched();
                next.preferences.theme = theme;
                next
            }))
            .await?;
    }
    if edit.toggle_notifications {
        store
            .set(Update::with(|p: &UserProfile| {
                let mut next = p.touched();
                next.preferences.notifications = !next.preferences.notifications;
                next
            }))
            .await?;
    }

    settle(&store).await;
    info!(writes = persistor.writes(), "profile saved");
    Ok(store.get())
}

/// Record each query in the search history
pub async fn run_search(ctx: &DemoContext, queries: &[String]) -> anyhow::Result<SearchHistory> {
    let store = ctx
        .configure(stores::search_history(ctx.persistor()))
        .mount(ctx.registry())?;
    store.load().await?;

    for query in queries {
        let query = query.clone();
        store
            .set(Update::with(move |h: &SearchHistory| h.record(&query)))
            .await?;
    }

    settle(&store).await;
    Ok(store.get())
}

/// Read a raw value from the backend, as stored by a persistor
pub async fn show(
    ctx: &DemoContext,
    key: &str,
    async_storage: bool,
) -> anyhow::Result<Option<serde_json::Value>> {
    let prefix = if async_storage { ASYNC_PREFIX } else { "" };
    let storage_key = StateKey::from(key).prefixed(prefix);

    let Some(bytes) = ctx.backend().get(&storage_key).await? else {
        return Ok(None);
    };
    let value = serde_json::from_slice(&bytes)
        .with_context(|| format!("decoding stored value for {}", storage_key))?;
    Ok(Some(value))
}

/// Default config carrying the demo stores' rate limits as overrides
pub fn demo_config() -> StateConfig {
    let mut config = StateConfig::default();
    let limits = [
        (stores::ASYNC_COUNTER_KEY, RateLimitConfig::debounce(2000)),
        (stores::ASYNC_PROFILE_KEY, RateLimitConfig::throttle(1000)),
        (stores::SEARCH_HISTORY_KEY, RateLimitConfig::throttle(2000)),
    ];
    for (key, limit) in limits {
        config.stores.insert(
            key.to_string(),
            StoreOptions {
                retry_on_error: true,
                rate_limit: Some(limit),
            },
        );
    }
    config
}
