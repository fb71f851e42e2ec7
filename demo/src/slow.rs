//! Persistor wrapper simulating slow async storage

use async_trait::async_trait;
use globstate_core::{Persistor, StateKey, StateResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::info;

/// Default simulated latency of a write
pub const DEFAULT_WRITE_LATENCY: Duration = Duration::from_millis(300);

/// Default simulated latency of a read
pub const DEFAULT_READ_LATENCY: Duration = Duration::from_millis(500);

/// Delays every call to the wrapped persistor and counts physical writes
pub struct SlowPersistor<P> {
    inner: P,
    read_latency: Duration,
    write_latency: Duration,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl<P> SlowPersistor<P> {
    pub fn new(inner: P) -> Self {
        Self::with_latency(inner, DEFAULT_READ_LATENCY, DEFAULT_WRITE_LATENCY)
    }

    pub fn with_latency(inner: P, read_latency: Duration, write_latency: Duration) -> Self {
        Self {
            inner,
            read_latency,
            write_latency,
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    /// Completed writes
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Completed reads
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

#[async_trait]
impl<T, P> Persistor<T> for SlowPersistor<P>
where
    T: Send + Sync + 'static,
    P: Persistor<T>,
{
    async fn on_get(&self, key: &StateKey) -> StateResult<Option<T>> {
        tokio::time::sleep(self.read_latency).await;
        let value = self.inner.on_get(key).await?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        info!(key = %key, found = value.is_some(), "async storage read");
        Ok(value)
    }

    async fn on_set(&self, key: &StateKey, value: &T) -> StateResult<()> {
        tokio::time::sleep(self.write_latency).await;
        self.inner.on_set(key, value).await?;
        let total = self.writes.fetch_add(1, Ordering::SeqCst) + 1;
        info!(key = %key, writes = total, "async storage write");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use globstate_core::StateBackend;
    use globstate_state::{create_memory_backend, JsonPersistor};
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_latency_and_counters() {
        let backend = create_memory_backend();
        let persistor = SlowPersistor::new(JsonPersistor::with_prefix(backend, "async_"));
        let key = StateKey::from("@app/async-counter");
        let start = Instant::now();

        Persistor::<u32>::on_set(&persistor, &key, &9).await.unwrap();
        assert!(start.elapsed() >= DEFAULT_WRITE_LATENCY);

        let value = Persistor::<u32>::on_get(&persistor, &key).await.unwrap();
        assert_eq!(value, Some(9));
        assert!(start.elapsed() >= DEFAULT_WRITE_LATENCY + DEFAULT_READ_LATENCY);

        assert_eq!(persistor.writes(), 1);
        assert_eq!(persistor.reads(), 1);
        assert!(persistor.inner().backend().exists("async_@app/async-counter").await.unwrap());
    }
}
