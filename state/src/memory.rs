//! In-memory storage backend for tests and ephemeral sessions

use async_trait::async_trait;
use dashmap::DashMap;
use globstate_core::{StateBackend, StateResult};
use std::sync::Arc;

/// In-memory key-value backend
#[derive(Default)]
pub struct MemoryBackend {
    data: DashMap<String, Vec<u8>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
        }
    }
    
    pub fn with_data(data: Vec<(String, Vec<u8>)>) -> Self {
        let backend = Self::new();
        for (key, value) in data {
            backend.data.insert(key, value);
        }
        backend
    }
    
    pub fn len(&self) -> usize {
        self.data.len()
    }
    
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Clone for MemoryBackend {
    fn clone(&self) -> Self {
        let new_backend = Self::new();
        for entry in self.data.iter() {
            new_backend.data.insert(entry.key().clone(), entry.value().clone());
        }
        new_backend
    }
}

#[async_trait]
impl StateBackend for MemoryBackend {
    async fn get(&self, key: &str) -> StateResult<Option<Vec<u8>>> {
        Ok(self.data.get(key).map(|v| v.value().clone()))
    }
    
    async fn set(&self, key: &str, value: &[u8]) -> StateResult<()> {
        self.data.insert(key.to_string(), value.to_vec());
        Ok(())
    }
    
    async fn delete(&self, key: &str) -> StateResult<()> {
        self.data.remove(key);
        Ok(())
    }
    
    async fn exists(&self, key: &str) -> StateResult<bool> {
        Ok(self.data.contains_key(key))
    }
}

/// Thread-safe memory backend wrapper
pub type SharedMemoryBackend = Arc<MemoryBackend>;

/// Create a shared memory backend
pub fn create_memory_backend() -> SharedMemoryBackend {
    Arc::new(MemoryBackend::new())
}
