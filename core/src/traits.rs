//! Core traits defining globstate interfaces
//! 
//! A store never owns its storage: it calls out through these traits and
//! nothing here calls back into a store.

use crate::types::StateKey;
use async_trait::async_trait;

/// Result type for globstate operations
pub type StateResult<T> = Result<T, crate::error::StateError>;

/// Byte-level key-value storage backend
#[async_trait]
pub trait StateBackend: Send + Sync {
    /// Get a value by key
    async fn get(&self, key: &str) -> StateResult<Option<Vec<u8>>>;
    
    /// Set a value
    async fn set(&self, key: &str, value: &[u8]) -> StateResult<()>;
    
    /// Delete a key
    async fn delete(&self, key: &str) -> StateResult<()>;
    
    /// Check if a key exists
    async fn exists(&self, key: &str) -> StateResult<bool> {
        Ok(self.get(key).await?.is_some())
    }
}

/// Typed persistence adapter backing a store
///
/// Synchronous adapters implement the methods without awaiting anything.
#[async_trait]
pub trait Persistor<T>: Send + Sync {
    /// Read the persisted value; `None` makes the store use its initial value
    async fn on_get(&self, key: &StateKey) -> StateResult<Option<T>>;
    
    /// Persist a new value
    async fn on_set(&self, key: &StateKey, value: &T) -> StateResult<()>;
}
