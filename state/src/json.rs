//! JSON persistor over any byte backend
//!
//! Values are stored the way a browser storage persistor stores them:
//! serialized to JSON under the (optionally prefixed) key.

use async_trait::async_trait;
use globstate_core::{Persistor, StateBackend, StateError, StateKey, StateResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// Typed persistor storing values as JSON
pub struct JsonPersistor<B: ?Sized> {
    backend: Arc<B>,
    prefix: String,
}

impl<B: StateBackend + ?Sized> JsonPersistor<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            prefix: String::new(),
        }
    }
    
    /// Store every key as `{prefix}{key}`
    pub fn with_prefix(backend: Arc<B>, prefix: impl Into<String>) -> Self {
        Self {
            backend,
            prefix: prefix.into(),
        }
    }
    
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }
    
    fn storage_key(&self, key: &StateKey) -> String {
        key.prefixed(&self.prefix)
    }
    
    /// Remove the stored value for a key
    pub async fn remove(&self, key: &StateKey) -> StateResult<()> {
        self.backend.delete(&self.storage_key(key)).await
    }
}

impl<B: ?Sized> Clone for JsonPersistor<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            prefix: self.prefix.clone(),
        }
    }
}

#[async_trait]
impl<T, B> Persistor<T> for JsonPersistor<B>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
    B: StateBackend + ?Sized + 'static,
{
    async fn on_get(&self, key: &StateKey) -> StateResult<Option<T>> {
        let Some(bytes) = self.backend.get(&self.storage_key(key)).await? else {
            return Ok(None);
        };
        
        let value: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|e| StateError::Deserialization(format!("{}: {}", key, e)))?;
        if value.is_null() {
            return Ok(None);
        }
        
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| StateError::Deserialization(format!("{}: {}", key, e)))
    }
    
    async fn on_set(&self, key: &StateKey, value: &T) -> StateResult<()> {
        let bytes = serde_json::to_vec(value)?;
        self.backend.set(&self.storage_key(key), &bytes).await
    }
}
