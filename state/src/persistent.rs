//! Persistent storage backend using sled database

use async_trait::async_trait;
use globstate_core::{StateBackend, StateError, StateResult};
use sled::{Db, Tree};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

const STATE_TREE: &str = "state";

/// Persistent key-value backend backed by sled
pub struct SledBackend {
    db: Db,
    state: Tree,
}

impl SledBackend {
    pub fn open<P: AsRef<Path>>(path: P) -> StateResult<Self> {
        let db = sled::open(path.as_ref()).map_err(|e| StateError::Storage(e.to_string()))?;
        
        let state = db
            .open_tree(STATE_TREE)
            .map_err(|e| StateError::Storage(e.to_string()))?;
        
        debug!(path = %path.as_ref().display(), entries = state.len(), "opened sled backend");
        
        Ok(Self { db, state })
    }
    
    /// All keys currently stored
    pub fn keys(&self) -> StateResult<Vec<String>> {
        self.state
            .iter()
            .keys()
            .map(|result| {
                result
                    .map(|k| String::from_utf8_lossy(&k).into_owned())
                    .map_err(|e| StateError::Storage(e.to_string()))
            })
            .collect()
    }
    
    /// Flush pending writes to disk
    pub fn flush(&self) -> StateResult<()> {
        self.db
            .flush()
            .map(|_| ())
            .map_err(|e| StateError::Storage(e.to_string()))
    }
    
    /// Get database size estimate
    pub fn size_estimate(&self) -> u64 {
        self.state.len() as u64
    }
}

#[async_trait]
impl StateBackend for SledBackend {
    async fn get(&self, key: &str) -> StateResult<Option<Vec<u8>>> {
        self.state
            .get(key.as_bytes())
            .map(|opt| opt.map(|v| v.to_vec()))
            .map_err(|e| StateError::Storage(e.to_string()))
    }
    
    async fn set(&self, key: &str, value: &[u8]) -> StateResult<()> {
        self.state
            .insert(key.as_bytes(), value)
            .map_err(|e| StateError::Storage(e.to_string()))?;
        self.flush()
    }
    
    async fn delete(&self, key: &str) -> StateResult<()> {
        self.state
            .remove(key.as_bytes())
            .map_err(|e| StateError::Storage(e.to_string()))?;
        Ok(())
    }
    
    async fn exists(&self, key: &str) -> StateResult<bool> {
        self.state
            .contains_key(key.as_bytes())
            .map_err(|e| StateError::Storage(e.to_string()))
    }
}

/// Thread-safe persistent backend wrapper
pub type SharedSledBackend = Arc<SledBackend>;

/// Create a shared persistent backend
pub fn create_sled_backend<P: AsRef<Path>>(path: P) -> StateResult<SharedSledBackend> {
    Ok(Arc::new(SledBackend::open(path)?))
}
