//! Core types for globstate
//! 
//! Defines the identifiers and small enums shared by every crate.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator used when a structured key is flattened into a cache key
pub const KEY_SEPARATOR: &str = ",";

/// Unique identifier for a piece of shared state
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateKey(String);

impl StateKey {
    pub fn new(key: impl Into<String>) -> Self {
        StateKey(key.into())
    }
    
    /// Build a key from structured parts, e.g. `["user", "42"]` -> `user,42`
    pub fn compound<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = parts
            .into_iter()
            .map(|p| p.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(KEY_SEPARATOR);
        StateKey(joined)
    }
    
    pub fn as_str(&self) -> &str {
        &self.0
    }
    
    /// Key with a storage prefix applied, as used by prefixed backends
    pub fn prefixed(&self, prefix: &str) -> String {
        format!("{}{}", prefix, self.0)
    }
    
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for StateKey {
    fn from(key: &str) -> Self {
        StateKey::new(key)
    }
}

impl From<String> for StateKey {
    fn from(key: String) -> Self {
        StateKey(key)
    }
}

impl AsRef<str> for StateKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateKey({})", self.0)
    }
}

/// Rate limiting strategy for persistence writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitKind {
    /// Only the last call within a quiet window fires
    Debounce,
    /// At most one call per window, plus one trailing call
    Throttle,
}

impl fmt::Display for RateLimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimitKind::Debounce => f.write_str("debounce"),
            RateLimitKind::Throttle => f.write_str("throttle"),
        }
    }
}

/// Lifecycle phase of a store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorePhase {
    /// Nothing cached for the key yet
    Uninitialized,
    /// Loaded, no persistence call executing
    Idle,
    /// Loaded, a rate-limited persistence call is executing
    Persisting,
}

impl StorePhase {
    pub fn is_loaded(&self) -> bool {
        !matches!(self, StorePhase::Uninitialized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    
    #[test]
    fn test_compound_key() {
        let key = StateKey::compound(["user", "42", "profile"]);
        assert_eq!(key.as_str(), "user,42,profile");
        
        let single = StateKey::compound(["@app/count"]);
        assert_eq!(single, StateKey::from("@app/count"));
    }
    
    #[test]
    fn test_prefixed_key() {
        let key = StateKey::from("@app/async-counter");
        assert_eq!(key.prefixed("async_"), "async_@app/async-counter");
    }
    
    #[test]
    fn test_store_phase_is_loaded() {
        assert!(!StorePhase::Uninitialized.is_loaded());
        assert!(StorePhase::Idle.is_loaded());
        assert!(StorePhase::Persisting.is_loaded());
    }
    
    #[test]
    fn test_rate_limit_kind_serde() {
        let json = serde_json::to_string(&RateLimitKind::Throttle).unwrap();
        assert_eq!(json, "\"throttle\"");
        let kind: RateLimitKind = serde_json::from_str("\"debounce\"").unwrap();
        assert_eq!(kind, RateLimitKind::Debounce);
    }
}
