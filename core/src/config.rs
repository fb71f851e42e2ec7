//! Configuration types for globstate

use crate::error::StateError;
use crate::traits::StateResult;
use crate::types::RateLimitKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Upper bound accepted for a rate limit window
pub const MAX_RATE_LIMIT_DELAY_MS: u64 = 60 * 60 * 1000;

/// Rate limit applied to persistence writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Debounce or throttle
    #[serde(rename = "type")]
    pub kind: RateLimitKind,
    
    /// Window length in milliseconds
    pub delay_ms: u64,
}

impl RateLimitConfig {
    pub fn debounce(delay_ms: u64) -> Self {
        Self {
            kind: RateLimitKind::Debounce,
            delay_ms,
        }
    }
    
    pub fn throttle(delay_ms: u64) -> Self {
        Self {
            kind: RateLimitKind::Throttle,
            delay_ms,
        }
    }
    
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Per-store behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    /// Swallow persistence failures after reporting them (true)
    /// or return them to the caller (false)
    pub retry_on_error: bool,
    
    /// Optional rate limit for writes
    pub rate_limit: Option<RateLimitConfig>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            retry_on_error: true,
            rate_limit: None,
        }
    }
}

/// Storage backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Memory,
    Sled,
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// Application name for logging
    pub name: String,
    
    /// Data directory for persistent backends
    pub data_dir: PathBuf,
    
    /// Logging level / filter directive
    pub log_level: String,
    
    /// Which backend persists store values
    pub backend: BackendKind,
    
    /// Options applied to stores without an override
    pub defaults: StoreOptions,
    
    /// Per-key overrides
    pub stores: BTreeMap<String, StoreOptions>,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            name: "globstate".to_string(),
            data_dir: PathBuf::from("./data"),
            log_level: "info".to_string(),
            backend: BackendKind::Sled,
            defaults: StoreOptions::default(),
            stores: BTreeMap::new(),
        }
    }
}

impl StateConfig {
    pub fn from_json(json: &str) -> StateResult<Self> {
        let config: StateConfig =
            serde_json::from_str(json).map_err(|e| StateError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
    
    pub fn to_json(&self) -> StateResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
    
    /// Options for a key: its override if present, else the defaults
    pub fn options_for(&self, key: &str) -> StoreOptions {
        self.stores
            .get(key)
            .cloned()
            .unwrap_or_else(|| self.defaults.clone())
    }
    
    pub fn validate(&self) -> StateResult<()> {
        if self.log_level.trim().is_empty() {
            return Err(StateError::Config("log_level must not be empty".into()));
        }
        
        let all = std::iter::once(("defaults", &self.defaults))
            .chain(self.stores.iter().map(|(k, v)| (k.as_str(), v)));
        for (name, options) in all {
            if let Some(limit) = options.rate_limit {
                if limit.delay_ms > MAX_RATE_LIMIT_DELAY_MS {
                    return Err(StateError::Config(format!(
                        "{}: rate limit delay {}ms exceeds {}ms",
                        name, limit.delay_ms, MAX_RATE_LIMIT_DELAY_MS
                    )));
                }
            }
        }
        
        Ok(())
    }
}
