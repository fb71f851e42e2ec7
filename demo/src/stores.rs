//! Demo store definitions
//!
//! Each function returns the definition of one store; mount it against a
//! registry to use it.

use chrono::Utc;
use globstate_core::RateLimitConfig;
use globstate_state::{SharedPersistor, StoreDefinition};
use serde::{Deserialize, Serialize};

pub const COUNT_KEY: &str = "@app/count";
pub const COUNT_PERSISTED_KEY: &str = "@app/count-persisted";
pub const ASYNC_COUNTER_KEY: &str = "@app/async-counter";
pub const ASYNC_PROFILE_KEY: &str = "@app/async-profile";
pub const SEARCH_HISTORY_KEY: &str = "@app/search-history";

/// Storage prefix used by the async storage persistor
pub const ASYNC_PREFIX: &str = "async_";

/// Number of queries kept in the search history
pub const SEARCH_HISTORY_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    pub theme: Theme,
    pub notifications: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub email: String,
    pub preferences: Preferences,
    /// RFC 3339 timestamp of the last edit
    pub last_updated: String,
}

impl Default for UserProfile {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: "Guest User".to_string(),
            email: String::new(),
            preferences: Preferences {
                theme: Theme::Light,
                notifications: true,
            },
            last_updated: Utc::now().to_rfc3339(),
        }
    }
}

impl UserProfile {
    /// Copy with `last_updated` set to now
    pub fn touched(&self) -> Self {
        Self {
            last_updated: Utc::now().to_rfc3339(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHistory {
    pub queries: Vec<String>,
    pub last_search: String,
    pub search_count: u64,
}

impl SearchHistory {
    /// History after searching `query`; blank queries change nothing
    pub fn record(&self, query: &str) -> Self {
        let query = query.trim();
        if query.is_empty() {
            return self.clone();
        }

        let skip = (self.queries.len() + 1).saturating_sub(SEARCH_HISTORY_LIMIT);
        let mut queries: Vec<String> = self.queries.iter().skip(skip).cloned().collect();
        queries.push(query.to_string());

        Self {
            queries,
            last_search: query.to_string(),
            search_count: self.search_count + 1,
        }
    }
}

/// In-memory counter, no persistence
pub fn count() -> StoreDefinition<i64> {
    StoreDefinition::new(COUNT_KEY, 0)
}

/// Counter written through on every change
pub fn count_persisted(persistor: SharedPersistor<i64>) -> StoreDefinition<i64> {
    StoreDefinition::new(COUNT_PERSISTED_KEY, 0).shared_persistor(persistor)
}

/// Counter persisted 2s after the last change
pub fn async_counter(persistor: SharedPersistor<i64>) -> StoreDefinition<i64> {
    StoreDefinition::new(ASYNC_COUNTER_KEY, 0)
        .shared_persistor(persistor)
        .rate_limit(RateLimitConfig::debounce(2000))
}

/// Profile persisted at most once per second
pub fn async_profile(persistor: SharedPersistor<UserProfile>) -> StoreDefinition<UserProfile> {
    StoreDefinition::new(ASYNC_PROFILE_KEY, UserProfile::default())
        .shared_persistor(persistor)
        .rate_limit(RateLimitConfig::throttle(1000))
}

/// Search history persisted at most once every 2s
pub fn search_history(persistor: SharedPersistor<SearchHistory>) -> StoreDefinition<SearchHistory> {
    StoreDefinition::new(SEARCH_HISTORY_KEY, SearchHistory::default())
        .shared_persistor(persistor)
        .rate_limit(RateLimitConfig::throttle(2000))
}
