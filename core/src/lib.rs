//! globstate Core Library
//! 
//! Core types, traits, and abstractions for keyed global state.
//! This crate defines the persistence adapter contracts that the store
//! controller in `globstate-state` is written against.

pub mod types;
pub mod traits;
pub mod error;
pub mod config;

pub use types::*;
pub use traits::*;
pub use error::*;
pub use config::*;
