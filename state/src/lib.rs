//! globstate state management
//! 
//! Shared keyed state with read-through loading, rate-limited persistence
//! and pluggable storage backends.

pub mod registry;
pub mod gate;
pub mod store;
pub mod memory;
pub mod persistent;
pub mod json;

pub use registry::*;
pub use gate::*;
pub use store::*;
pub use memory::*;
pub use persistent::*;
pub use json::*;
