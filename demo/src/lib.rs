//! globstate demo
//! 
//! Example stores modelled on a small web app (counters, a user profile and
//! a search history) plus the commands driving them from the CLI.

pub mod commands;
pub mod slow;
pub mod stores;

pub use commands::*;
pub use slow::*;
pub use stores::{SearchHistory, Theme, UserProfile};
