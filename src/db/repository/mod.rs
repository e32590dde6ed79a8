//! Database repositories
//!
//! Repository pattern for database access, separating data access logic
//! from the scheduling logic.

pub mod guide_cache;
pub mod playlists;
pub mod run_states;
