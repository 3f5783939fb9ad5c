//! Mock search backend for testing
//!
//! Provides an in-memory backend usable wherever a real cluster client is expected.

/// In-memory search backend
pub mod backend;

pub use backend::MockSearchBackend;
