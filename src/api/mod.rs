//! Public API module

/// Embeddable exporter facade
pub mod public;
