//! Collection pipeline
//!
//! A scrape fans out from [`Target`] to its collectors and from each collector to
//! its queries. All of them share one [`ScrapeContext`](crate::context::ScrapeContext)
//! and write into one sample stream.

pub mod collector;
pub mod query;
pub mod target;

pub use collector::{CachingCollector, Collector, QueryCollector, new_collector};
pub use query::Query;
pub use target::{SCRAPE_DURATION_NAME, Target, UP_METRIC_NAME};
