//! Recommendation service
//!
//! A self-organizing map trained on per-track acoustic features, persisted
//! across restarts, answering similar-track / release / artist queries.

pub mod cache;
pub mod engine;
pub mod features;
pub mod som;

pub use engine::{FeatureEngine, TrainProgress};
