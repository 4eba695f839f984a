//! # mezzo core
//!
//! The mezzo music library server: media scanner pipeline, artwork service
//! with its bounded cache, and the SOM-based recommendation engine, all
//! sharing the SQLite catalog from `mezzo-common`.

pub mod artwork;
pub mod imaging;
pub mod metadata;
pub mod recommend;
pub mod scanner;

pub use artwork::ArtworkService;
pub use recommend::FeatureEngine;
pub use scanner::ScannerService;
