//! Artwork service
//!
//! Resolves tracks, releases and artists to encoded images through a
//! bounded in-memory cache.

pub mod cache;
pub mod service;

pub use cache::{EntryDesc, ImageCache};
pub use service::ArtworkService;
