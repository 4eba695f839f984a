//! Error type shared across the mezzo crates
//!
//! Catalog and filesystem failures convert implicitly; the remaining
//! variants name the subsystems that can actually fail: configuration
//! loading, media library validation, catalog records that no longer parse,
//! and the similarity engine's training/cache path. Per-file scan failures
//! are not errors at this level; they are recorded in the scan statistics.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// The catalog database failed; a scan hitting this aborts
    #[error("Catalog database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Bad or unreadable configuration; the process must not start
    #[error("Configuration error: {0}")]
    Config(String),

    /// A media library definition failed validation (empty name, relative
    /// or missing root, overlapping roots)
    #[error("Invalid media library: {0}")]
    InvalidLibrary(String),

    /// A stored catalog row no longer makes sense (unparseable feature
    /// map, artwork row missing its source fields)
    #[error("Corrupt catalog record: {0}")]
    CorruptRecord(String),

    /// Similarity engine failure: malformed cache files or a dimension
    /// mismatch while assembling the network
    #[error("Similarity engine error: {0}")]
    Engine(String),
}
