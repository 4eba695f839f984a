//! Media scanner
//!
//! A multi-step pipeline that reconciles the filesystem with the catalog:
//! discovery and tag parsing, removed-file and orphan cleanup, duplicate
//! detection, artwork/lyrics/playlist association, artist reconciliation,
//! maintenance passes and the similarity engine reload.

pub mod context;
pub mod paths;
pub mod schedule;
pub mod service;
mod steps;

pub use context::{ScanContext, ScannerSettings};
pub use service::{ScannerService, ScannerState, Status};
