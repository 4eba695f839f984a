//! Catalog access
//!
//! A thin pool wrapper plus per-entity query modules. Query functions take
//! either any SQLite executor (single statement) or a `&mut SqliteConnection`
//! (multi-statement work meant to run inside a caller-managed transaction).

pub mod artists;
pub mod artworks;
pub mod clusters;
pub mod features;
pub mod libraries;
pub mod lyrics;
pub mod models;
pub mod playlists;
pub mod releases;
pub mod schema;
pub mod tracks;

use crate::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::Path;

/// Shared handle on the catalog database
#[derive(Clone)]
pub struct Db {
    pool: SqlitePool,
}

impl Db {
    /// Open (or create) the catalog file and initialize the schema
    pub async fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
        tracing::debug!(url = %db_url, "Connecting to catalog database");

        let pool = SqlitePoolOptions::new().connect(&db_url).await?;
        schema::initialize_schema(&pool).await?;

        Ok(Self { pool })
    }

    /// Open an in-memory catalog, for tests
    pub async fn open_in_memory() -> Result<Self> {
        // A single connection so every query sees the same in-memory database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        schema::initialize_schema(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
