//! Catalog schema
//!
//! All DDL is idempotent (`IF NOT EXISTS`) and executed at pool creation.
//! The statistics views are also re-created by the scanner's maintenance
//! steps after large catalog mutations.

use crate::Result;
use sqlx::SqlitePool;

const TABLES: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS media_libraries (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE COLLATE NOCASE,
        root_path TEXT NOT NULL UNIQUE,
        track_count INTEGER NOT NULL DEFAULT 0,
        total_duration_secs REAL NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tracks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        absolute_path TEXT NOT NULL UNIQUE,
        file_size INTEGER NOT NULL,
        last_write_time TEXT NOT NULL,
        content_hash TEXT,
        mb_track_id TEXT,
        name TEXT,
        duration_secs REAL NOT NULL,
        track_number INTEGER,
        disc_number INTEGER,
        total_tracks INTEGER,
        release_id INTEGER,
        media_library_id INTEGER NOT NULL,
        artwork_id INTEGER,
        has_embedded_artwork INTEGER NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS releases (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        mb_release_id TEXT,
        total_discs INTEGER NOT NULL DEFAULT 1,
        artwork_id INTEGER
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS artists (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        mb_artist_id TEXT,
        artwork_id INTEGER
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS track_artist_links (
        track_id INTEGER NOT NULL,
        artist_id INTEGER NOT NULL,
        link_type TEXT NOT NULL,
        PRIMARY KEY (track_id, artist_id, link_type)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS artworks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        source_kind TEXT NOT NULL,
        file_path TEXT,
        track_id INTEGER,
        picture_index INTEGER
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS cluster_types (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS clusters (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        cluster_type_id INTEGER NOT NULL,
        name TEXT NOT NULL,
        track_count INTEGER NOT NULL DEFAULT 0,
        UNIQUE (cluster_type_id, name)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS track_clusters (
        track_id INTEGER NOT NULL,
        cluster_id INTEGER NOT NULL,
        PRIMARY KEY (track_id, cluster_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS track_features (
        track_id INTEGER PRIMARY KEY,
        features_json TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS track_lyrics (
        track_id INTEGER NOT NULL,
        lyrics_path TEXT NOT NULL,
        PRIMARY KEY (track_id, lyrics_path)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS playlists (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        file_path TEXT NOT NULL UNIQUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS playlist_tracks (
        playlist_id INTEGER NOT NULL,
        track_id INTEGER NOT NULL,
        position INTEGER NOT NULL,
        PRIMARY KEY (playlist_id, position)
    )
    "#,
];

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_tracks_release ON tracks (release_id)",
    "CREATE INDEX IF NOT EXISTS idx_tracks_library ON tracks (media_library_id)",
    "CREATE INDEX IF NOT EXISTS idx_tracks_content_hash ON tracks (content_hash)",
    "CREATE INDEX IF NOT EXISTS idx_tracks_mb_track_id ON tracks (mb_track_id)",
    "CREATE INDEX IF NOT EXISTS idx_links_artist ON track_artist_links (artist_id)",
    "CREATE INDEX IF NOT EXISTS idx_track_clusters_cluster ON track_clusters (cluster_id)",
    "CREATE INDEX IF NOT EXISTS idx_artworks_file_path ON artworks (file_path)",
    "CREATE INDEX IF NOT EXISTS idx_artworks_track ON artworks (track_id)",
];

/// Statements used both here and by the view re-creation maintenance step.
pub const VIEWS: &[(&str, &str)] = &[
    (
        "release_track_counts",
        r#"
        CREATE VIEW IF NOT EXISTS release_track_counts AS
        SELECT r.id AS release_id, COUNT(t.id) AS track_count
        FROM releases r LEFT JOIN tracks t ON t.release_id = r.id
        GROUP BY r.id
        "#,
    ),
    (
        "artist_track_counts",
        r#"
        CREATE VIEW IF NOT EXISTS artist_track_counts AS
        SELECT a.id AS artist_id, COUNT(DISTINCT l.track_id) AS track_count
        FROM artists a LEFT JOIN track_artist_links l ON l.artist_id = a.id
        GROUP BY a.id
        "#,
    ),
];

/// Create all tables, indexes and views
pub async fn initialize_schema(pool: &SqlitePool) -> Result<()> {
    for ddl in TABLES {
        sqlx::query(ddl).execute(pool).await?;
    }
    for ddl in INDEXES {
        sqlx::query(ddl).execute(pool).await?;
    }
    for (_, ddl) in VIEWS {
        sqlx::query(ddl).execute(pool).await?;
    }
    tracing::debug!("Catalog schema initialized");
    Ok(())
}
