//! External lyrics sidecar records

use crate::db::models::TrackId;
use crate::Result;
use sqlx::SqliteExecutor;

pub async fn upsert(ex: impl SqliteExecutor<'_>, track: TrackId, lyrics_path: &str) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO track_lyrics (track_id, lyrics_path) VALUES (?, ?)")
        .bind(track)
        .bind(lyrics_path)
        .execute(ex)
        .await?;
    Ok(())
}

pub async fn find_for_track(ex: impl SqliteExecutor<'_>, track: TrackId) -> Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT lyrics_path FROM track_lyrics WHERE track_id = ? ORDER BY lyrics_path",
    )
    .bind(track)
    .fetch_all(ex)
    .await?;
    Ok(rows.into_iter().map(|(p,)| p).collect())
}
