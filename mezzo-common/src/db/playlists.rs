//! Playlist persistence

use crate::db::models::{Playlist, PlaylistId, TrackId};
use crate::Result;
use sqlx::{SqliteConnection, SqliteExecutor};

/// Find a playlist by its source file path, creating it when absent.
/// The name is refreshed on every call.
pub async fn get_or_create(
    conn: &mut SqliteConnection,
    name: &str,
    file_path: &str,
) -> Result<PlaylistId> {
    let existing: Option<(PlaylistId,)> =
        sqlx::query_as("SELECT id FROM playlists WHERE file_path = ?")
            .bind(file_path)
            .fetch_optional(&mut *conn)
            .await?;

    if let Some((id,)) = existing {
        sqlx::query("UPDATE playlists SET name = ? WHERE id = ?")
            .bind(name)
            .bind(id)
            .execute(conn)
            .await?;
        return Ok(id);
    }

    let id: i64 =
        sqlx::query_scalar("INSERT INTO playlists (name, file_path) VALUES (?, ?) RETURNING id")
            .bind(name)
            .bind(file_path)
            .fetch_one(conn)
            .await?;
    Ok(PlaylistId(id))
}

pub async fn clear_tracks(ex: impl SqliteExecutor<'_>, playlist: PlaylistId) -> Result<()> {
    sqlx::query("DELETE FROM playlist_tracks WHERE playlist_id = ?")
        .bind(playlist)
        .execute(ex)
        .await?;
    Ok(())
}

pub async fn add_track(
    ex: impl SqliteExecutor<'_>,
    playlist: PlaylistId,
    track: TrackId,
    position: usize,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO playlist_tracks (playlist_id, track_id, position) VALUES (?, ?, ?)",
    )
    .bind(playlist)
    .bind(track)
    .bind(position as i64)
    .execute(ex)
    .await?;
    Ok(())
}

pub async fn find_all(ex: impl SqliteExecutor<'_>) -> Result<Vec<Playlist>> {
    let playlists =
        sqlx::query_as::<_, Playlist>("SELECT id, name, file_path FROM playlists ORDER BY id")
            .fetch_all(ex)
            .await?;
    Ok(playlists)
}

/// Track ids of a playlist in position order
pub async fn find_tracks(
    ex: impl SqliteExecutor<'_>,
    playlist: PlaylistId,
) -> Result<Vec<TrackId>> {
    let ids: Vec<TrackId> = sqlx::query_scalar(
        "SELECT track_id FROM playlist_tracks WHERE playlist_id = ? ORDER BY position",
    )
    .bind(playlist)
    .fetch_all(ex)
    .await?;
    Ok(ids)
}
