//! Track persistence

use crate::db::models::{ArtworkId, MediaLibraryId, ReleaseId, Track, TrackId};
use crate::Result;
use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqliteExecutor};

const TRACK_COLUMNS: &str = "id, absolute_path, file_size, last_write_time, content_hash, \
     mb_track_id, name, duration_secs, track_number, disc_number, total_tracks, \
     release_id, media_library_id, artwork_id, has_embedded_artwork";

/// Fields written by the file scan step
#[derive(Debug, Clone)]
pub struct NewTrack<'a> {
    pub absolute_path: &'a str,
    pub file_size: i64,
    pub last_write_time: DateTime<Utc>,
    pub content_hash: Option<&'a str>,
    pub mb_track_id: Option<&'a str>,
    pub name: Option<&'a str>,
    pub duration_secs: f64,
    pub track_number: Option<i64>,
    pub disc_number: Option<i64>,
    pub total_tracks: Option<i64>,
    pub release_id: Option<ReleaseId>,
    pub media_library_id: MediaLibraryId,
    pub has_embedded_artwork: bool,
}

/// Insert or update a track keyed by absolute path, returning its id.
/// An update keeps the existing artwork association.
pub async fn upsert(ex: impl SqliteExecutor<'_>, track: &NewTrack<'_>) -> Result<TrackId> {
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO tracks (absolute_path, file_size, last_write_time, content_hash,
            mb_track_id, name, duration_secs, track_number, disc_number, total_tracks,
            release_id, media_library_id, has_embedded_artwork)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(absolute_path) DO UPDATE SET
            file_size = excluded.file_size,
            last_write_time = excluded.last_write_time,
            content_hash = excluded.content_hash,
            mb_track_id = excluded.mb_track_id,
            name = excluded.name,
            duration_secs = excluded.duration_secs,
            track_number = excluded.track_number,
            disc_number = excluded.disc_number,
            total_tracks = excluded.total_tracks,
            release_id = excluded.release_id,
            media_library_id = excluded.media_library_id,
            has_embedded_artwork = excluded.has_embedded_artwork
        RETURNING id
        "#,
    )
    .bind(track.absolute_path)
    .bind(track.file_size)
    .bind(track.last_write_time)
    .bind(track.content_hash)
    .bind(track.mb_track_id)
    .bind(track.name)
    .bind(track.duration_secs)
    .bind(track.track_number)
    .bind(track.disc_number)
    .bind(track.total_tracks)
    .bind(track.release_id)
    .bind(track.media_library_id)
    .bind(track.has_embedded_artwork)
    .fetch_one(ex)
    .await?;

    Ok(TrackId(id))
}

pub async fn find_by_id(ex: impl SqliteExecutor<'_>, id: TrackId) -> Result<Option<Track>> {
    let track =
        sqlx::query_as::<_, Track>(&format!("SELECT {TRACK_COLUMNS} FROM tracks WHERE id = ?"))
            .bind(id)
            .fetch_optional(ex)
            .await?;
    Ok(track)
}

pub async fn find_by_path(ex: impl SqliteExecutor<'_>, path: &str) -> Result<Option<Track>> {
    let track = sqlx::query_as::<_, Track>(&format!(
        "SELECT {TRACK_COLUMNS} FROM tracks WHERE absolute_path = ?"
    ))
    .bind(path)
    .fetch_optional(ex)
    .await?;
    Ok(track)
}

pub async fn exists(ex: impl SqliteExecutor<'_>, id: TrackId) -> Result<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM tracks WHERE id = ?")
        .bind(id)
        .fetch_optional(ex)
        .await?;
    Ok(found.is_some())
}

pub async fn count(ex: impl SqliteExecutor<'_>) -> Result<usize> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tracks")
        .fetch_one(ex)
        .await?;
    Ok(count as usize)
}

/// One page of (id, path) pairs with id greater than `after`, ordered by id.
/// Keyset pagination stays stable while rows are being deleted.
pub async fn find_paths_after(
    ex: impl SqliteExecutor<'_>,
    after: TrackId,
    limit: usize,
) -> Result<Vec<(TrackId, String)>> {
    let rows: Vec<(TrackId, String)> =
        sqlx::query_as("SELECT id, absolute_path FROM tracks WHERE id > ? ORDER BY id LIMIT ?")
            .bind(after)
            .bind(limit as i64)
            .fetch_all(ex)
            .await?;
    Ok(rows)
}

/// Remove a track and every row depending on it
pub async fn remove(conn: &mut SqliteConnection, id: TrackId) -> Result<()> {
    sqlx::query("DELETE FROM track_artist_links WHERE track_id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM track_clusters WHERE track_id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM track_features WHERE track_id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM track_lyrics WHERE track_id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM playlist_tracks WHERE track_id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM tracks WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn set_artwork(
    ex: impl SqliteExecutor<'_>,
    id: TrackId,
    artwork: ArtworkId,
) -> Result<()> {
    sqlx::query("UPDATE tracks SET artwork_id = ? WHERE id = ?")
        .bind(artwork)
        .bind(id)
        .execute(ex)
        .await?;
    Ok(())
}

/// Tracks not yet associated with any artwork
pub async fn find_without_artwork(ex: impl SqliteExecutor<'_>) -> Result<Vec<Track>> {
    let tracks = sqlx::query_as::<_, Track>(&format!(
        "SELECT {TRACK_COLUMNS} FROM tracks WHERE artwork_id IS NULL ORDER BY id"
    ))
    .fetch_all(ex)
    .await?;
    Ok(tracks)
}

/// First track of a release in (disc, track, id) order
pub async fn find_first_of_release(
    ex: impl SqliteExecutor<'_>,
    release: ReleaseId,
) -> Result<Option<Track>> {
    let track = sqlx::query_as::<_, Track>(&format!(
        "SELECT {TRACK_COLUMNS} FROM tracks WHERE release_id = ?
         ORDER BY disc_number, track_number, id LIMIT 1"
    ))
    .bind(release)
    .fetch_optional(ex)
    .await?;
    Ok(track)
}

/// First track of a release carrying an embedded picture
pub async fn find_embedded_artwork_track(
    ex: impl SqliteExecutor<'_>,
    release: ReleaseId,
) -> Result<Option<TrackId>> {
    let id: Option<TrackId> = sqlx::query_scalar(
        "SELECT id FROM tracks WHERE release_id = ? AND has_embedded_artwork
         ORDER BY disc_number, track_number, id LIMIT 1",
    )
    .bind(release)
    .fetch_optional(ex)
    .await?;
    Ok(id)
}

/// Tracks that have no feature record yet
pub async fn find_paths_without_features(
    ex: impl SqliteExecutor<'_>,
) -> Result<Vec<(TrackId, String)>> {
    let rows: Vec<(TrackId, String)> = sqlx::query_as(
        "SELECT id, absolute_path FROM tracks
         WHERE NOT EXISTS (SELECT 1 FROM track_features f WHERE f.track_id = tracks.id)
         ORDER BY id",
    )
    .fetch_all(ex)
    .await?;
    Ok(rows)
}

/// Paths of every track linked to an artist, for locating artist assets
pub async fn find_paths_for_artist(
    ex: impl SqliteExecutor<'_>,
    artist: crate::db::models::ArtistId,
) -> Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT DISTINCT t.absolute_path FROM tracks t
         JOIN track_artist_links l ON l.track_id = t.id
         WHERE l.artist_id = ? ORDER BY t.absolute_path",
    )
    .bind(artist)
    .fetch_all(ex)
    .await?;
    Ok(rows.into_iter().map(|(p,)| p).collect())
}

/// Ids grouped by duplicated content hash, ordered by (hash, id)
pub async fn find_hash_duplicates(
    ex: impl SqliteExecutor<'_>,
) -> Result<Vec<(String, TrackId)>> {
    let rows: Vec<(String, TrackId)> = sqlx::query_as(
        "SELECT content_hash, id FROM tracks
         WHERE content_hash IS NOT NULL
           AND content_hash IN (
               SELECT content_hash FROM tracks WHERE content_hash IS NOT NULL
               GROUP BY content_hash HAVING COUNT(*) > 1)
         ORDER BY content_hash, id",
    )
    .fetch_all(ex)
    .await?;
    Ok(rows)
}

/// Ids grouped by duplicated MusicBrainz track id, ordered by (mbid, id)
pub async fn find_mbid_duplicates(
    ex: impl SqliteExecutor<'_>,
) -> Result<Vec<(String, TrackId)>> {
    let rows: Vec<(String, TrackId)> = sqlx::query_as(
        "SELECT mb_track_id, id FROM tracks
         WHERE mb_track_id IS NOT NULL
           AND mb_track_id IN (
               SELECT mb_track_id FROM tracks WHERE mb_track_id IS NOT NULL
               GROUP BY mb_track_id HAVING COUNT(*) > 1)
         ORDER BY mb_track_id, id",
    )
    .fetch_all(ex)
    .await?;
    Ok(rows)
}
