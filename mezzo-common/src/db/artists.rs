//! Artist persistence and track-artist links

use crate::db::models::{Artist, ArtistId, ArtworkId, TrackArtistLinkType, TrackId};
use crate::Result;
use sqlx::{SqliteConnection, SqliteExecutor};

/// Find an artist by MusicBrainz id (preferred) or exact name, creating it
/// when absent.
pub async fn get_or_create(
    conn: &mut SqliteConnection,
    name: &str,
    mb_artist_id: Option<&str>,
) -> Result<ArtistId> {
    let existing: Option<(ArtistId,)> = match mb_artist_id {
        Some(mbid) => sqlx::query_as("SELECT id FROM artists WHERE mb_artist_id = ?")
            .bind(mbid)
            .fetch_optional(&mut *conn)
            .await?,
        None => {
            sqlx::query_as("SELECT id FROM artists WHERE name = ? AND mb_artist_id IS NULL")
                .bind(name)
                .fetch_optional(&mut *conn)
                .await?
        }
    };

    if let Some((id,)) = existing {
        return Ok(id);
    }

    let id: i64 =
        sqlx::query_scalar("INSERT INTO artists (name, mb_artist_id) VALUES (?, ?) RETURNING id")
            .bind(name)
            .bind(mb_artist_id)
            .fetch_one(conn)
            .await?;

    Ok(ArtistId(id))
}

pub async fn find_by_id(ex: impl SqliteExecutor<'_>, id: ArtistId) -> Result<Option<Artist>> {
    let artist = sqlx::query_as::<_, Artist>(
        "SELECT id, name, mb_artist_id, artwork_id FROM artists WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(ex)
    .await?;
    Ok(artist)
}

pub async fn exists(ex: impl SqliteExecutor<'_>, id: ArtistId) -> Result<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM artists WHERE id = ?")
        .bind(id)
        .fetch_optional(ex)
        .await?;
    Ok(found.is_some())
}

pub async fn link(
    ex: impl SqliteExecutor<'_>,
    track: TrackId,
    artist: ArtistId,
    link_type: TrackArtistLinkType,
) -> Result<()> {
    sqlx::query(
        "INSERT OR IGNORE INTO track_artist_links (track_id, artist_id, link_type) VALUES (?, ?, ?)",
    )
    .bind(track)
    .bind(artist)
    .bind(link_type.as_str())
    .execute(ex)
    .await?;
    Ok(())
}

pub async fn clear_links_for_track(ex: impl SqliteExecutor<'_>, track: TrackId) -> Result<()> {
    sqlx::query("DELETE FROM track_artist_links WHERE track_id = ?")
        .bind(track)
        .execute(ex)
        .await?;
    Ok(())
}

/// (artist, role) pairs of a track, in stable order
pub async fn find_links_for_track(
    ex: impl SqliteExecutor<'_>,
    track: TrackId,
) -> Result<Vec<(ArtistId, TrackArtistLinkType)>> {
    let rows: Vec<(ArtistId, String)> = sqlx::query_as(
        "SELECT artist_id, link_type FROM track_artist_links
         WHERE track_id = ? ORDER BY artist_id, link_type",
    )
    .bind(track)
    .fetch_all(ex)
    .await?;

    Ok(rows
        .into_iter()
        .filter_map(|(artist, link_type)| {
            TrackArtistLinkType::from_str(&link_type).map(|lt| (artist, lt))
        })
        .collect())
}

/// Artists linked to no track
pub async fn find_orphans(ex: impl SqliteExecutor<'_>) -> Result<Vec<ArtistId>> {
    let ids: Vec<ArtistId> = sqlx::query_scalar(
        "SELECT id FROM artists
         WHERE NOT EXISTS (SELECT 1 FROM track_artist_links l WHERE l.artist_id = artists.id)
         ORDER BY id",
    )
    .fetch_all(ex)
    .await?;
    Ok(ids)
}

pub async fn remove(ex: impl SqliteExecutor<'_>, id: ArtistId) -> Result<()> {
    sqlx::query("DELETE FROM artists WHERE id = ?")
        .bind(id)
        .execute(ex)
        .await?;
    Ok(())
}

pub async fn set_artwork(
    ex: impl SqliteExecutor<'_>,
    id: ArtistId,
    artwork: ArtworkId,
) -> Result<()> {
    sqlx::query("UPDATE artists SET artwork_id = ? WHERE id = ?")
        .bind(artwork)
        .bind(id)
        .execute(ex)
        .await?;
    Ok(())
}

pub async fn set_mb_artist_id(
    ex: impl SqliteExecutor<'_>,
    id: ArtistId,
    mb_artist_id: &str,
) -> Result<()> {
    sqlx::query("UPDATE artists SET mb_artist_id = ? WHERE id = ? AND mb_artist_id IS NULL")
        .bind(mb_artist_id)
        .bind(id)
        .execute(ex)
        .await?;
    Ok(())
}

/// Artists not yet associated with any artwork
pub async fn find_without_artwork(ex: impl SqliteExecutor<'_>) -> Result<Vec<Artist>> {
    let artists = sqlx::query_as::<_, Artist>(
        "SELECT id, name, mb_artist_id, artwork_id FROM artists
         WHERE artwork_id IS NULL ORDER BY id",
    )
    .fetch_all(ex)
    .await?;
    Ok(artists)
}

/// Artists sharing a MusicBrainz id, grouped; only ids appearing more than
/// once are returned, ordered by (mbid, id)
pub async fn find_mbid_duplicates(ex: impl SqliteExecutor<'_>) -> Result<Vec<Artist>> {
    let artists = sqlx::query_as::<_, Artist>(
        "SELECT id, name, mb_artist_id, artwork_id FROM artists
         WHERE mb_artist_id IS NOT NULL
           AND mb_artist_id IN (
               SELECT mb_artist_id FROM artists WHERE mb_artist_id IS NOT NULL
               GROUP BY mb_artist_id HAVING COUNT(*) > 1)
         ORDER BY mb_artist_id, id",
    )
    .fetch_all(ex)
    .await?;
    Ok(artists)
}

/// Move every link from one artist onto another, dropping links that would
/// duplicate an existing one
pub async fn relink_tracks(
    conn: &mut SqliteConnection,
    from: ArtistId,
    to: ArtistId,
) -> Result<()> {
    sqlx::query(
        "UPDATE OR IGNORE track_artist_links SET artist_id = ? WHERE artist_id = ?",
    )
    .bind(to)
    .bind(from)
    .execute(&mut *conn)
    .await?;
    sqlx::query("DELETE FROM track_artist_links WHERE artist_id = ?")
        .bind(from)
        .execute(conn)
        .await?;
    Ok(())
}
