//! Artwork row persistence
//!
//! An artwork row names where image bytes can be found (a standalone file or
//! a picture embedded in an audio file); the bytes themselves are only read
//! on demand by the artwork service.

use crate::db::models::{Artwork, ArtworkId, ArtworkSource, TrackId};
use crate::{Error, Result};
use sqlx::{SqliteConnection, SqliteExecutor};
use std::path::{Path, PathBuf};

const KIND_FILE: &str = "file";
const KIND_EMBEDDED: &str = "embedded";

/// Find or create the row describing a standalone image file
pub async fn get_or_create_file(conn: &mut SqliteConnection, path: &Path) -> Result<ArtworkId> {
    let path_str = path.to_string_lossy();

    let existing: Option<(ArtworkId,)> =
        sqlx::query_as("SELECT id FROM artworks WHERE source_kind = ? AND file_path = ?")
            .bind(KIND_FILE)
            .bind(path_str.as_ref())
            .fetch_optional(&mut *conn)
            .await?;
    if let Some((id,)) = existing {
        return Ok(id);
    }

    let id: i64 = sqlx::query_scalar(
        "INSERT INTO artworks (source_kind, file_path) VALUES (?, ?) RETURNING id",
    )
    .bind(KIND_FILE)
    .bind(path_str.as_ref())
    .fetch_one(conn)
    .await?;
    Ok(ArtworkId(id))
}

/// Find or create the row describing a picture embedded in a track
pub async fn get_or_create_embedded(
    conn: &mut SqliteConnection,
    track: TrackId,
    picture_index: usize,
) -> Result<ArtworkId> {
    let existing: Option<(ArtworkId,)> = sqlx::query_as(
        "SELECT id FROM artworks WHERE source_kind = ? AND track_id = ? AND picture_index = ?",
    )
    .bind(KIND_EMBEDDED)
    .bind(track)
    .bind(picture_index as i64)
    .fetch_optional(&mut *conn)
    .await?;
    if let Some((id,)) = existing {
        return Ok(id);
    }

    let id: i64 = sqlx::query_scalar(
        "INSERT INTO artworks (source_kind, track_id, picture_index) VALUES (?, ?, ?) RETURNING id",
    )
    .bind(KIND_EMBEDDED)
    .bind(track)
    .bind(picture_index as i64)
    .fetch_one(conn)
    .await?;
    Ok(ArtworkId(id))
}

pub async fn find_by_id(ex: impl SqliteExecutor<'_>, id: ArtworkId) -> Result<Option<Artwork>> {
    let row: Option<(String, Option<String>, Option<TrackId>, Option<i64>)> = sqlx::query_as(
        "SELECT source_kind, file_path, track_id, picture_index FROM artworks WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(ex)
    .await?;

    let Some((kind, file_path, track_id, picture_index)) = row else {
        return Ok(None);
    };

    let source = match kind.as_str() {
        KIND_FILE => {
            let path = file_path
                .ok_or_else(|| Error::CorruptRecord(format!("Artwork {id} has no file path")))?;
            ArtworkSource::File(PathBuf::from(path))
        }
        KIND_EMBEDDED => {
            let track = track_id
                .ok_or_else(|| Error::CorruptRecord(format!("Artwork {id} has no track")))?;
            ArtworkSource::TrackEmbedded {
                track,
                index: picture_index.unwrap_or(0) as usize,
            }
        }
        other => {
            return Err(Error::CorruptRecord(format!(
                "Artwork {id} has unknown source kind '{other}'"
            )))
        }
    };

    Ok(Some(Artwork { id, source }))
}

/// Artworks referenced by no track, release or artist, plus embedded
/// artworks whose source track no longer exists
pub async fn find_orphans(ex: impl SqliteExecutor<'_>) -> Result<Vec<ArtworkId>> {
    let ids: Vec<ArtworkId> = sqlx::query_scalar(
        "SELECT id FROM artworks a
         WHERE (NOT EXISTS (SELECT 1 FROM tracks t WHERE t.artwork_id = a.id)
            AND NOT EXISTS (SELECT 1 FROM releases r WHERE r.artwork_id = a.id)
            AND NOT EXISTS (SELECT 1 FROM artists ar WHERE ar.artwork_id = a.id))
            OR (a.source_kind = 'embedded'
                AND NOT EXISTS (SELECT 1 FROM tracks t WHERE t.id = a.track_id))
         ORDER BY id",
    )
    .fetch_all(ex)
    .await?;
    Ok(ids)
}

/// Remove an artwork row and clear every reference to it
pub async fn remove(conn: &mut SqliteConnection, id: ArtworkId) -> Result<()> {
    sqlx::query("UPDATE tracks SET artwork_id = NULL WHERE artwork_id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("UPDATE releases SET artwork_id = NULL WHERE artwork_id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("UPDATE artists SET artwork_id = NULL WHERE artwork_id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM artworks WHERE id = ?")
        .bind(id)
        .execute(conn)
        .await?;
    Ok(())
}
