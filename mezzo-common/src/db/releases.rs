//! Release persistence

use crate::db::models::{ArtworkId, Release, ReleaseId};
use crate::Result;
use sqlx::{SqliteConnection, SqliteExecutor};

/// Find a release by MusicBrainz id (preferred) or exact name, creating it
/// when absent. `total_discs` only ever grows.
pub async fn get_or_create(
    conn: &mut SqliteConnection,
    name: &str,
    mb_release_id: Option<&str>,
    total_discs: i64,
) -> Result<ReleaseId> {
    let existing: Option<(ReleaseId, i64)> = match mb_release_id {
        Some(mbid) => {
            sqlx::query_as("SELECT id, total_discs FROM releases WHERE mb_release_id = ?")
                .bind(mbid)
                .fetch_optional(&mut *conn)
                .await?
        }
        None => {
            sqlx::query_as(
                "SELECT id, total_discs FROM releases WHERE name = ? AND mb_release_id IS NULL",
            )
            .bind(name)
            .fetch_optional(&mut *conn)
            .await?
        }
    };

    if let Some((id, known_discs)) = existing {
        if total_discs > known_discs {
            sqlx::query("UPDATE releases SET total_discs = ? WHERE id = ?")
                .bind(total_discs)
                .bind(id)
                .execute(&mut *conn)
                .await?;
        }
        return Ok(id);
    }

    let id: i64 = sqlx::query_scalar(
        "INSERT INTO releases (name, mb_release_id, total_discs) VALUES (?, ?, ?) RETURNING id",
    )
    .bind(name)
    .bind(mb_release_id)
    .bind(total_discs.max(1))
    .fetch_one(conn)
    .await?;

    Ok(ReleaseId(id))
}

pub async fn find_by_id(ex: impl SqliteExecutor<'_>, id: ReleaseId) -> Result<Option<Release>> {
    let release = sqlx::query_as::<_, Release>(
        "SELECT id, name, mb_release_id, total_discs, artwork_id FROM releases WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(ex)
    .await?;
    Ok(release)
}

pub async fn exists(ex: impl SqliteExecutor<'_>, id: ReleaseId) -> Result<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM releases WHERE id = ?")
        .bind(id)
        .fetch_optional(ex)
        .await?;
    Ok(found.is_some())
}

/// Releases referenced by no track
pub async fn find_orphans(ex: impl SqliteExecutor<'_>) -> Result<Vec<ReleaseId>> {
    let ids: Vec<ReleaseId> = sqlx::query_scalar(
        "SELECT id FROM releases
         WHERE NOT EXISTS (SELECT 1 FROM tracks t WHERE t.release_id = releases.id)
         ORDER BY id",
    )
    .fetch_all(ex)
    .await?;
    Ok(ids)
}

pub async fn remove(ex: impl SqliteExecutor<'_>, id: ReleaseId) -> Result<()> {
    sqlx::query("DELETE FROM releases WHERE id = ?")
        .bind(id)
        .execute(ex)
        .await?;
    Ok(())
}

pub async fn set_artwork(
    ex: impl SqliteExecutor<'_>,
    id: ReleaseId,
    artwork: ArtworkId,
) -> Result<()> {
    sqlx::query("UPDATE releases SET artwork_id = ? WHERE id = ?")
        .bind(artwork)
        .bind(id)
        .execute(ex)
        .await?;
    Ok(())
}

/// Releases not yet associated with any artwork
pub async fn find_without_artwork(ex: impl SqliteExecutor<'_>) -> Result<Vec<Release>> {
    let releases = sqlx::query_as::<_, Release>(
        "SELECT id, name, mb_release_id, total_discs, artwork_id
         FROM releases WHERE artwork_id IS NULL ORDER BY id",
    )
    .fetch_all(ex)
    .await?;
    Ok(releases)
}
