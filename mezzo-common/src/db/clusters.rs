//! Cluster (free-form tag) persistence

use crate::db::models::{ClusterId, ClusterTypeId, TrackId};
use crate::Result;
use sqlx::{SqliteConnection, SqliteExecutor};

pub async fn get_or_create_type(
    conn: &mut SqliteConnection,
    name: &str,
) -> Result<ClusterTypeId> {
    let existing: Option<(ClusterTypeId,)> =
        sqlx::query_as("SELECT id FROM cluster_types WHERE name = ?")
            .bind(name)
            .fetch_optional(&mut *conn)
            .await?;
    if let Some((id,)) = existing {
        return Ok(id);
    }

    let id: i64 = sqlx::query_scalar("INSERT INTO cluster_types (name) VALUES (?) RETURNING id")
        .bind(name)
        .fetch_one(conn)
        .await?;
    Ok(ClusterTypeId(id))
}

pub async fn get_or_create(
    conn: &mut SqliteConnection,
    cluster_type: ClusterTypeId,
    name: &str,
) -> Result<ClusterId> {
    let existing: Option<(ClusterId,)> =
        sqlx::query_as("SELECT id FROM clusters WHERE cluster_type_id = ? AND name = ?")
            .bind(cluster_type)
            .bind(name)
            .fetch_optional(&mut *conn)
            .await?;
    if let Some((id,)) = existing {
        return Ok(id);
    }

    let id: i64 = sqlx::query_scalar(
        "INSERT INTO clusters (cluster_type_id, name) VALUES (?, ?) RETURNING id",
    )
    .bind(cluster_type)
    .bind(name)
    .fetch_one(conn)
    .await?;
    Ok(ClusterId(id))
}

pub async fn attach(ex: impl SqliteExecutor<'_>, track: TrackId, cluster: ClusterId) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO track_clusters (track_id, cluster_id) VALUES (?, ?)")
        .bind(track)
        .bind(cluster)
        .execute(ex)
        .await?;
    Ok(())
}

pub async fn clear_for_track(ex: impl SqliteExecutor<'_>, track: TrackId) -> Result<()> {
    sqlx::query("DELETE FROM track_clusters WHERE track_id = ?")
        .bind(track)
        .execute(ex)
        .await?;
    Ok(())
}

/// Names of the clusters attached to a track, with their type names
pub async fn find_for_track(
    ex: impl SqliteExecutor<'_>,
    track: TrackId,
) -> Result<Vec<(String, String)>> {
    let rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT ct.name, c.name FROM clusters c
         JOIN cluster_types ct ON ct.id = c.cluster_type_id
         JOIN track_clusters tc ON tc.cluster_id = c.id
         WHERE tc.track_id = ? ORDER BY ct.name, c.name",
    )
    .bind(track)
    .fetch_all(ex)
    .await?;
    Ok(rows)
}

/// Clusters attached to no track
pub async fn find_orphans(ex: impl SqliteExecutor<'_>) -> Result<Vec<ClusterId>> {
    let ids: Vec<ClusterId> = sqlx::query_scalar(
        "SELECT id FROM clusters
         WHERE NOT EXISTS (SELECT 1 FROM track_clusters tc WHERE tc.cluster_id = clusters.id)
         ORDER BY id",
    )
    .fetch_all(ex)
    .await?;
    Ok(ids)
}

pub async fn remove(conn: &mut SqliteConnection, id: ClusterId) -> Result<()> {
    sqlx::query("DELETE FROM track_clusters WHERE cluster_id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM clusters WHERE id = ?")
        .bind(id)
        .execute(conn)
        .await?;
    Ok(())
}

/// Refresh the denormalized per-cluster track counts
pub async fn refresh_track_counts(ex: impl SqliteExecutor<'_>) -> Result<()> {
    sqlx::query(
        "UPDATE clusters SET track_count =
            (SELECT COUNT(*) FROM track_clusters WHERE cluster_id = clusters.id)",
    )
    .execute(ex)
    .await?;
    Ok(())
}
