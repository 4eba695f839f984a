//! Media library persistence

use crate::db::models::{MediaLibrary, MediaLibraryId};
use crate::{Error, Result};
use sqlx::{SqliteConnection, SqliteExecutor};
use std::path::{Component, Path, PathBuf};

/// Lexically normalize a path: resolve `.` and `..` components without
/// touching the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    normalized
}

/// Create a media library after validating its name and root path.
///
/// The root must be an existing absolute directory and must not overlap any
/// other library's root (in either direction) under lexical normalization.
pub async fn create(
    conn: &mut SqliteConnection,
    name: &str,
    root_path: &Path,
) -> Result<MediaLibraryId> {
    if name.trim().is_empty() {
        return Err(Error::InvalidLibrary("Library name is empty".to_string()));
    }
    if !root_path.is_absolute() {
        return Err(Error::InvalidLibrary(format!(
            "Library root '{}' is not absolute",
            root_path.display()
        )));
    }
    if !root_path.is_dir() {
        return Err(Error::InvalidLibrary(format!(
            "Library root '{}' is not an existing directory",
            root_path.display()
        )));
    }

    let normalized = normalize_path(root_path);
    for library in find_all(&mut *conn).await? {
        let existing = normalize_path(library.root_path());
        if normalized.starts_with(&existing) || existing.starts_with(&normalized) {
            return Err(Error::InvalidLibrary(format!(
                "Library root '{}' overlaps existing library '{}'",
                root_path.display(),
                library.name
            )));
        }
    }

    let id: i64 = sqlx::query_scalar(
        "INSERT INTO media_libraries (name, root_path) VALUES (?, ?) RETURNING id",
    )
    .bind(name)
    .bind(normalized.to_string_lossy().as_ref())
    .fetch_one(conn)
    .await?;

    Ok(MediaLibraryId(id))
}

pub async fn find_all(ex: impl SqliteExecutor<'_>) -> Result<Vec<MediaLibrary>> {
    let libraries = sqlx::query_as::<_, MediaLibrary>(
        "SELECT id, name, root_path, track_count, total_duration_secs
         FROM media_libraries ORDER BY id",
    )
    .fetch_all(ex)
    .await?;
    Ok(libraries)
}

pub async fn find_by_id(
    ex: impl SqliteExecutor<'_>,
    id: MediaLibraryId,
) -> Result<Option<MediaLibrary>> {
    let library = sqlx::query_as::<_, MediaLibrary>(
        "SELECT id, name, root_path, track_count, total_duration_secs
         FROM media_libraries WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(ex)
    .await?;
    Ok(library)
}

/// Remove a library row. Tracks under its root are dropped by the next
/// scan's removed-files pass; callers wanting immediate cleanup should
/// trigger one.
pub async fn remove(ex: impl SqliteExecutor<'_>, id: MediaLibraryId) -> Result<()> {
    sqlx::query("DELETE FROM media_libraries WHERE id = ?")
        .bind(id)
        .execute(ex)
        .await?;
    Ok(())
}

/// Refresh the per-library denormalized counters
pub async fn refresh_stats(ex: impl SqliteExecutor<'_>) -> Result<()> {
    sqlx::query(
        "UPDATE media_libraries SET
            track_count = (SELECT COUNT(*) FROM tracks WHERE media_library_id = media_libraries.id),
            total_duration_secs = COALESCE(
                (SELECT SUM(duration_secs) FROM tracks WHERE media_library_id = media_libraries.id), 0)",
    )
    .execute(ex)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path(Path::new("/a/b/../c/./d")),
            PathBuf::from("/a/c/d")
        );
        assert_eq!(normalize_path(Path::new("/a//b/")), PathBuf::from("/a/b"));
    }

    #[tokio::test]
    async fn test_create_rejects_overlapping_roots() {
        let db = crate::db::Db::open_in_memory().await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("sub");
        std::fs::create_dir(&sub).unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        create(&mut conn, "main", dir.path()).await.unwrap();

        let err = create(&mut conn, "nested", &sub).await.unwrap_err();
        assert!(matches!(err, Error::InvalidLibrary(_)));
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_name_case_insensitive() {
        let db = crate::db::Db::open_in_memory().await.unwrap();
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        create(&mut conn, "Music", dir_a.path()).await.unwrap();
        assert!(create(&mut conn, "music", dir_b.path()).await.is_err());
    }
}
