//! File scan step
//!
//! Walks every library root, parses new or modified audio files and upserts
//! them into the catalog. Work is committed in batches so an abort never
//! loses more than one batch.

use crate::metadata::{self, MetadataError, TrackMetadata};
use crate::scanner::context::ScanContext;
use crate::scanner::paths;
use crate::scanner::steps::{ScanStep, StepDeps, WRITE_BATCH_SIZE};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use mezzo_common::db::models::{MediaLibraryId, ReleaseId, TrackId};
use mezzo_common::db::tracks::NewTrack;
use mezzo_common::db::{artists, clusters, releases, tracks};
use mezzo_common::events::ScanError;
use mezzo_common::Result;
use sha2::{Digest, Sha256};
use sqlx::SqliteConnection;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

const GENRE_CLUSTER_TYPE: &str = "GENRE";

pub(crate) struct ScanFilesStep {
    deps: Arc<StepDeps>,
}

impl ScanFilesStep {
    pub fn new(deps: Arc<StepDeps>) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl ScanStep for ScanFilesStep {
    fn kind(&self) -> mezzo_common::events::ScanStepKind {
        mezzo_common::events::ScanStepKind::ScanFiles
    }

    async fn process(&self, ctx: &mut ScanContext) -> Result<()> {
        let candidates = self.collect_candidates(ctx);

        ctx.stats.total_file_count = candidates.len();
        ctx.current_step_stats.total_elems = candidates.len();
        self.deps.report(ctx);

        for batch in candidates.chunks(WRITE_BATCH_SIZE) {
            if self.deps.aborted() {
                return Ok(());
            }

            let mut tx = self.deps.db.pool().begin().await?;
            for (library_id, path) in batch {
                if self.deps.aborted() {
                    tx.commit().await?;
                    return Ok(());
                }
                self.process_file(&mut *tx, ctx, *library_id, path).await?;
                ctx.current_step_stats.processed_elems += 1;
            }
            tx.commit().await?;

            self.deps.report(ctx);
        }

        Ok(())
    }
}

impl ScanFilesStep {
    /// Walk the library roots, skipping ignored subtrees, collecting every
    /// file with a supported extension
    fn collect_candidates(&self, ctx: &mut ScanContext) -> Vec<(MediaLibraryId, PathBuf)> {
        let mut candidates = Vec::new();

        for library in &ctx.libraries {
            let root = library.root_path().to_path_buf();
            tracing::debug!(library = %library.name, root = %root.display(), "Scanning library");

            let walker = WalkDir::new(&root)
                .follow_links(false)
                .into_iter()
                .filter_entry(|entry| {
                    !(entry.file_type().is_dir()
                        && entry.path().join(paths::IGNORE_FILE_NAME).exists())
                });

            for entry in walker {
                match entry {
                    Ok(entry) => {
                        if entry.file_type().is_file()
                            && paths::has_extension_in(
                                entry.path(),
                                &self.deps.settings.supported_extensions,
                            )
                        {
                            candidates.push((library.id, entry.path().to_path_buf()));
                        }
                    }
                    Err(e) => {
                        let path = e
                            .path()
                            .map(Path::to_path_buf)
                            .unwrap_or_else(|| root.clone());
                        tracing::warn!(path = %path.display(), error = %e, "Cannot walk entry");
                        ctx.stats.push_error(ScanError::Io {
                            path,
                            message: e.to_string(),
                        });
                    }
                }
            }
        }

        candidates
    }

    /// Skip, add or update one candidate file. Per-file failures are
    /// recorded and never abort the scan; database errors propagate.
    async fn process_file(
        &self,
        conn: &mut SqliteConnection,
        ctx: &mut ScanContext,
        library_id: MediaLibraryId,
        path: &Path,
    ) -> Result<()> {
        let path_str = path.to_string_lossy();

        let (file_size, last_write_time) = match file_signature(path) {
            Ok(signature) => signature,
            Err(e) => {
                ctx.stats.scans += 1;
                ctx.stats.failures += 1;
                ctx.stats.push_error(ScanError::Io {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                });
                return Ok(());
            }
        };

        let existing = tracks::find_by_path(&mut *conn, &path_str).await?;
        if let Some(track) = &existing {
            if !ctx.force_scan
                && track.file_size == file_size
                && track.last_write_time == last_write_time
            {
                ctx.stats.skips += 1;
                return Ok(());
            }
        }

        ctx.stats.scans += 1;

        let parsed = match metadata::read_metadata(path) {
            Ok(parsed) => parsed,
            Err(e) => {
                ctx.stats.failures += 1;
                ctx.stats.push_error(match e {
                    MetadataError::Io(e) => ScanError::Io {
                        path: path.to_path_buf(),
                        message: e.to_string(),
                    },
                    MetadataError::Parse(_) => ScanError::AudioFile {
                        path: path.to_path_buf(),
                    },
                    MetadataError::NoAudioTrack => ScanError::NoAudioTrackFound {
                        path: path.to_path_buf(),
                    },
                });
                return Ok(());
            }
        };

        if parsed.duration_secs <= 0.0 {
            ctx.stats.failures += 1;
            ctx.stats.push_error(ScanError::BadAudioDuration {
                path: path.to_path_buf(),
            });
            return Ok(());
        }

        let content_hash = match compute_content_hash(path) {
            Ok(hash) => hash,
            Err(e) => {
                ctx.stats.failures += 1;
                ctx.stats.push_error(ScanError::Io {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                });
                return Ok(());
            }
        };

        let track_id = self
            .upsert_track(
                conn,
                &parsed,
                &path_str,
                file_size,
                last_write_time,
                &content_hash,
                library_id,
            )
            .await?;

        self.refresh_associations(conn, track_id, &parsed).await?;

        if existing.is_some() {
            ctx.stats.updates += 1;
            tracing::debug!(path = %path.display(), "Updated track");
        } else {
            ctx.stats.additions += 1;
            tracing::debug!(path = %path.display(), "Added track");
        }

        Ok(())
    }

    async fn upsert_track(
        &self,
        conn: &mut SqliteConnection,
        parsed: &TrackMetadata,
        path: &str,
        file_size: i64,
        last_write_time: DateTime<Utc>,
        content_hash: &str,
        library_id: MediaLibraryId,
    ) -> Result<TrackId> {
        let release_id: Option<ReleaseId> = match &parsed.release {
            Some(release) => Some(
                releases::get_or_create(
                    conn,
                    &release.name,
                    release.mb_release_id.as_deref(),
                    release.total_discs.unwrap_or(1) as i64,
                )
                .await?,
            ),
            None => None,
        };

        tracks::upsert(
            &mut *conn,
            &NewTrack {
                absolute_path: path,
                file_size,
                last_write_time,
                content_hash: Some(content_hash),
                mb_track_id: parsed.mb_track_id.as_deref(),
                name: parsed.title.as_deref(),
                duration_secs: parsed.duration_secs,
                track_number: parsed.track_number.map(i64::from),
                disc_number: parsed.disc_number.map(i64::from),
                total_tracks: parsed.total_tracks.map(i64::from),
                release_id,
                media_library_id: library_id,
                has_embedded_artwork: parsed.embedded_picture_count > 0,
            },
        )
        .await
    }

    /// Rebuild artist links and clusters from the freshly parsed tags
    async fn refresh_associations(
        &self,
        conn: &mut SqliteConnection,
        track_id: TrackId,
        parsed: &TrackMetadata,
    ) -> Result<()> {
        artists::clear_links_for_track(&mut *conn, track_id).await?;
        for credit in &parsed.artists {
            if credit.name.trim().is_empty() {
                continue;
            }
            let artist_id =
                artists::get_or_create(conn, &credit.name, credit.mb_artist_id.as_deref())
                    .await?;
            artists::link(&mut *conn, track_id, artist_id, credit.role).await?;
        }

        clusters::clear_for_track(&mut *conn, track_id).await?;
        if !parsed.genres.is_empty() {
            let type_id = clusters::get_or_create_type(conn, GENRE_CLUSTER_TYPE).await?;
            for genre in &parsed.genres {
                let cluster_id = clusters::get_or_create(conn, type_id, genre).await?;
                clusters::attach(&mut *conn, track_id, cluster_id).await?;
            }
        }

        Ok(())
    }
}

/// (size, mtime truncated to seconds) of a file. Second precision keeps the
/// value stable across the database round trip.
fn file_signature(path: &Path) -> std::io::Result<(i64, DateTime<Utc>)> {
    let metadata = std::fs::metadata(path)?;
    let modified: DateTime<Utc> = metadata.modified()?.into();
    let truncated = Utc
        .timestamp_opt(modified.timestamp(), 0)
        .single()
        .unwrap_or(modified);
    Ok((metadata.len() as i64, truncated))
}

/// Streaming SHA-256 over the whole file; the hex of the first 16 bytes is
/// stored as the opaque 128-bit content hash
pub(crate) fn compute_content_hash(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 1024 * 1024];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    let digest = hasher.finalize();
    Ok(digest[..16].iter().map(|b| format!("{b:02x}")).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_is_stable_and_128_bit() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        std::fs::write(&a, b"same bytes").unwrap();
        std::fs::write(&b, b"same bytes").unwrap();

        let hash_a = compute_content_hash(&a).unwrap();
        let hash_b = compute_content_hash(&b).unwrap();
        assert_eq!(hash_a, hash_b);
        assert_eq!(hash_a.len(), 32);

        std::fs::write(&b, b"other bytes").unwrap();
        assert_ne!(hash_a, compute_content_hash(&b).unwrap());
    }

    #[test]
    fn test_file_signature_truncates_to_seconds() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("t.flac");
        std::fs::write(&file, b"x").unwrap();

        let (size, mtime) = file_signature(&file).unwrap();
        assert_eq!(size, 1);
        assert_eq!(mtime.timestamp_subsec_nanos(), 0);
    }
}
