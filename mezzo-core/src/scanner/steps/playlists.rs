//! Playlist file association step
//!
//! Locates `.m3u`/`.m3u8`/`.pls` files under the library roots and resolves
//! their entries against the catalog. Entries naming unknown files are
//! reported individually; a playlist where nothing resolves is reported as
//! fully missing and not stored.

use crate::scanner::context::ScanContext;
use crate::scanner::paths;
use crate::scanner::steps::{ScanStep, StepDeps};
use async_trait::async_trait;
use mezzo_common::db::models::TrackId;
use mezzo_common::db::{playlists, tracks};
use mezzo_common::events::{ScanError, ScanStepKind};
use mezzo_common::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

const PLAYLIST_EXTENSIONS: &[&str] = &["m3u", "m3u8", "pls"];

pub(crate) struct AssociatePlayListTracksStep {
    deps: Arc<StepDeps>,
}

impl AssociatePlayListTracksStep {
    pub fn new(deps: Arc<StepDeps>) -> Self {
        Self { deps }
    }

    /// Parse and store one playlist file
    async fn process_playlist(&self, ctx: &mut ScanContext, path: &Path) -> Result<()> {
        let entries = match parse_playlist(path) {
            Ok(entries) => entries,
            Err(_) => {
                ctx.stats.push_error(ScanError::PlayListFile {
                    path: path.to_path_buf(),
                });
                return Ok(());
            }
        };
        if entries.is_empty() {
            return Ok(());
        }

        let pool = self.deps.db.pool();
        let base = path.parent().unwrap_or(Path::new("/"));

        let mut resolved: Vec<TrackId> = Vec::new();
        for entry in &entries {
            let absolute = resolve_entry(base, entry);
            match tracks::find_by_path(pool, &absolute.to_string_lossy()).await? {
                Some(track) => resolved.push(track.id),
                None => {
                    ctx.stats.push_error(ScanError::PlayListFilePathMissing {
                        path: path.to_path_buf(),
                        entry: entry.clone(),
                    });
                }
            }
        }

        if resolved.is_empty() {
            ctx.stats.push_error(ScanError::PlayListFileAllPathsMissing {
                path: path.to_path_buf(),
            });
            return Ok(());
        }

        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_else(|| "playlist".to_string());

        let mut tx = pool.begin().await?;
        let playlist_id =
            playlists::get_or_create(&mut tx, &name, &path.to_string_lossy()).await?;
        playlists::clear_tracks(&mut *tx, playlist_id).await?;
        for (position, track_id) in resolved.iter().enumerate() {
            playlists::add_track(&mut *tx, playlist_id, *track_id, position).await?;
        }
        tx.commit().await?;

        Ok(())
    }
}

#[async_trait]
impl ScanStep for AssociatePlayListTracksStep {
    fn kind(&self) -> ScanStepKind {
        ScanStepKind::AssociatePlayListTracks
    }

    async fn process(&self, ctx: &mut ScanContext) -> Result<()> {
        let mut playlist_files: Vec<PathBuf> = Vec::new();
        for library in &ctx.libraries {
            let walker = WalkDir::new(library.root_path())
                .follow_links(false)
                .into_iter()
                .filter_entry(|entry| {
                    !(entry.file_type().is_dir()
                        && entry.path().join(paths::IGNORE_FILE_NAME).exists())
                });
            for entry in walker.flatten() {
                if entry.file_type().is_file()
                    && has_playlist_extension(entry.path())
                {
                    playlist_files.push(entry.path().to_path_buf());
                }
            }
        }

        ctx.current_step_stats.total_elems = playlist_files.len();
        self.deps.report(ctx);

        for path in &playlist_files {
            if self.deps.aborted() {
                return Ok(());
            }
            self.process_playlist(ctx, path).await?;
            ctx.current_step_stats.processed_elems += 1;
        }

        self.deps.report(ctx);
        Ok(())
    }
}

fn has_playlist_extension(path: &Path) -> bool {
    match path.extension() {
        Some(extension) => {
            let extension = extension.to_string_lossy().to_lowercase();
            PLAYLIST_EXTENSIONS.iter().any(|e| *e == extension)
        }
        None => false,
    }
}

/// Entries of an m3u/m3u8/pls file, in listed order
fn parse_playlist(path: &Path) -> std::io::Result<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    let is_pls = path
        .extension()
        .map(|e| e.to_string_lossy().eq_ignore_ascii_case("pls"))
        .unwrap_or(false);

    let mut entries = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if is_pls {
            // "FileN=path" entries; every other key is ignored
            if let Some((key, value)) = line.split_once('=') {
                if key.starts_with("File") && !value.trim().is_empty() {
                    entries.push(value.trim().to_string());
                }
            }
        } else {
            if line.starts_with('#') {
                continue;
            }
            entries.push(line.to_string());
        }
    }
    Ok(entries)
}

/// Resolve a playlist entry relative to the playlist's directory
fn resolve_entry(base: &Path, entry: &str) -> PathBuf {
    let entry_path = Path::new(entry);
    if entry_path.is_absolute() {
        paths::normalize(entry_path)
    } else {
        paths::normalize(&base.join(entry_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_m3u_skips_comments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("list.m3u");
        std::fs::write(&path, "#EXTM3U\n#EXTINF:123,Song\na.flac\n\nsub/b.flac\n").unwrap();

        let entries = parse_playlist(&path).unwrap();
        assert_eq!(entries, vec!["a.flac", "sub/b.flac"]);
    }

    #[test]
    fn test_parse_pls_keeps_file_keys_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("list.pls");
        std::fs::write(
            &path,
            "[playlist]\nFile1=a.flac\nTitle1=A\nFile2=/abs/b.flac\nNumberOfEntries=2\n",
        )
        .unwrap();

        let entries = parse_playlist(&path).unwrap();
        assert_eq!(entries, vec!["a.flac", "/abs/b.flac"]);
    }

    #[test]
    fn test_resolve_entry() {
        assert_eq!(
            resolve_entry(Path::new("/m/lists"), "../a.flac"),
            PathBuf::from("/m/a.flac")
        );
        assert_eq!(
            resolve_entry(Path::new("/m"), "/elsewhere/b.flac"),
            PathBuf::from("/elsewhere/b.flac")
        );
    }
}
