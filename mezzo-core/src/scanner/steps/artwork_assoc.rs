//! Artwork association steps
//!
//! Associates releases, tracks and artists with artwork found next to the
//! audio files: preferred cover names first, then any supported image, then
//! pictures embedded in the audio files. Artist directories may also carry
//! an `artist.nfo` info file whose MusicBrainz id is picked up here.

use crate::scanner::context::ScanContext;
use crate::scanner::paths;
use crate::scanner::steps::{ScanStep, StepDeps};
use async_trait::async_trait;
use mezzo_common::db::models::{Artist, Release, Track};
use mezzo_common::db::{artists, artworks, releases, tracks};
use mezzo_common::events::{ScanError, ScanStepKind};
use mezzo_common::Result;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Extensions considered when looking for cover files
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif", "webp"];

/// File stems tried for artist images, in order
const ARTIST_FILE_NAMES: &[&str] = &["artist"];

const ARTIST_INFO_FILE_NAME: &str = "artist.nfo";

fn is_image_file(path: &Path) -> bool {
    match path.extension() {
        Some(extension) => {
            let extension = extension.to_string_lossy().to_lowercase();
            IMAGE_EXTENSIONS.iter().any(|e| *e == extension)
        }
        None => false,
    }
}

/// Candidate cover files of a directory: (lowercased stem, path), sorted for
/// deterministic fallback picks. Files over the size limit are skipped.
fn cover_candidates(
    ctx: &mut ScanContext,
    directory: &Path,
    max_file_size: u64,
) -> Vec<(String, PathBuf)> {
    let mut candidates: Vec<(String, PathBuf)> = Vec::new();

    let Ok(entries) = std::fs::read_dir(directory) else {
        return candidates;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if !is_image_file(&path) {
            continue;
        }
        match std::fs::metadata(&path) {
            Ok(metadata) => {
                if !metadata.is_file() {
                    continue;
                }
                if metadata.len() > max_file_size {
                    tracing::info!(
                        path = %path.display(),
                        size = metadata.len(),
                        limit = max_file_size,
                        "Image file is too big"
                    );
                    continue;
                }
            }
            Err(e) => {
                ctx.stats.push_error(ScanError::ImageFile {
                    path: path.clone(),
                    message: e.to_string(),
                });
                continue;
            }
        }
        if let Some(stem) = paths::lowercase_stem(&path) {
            candidates.push((stem, path));
        }
    }

    candidates.sort();
    candidates
}

/// Pick a cover in a directory: preferred stems in order, then any
/// supported image
fn find_cover_in_directory(
    ctx: &mut ScanContext,
    directory: &Path,
    preferred_stems: &[String],
    max_file_size: u64,
) -> Option<PathBuf> {
    let candidates = cover_candidates(ctx, directory, max_file_size);

    for preferred in preferred_stems {
        if let Some((_, path)) = candidates.iter().find(|(stem, _)| stem == preferred) {
            return Some(path.clone());
        }
    }

    candidates.into_iter().next().map(|(_, path)| path)
}

// ---------------------------------------------------------------------------
// Releases
// ---------------------------------------------------------------------------

pub(crate) struct AssociateReleaseImagesStep {
    deps: Arc<StepDeps>,
}

impl AssociateReleaseImagesStep {
    pub fn new(deps: Arc<StepDeps>) -> Self {
        Self { deps }
    }

    async fn associate(&self, ctx: &mut ScanContext, release: &Release) -> Result<()> {
        let pool = self.deps.db.pool();

        let Some(first_track) = tracks::find_first_of_release(pool, release.id).await? else {
            return Ok(());
        };

        let mut directories: Vec<PathBuf> = Vec::new();
        if let Some(parent) = first_track.absolute_path().parent() {
            directories.push(parent.to_path_buf());
            // Multi-disc releases usually keep the cover one level up
            if release.total_discs > 1 {
                if let Some(grandparent) = parent.parent() {
                    directories.push(grandparent.to_path_buf());
                }
            }
        }

        for directory in directories {
            if let Some(cover) = find_cover_in_directory(
                ctx,
                &directory,
                &self.deps.settings.cover_preferred_file_names,
                self.deps.settings.cover_max_file_size,
            ) {
                let mut conn = pool.acquire().await?;
                let artwork_id = artworks::get_or_create_file(&mut conn, &cover).await?;
                releases::set_artwork(&mut *conn, release.id, artwork_id).await?;
                return Ok(());
            }
        }

        // Last resort: a picture embedded in one of the release's tracks
        if let Some(track_id) = tracks::find_embedded_artwork_track(pool, release.id).await? {
            let mut conn = pool.acquire().await?;
            let artwork_id = artworks::get_or_create_embedded(&mut conn, track_id, 0).await?;
            releases::set_artwork(&mut *conn, release.id, artwork_id).await?;
        }

        Ok(())
    }
}

#[async_trait]
impl ScanStep for AssociateReleaseImagesStep {
    fn kind(&self) -> ScanStepKind {
        ScanStepKind::AssociateReleaseImages
    }

    async fn process(&self, ctx: &mut ScanContext) -> Result<()> {
        let pending = releases::find_without_artwork(self.deps.db.pool()).await?;
        ctx.current_step_stats.total_elems = pending.len();
        self.deps.report(ctx);

        for release in &pending {
            if self.deps.aborted() {
                return Ok(());
            }
            self.associate(ctx, release).await?;
            ctx.current_step_stats.processed_elems += 1;
        }

        self.deps.report(ctx);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tracks
// ---------------------------------------------------------------------------

pub(crate) struct AssociateTrackImagesStep {
    deps: Arc<StepDeps>,
}

impl AssociateTrackImagesStep {
    pub fn new(deps: Arc<StepDeps>) -> Self {
        Self { deps }
    }

    async fn associate(&self, ctx: &mut ScanContext, track: &Track) -> Result<()> {
        let pool = self.deps.db.pool();

        if track.has_embedded_artwork {
            let mut conn = pool.acquire().await?;
            let artwork_id = artworks::get_or_create_embedded(&mut conn, track.id, 0).await?;
            tracks::set_artwork(&mut *conn, track.id, artwork_id).await?;
            return Ok(());
        }

        // A same-named image next to the audio file
        for extension in IMAGE_EXTENSIONS {
            let sidecar = track.absolute_path().with_extension(extension);
            let Ok(metadata) = std::fs::metadata(&sidecar) else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }
            if metadata.len() > self.deps.settings.cover_max_file_size {
                ctx.stats.push_error(ScanError::ImageFile {
                    path: sidecar,
                    message: "file too big".to_string(),
                });
                continue;
            }
            let mut conn = pool.acquire().await?;
            let artwork_id = artworks::get_or_create_file(&mut conn, &sidecar).await?;
            tracks::set_artwork(&mut *conn, track.id, artwork_id).await?;
            return Ok(());
        }

        Ok(())
    }
}

#[async_trait]
impl ScanStep for AssociateTrackImagesStep {
    fn kind(&self) -> ScanStepKind {
        ScanStepKind::AssociateTrackImages
    }

    async fn process(&self, ctx: &mut ScanContext) -> Result<()> {
        let pending = tracks::find_without_artwork(self.deps.db.pool()).await?;
        ctx.current_step_stats.total_elems = pending.len();
        self.deps.report(ctx);

        for track in &pending {
            if self.deps.aborted() {
                return Ok(());
            }
            self.associate(ctx, track).await?;
            ctx.current_step_stats.processed_elems += 1;
        }

        self.deps.report(ctx);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Artists
// ---------------------------------------------------------------------------

/// Kodi-style artist info file
#[derive(Debug, Deserialize)]
struct ArtistNfo {
    name: Option<String>,
    #[serde(rename = "musicBrainzArtistID")]
    mb_artist_id: Option<String>,
}

fn parse_artist_nfo(path: &Path) -> std::result::Result<ArtistNfo, String> {
    let content = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    quick_xml::de::from_str(&content).map_err(|e| e.to_string())
}

pub(crate) struct AssociateArtistImagesStep {
    deps: Arc<StepDeps>,
}

impl AssociateArtistImagesStep {
    pub fn new(deps: Arc<StepDeps>) -> Self {
        Self { deps }
    }

    async fn associate(&self, ctx: &mut ScanContext, artist: &Artist) -> Result<()> {
        let pool = self.deps.db.pool();

        let track_paths = tracks::find_paths_for_artist(pool, artist.id).await?;
        let directories: BTreeSet<PathBuf> = track_paths
            .iter()
            .filter_map(|p| Path::new(p).parent().map(Path::to_path_buf))
            .collect();

        for directory in &directories {
            self.apply_artist_info(ctx, artist, directory).await?;

            let preferred: Vec<String> =
                ARTIST_FILE_NAMES.iter().map(|n| n.to_string()).collect();
            let candidates =
                cover_candidates(ctx, directory, self.deps.settings.cover_max_file_size);
            let image = preferred.iter().find_map(|stem| {
                candidates
                    .iter()
                    .find(|(candidate_stem, _)| candidate_stem == stem)
                    .map(|(_, path)| path.clone())
            });

            if let Some(image) = image {
                let mut conn = pool.acquire().await?;
                let artwork_id = artworks::get_or_create_file(&mut conn, &image).await?;
                artists::set_artwork(&mut *conn, artist.id, artwork_id).await?;
                return Ok(());
            }
        }

        Ok(())
    }

    /// Pick up the MusicBrainz id from an `artist.nfo` sitting in one of the
    /// artist's directories
    async fn apply_artist_info(
        &self,
        ctx: &mut ScanContext,
        artist: &Artist,
        directory: &Path,
    ) -> Result<()> {
        let info_path = directory.join(ARTIST_INFO_FILE_NAME);
        if !info_path.is_file() {
            return Ok(());
        }

        let info = match parse_artist_nfo(&info_path) {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!(path = %info_path.display(), error = %e, "Bad artist info file");
                ctx.stats.push_error(ScanError::ArtistInfoFile { path: info_path });
                return Ok(());
            }
        };

        let Some(name) = info.name.as_deref().map(str::trim).filter(|n| !n.is_empty())
        else {
            ctx.stats
                .push_error(ScanError::MissingArtistName { path: info_path });
            return Ok(());
        };

        if !name.eq_ignore_ascii_case(artist.name.trim()) {
            return Ok(());
        }

        if artist.mb_artist_id.is_none() {
            if let Some(mbid) = info.mb_artist_id.as_deref().map(str::trim).filter(|m| !m.is_empty())
            {
                artists::set_mb_artist_id(self.deps.db.pool(), artist.id, mbid).await?;
            }
        }

        Ok(())
    }
}

#[async_trait]
impl ScanStep for AssociateArtistImagesStep {
    fn kind(&self) -> ScanStepKind {
        ScanStepKind::AssociateArtistImages
    }

    async fn process(&self, ctx: &mut ScanContext) -> Result<()> {
        let pending = artists::find_without_artwork(self.deps.db.pool()).await?;
        ctx.current_step_stats.total_elems = pending.len();
        self.deps.report(ctx);

        for artist in &pending {
            if self.deps.aborted() {
                return Ok(());
            }
            self.associate(ctx, artist).await?;
            ctx.current_step_stats.processed_elems += 1;
        }

        self.deps.report(ctx);
        Ok(())
    }
}
