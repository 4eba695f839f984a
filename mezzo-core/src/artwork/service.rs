//! Artwork resolution service
//!
//! Maps tracks, releases and artists to encoded image bytes. Resolution goes
//! through the in-memory cache, then to the artwork's backing source (a
//! standalone file or a picture embedded in an audio file), decoding,
//! resizing and re-encoding to JPEG on the way. Raw (unresized) requests
//! bypass the cache entirely.

use crate::artwork::cache::{EntryDesc, ImageCache};
use crate::imaging::{self, EncodedImage, ImageSize};
use crate::metadata;
use mezzo_common::db::models::{ArtistId, ArtworkId, ArtworkSource, ReleaseId, TrackId};
use mezzo_common::db::{self, Db};
use mezzo_common::{Result, Settings};
use std::path::Path;
use std::sync::Arc;

pub struct ArtworkService {
    db: Db,
    cache: ImageCache,
    max_file_size: u64,
    jpeg_quality: u8,
    default_release_image: Arc<EncodedImage>,
    default_artist_image: Arc<EncodedImage>,
}

impl ArtworkService {
    /// Build the service. Fails when either placeholder SVG cannot be
    /// loaded.
    pub fn new(
        db: Db,
        settings: &Settings,
        default_release_svg: &Path,
        default_artist_svg: &Path,
    ) -> Result<Self> {
        let default_release_image = imaging::read_svg_file(default_release_svg)
            .map_err(|e| mezzo_common::Error::Config(format!("Bad release placeholder: {e}")))?;
        let default_artist_image = imaging::read_svg_file(default_artist_svg)
            .map_err(|e| mezzo_common::Error::Config(format!("Bad artist placeholder: {e}")))?;

        let jpeg_quality = settings.cover_jpeg_quality.clamp(1, 100);

        tracing::info!(
            max_cache_size = settings.cover_max_cache_size,
            max_file_size = settings.cover_max_file_size,
            jpeg_quality,
            "Artwork service ready"
        );

        Ok(Self {
            db,
            cache: ImageCache::new(settings.cover_max_cache_size as usize),
            max_file_size: settings.cover_max_file_size,
            jpeg_quality,
            default_release_image: Arc::new(default_release_image),
            default_artist_image: Arc::new(default_artist_image),
        })
    }

    /// Resolve an artwork id to encoded bytes, resized when `size` is given
    pub async fn get_image(
        &self,
        artwork_id: ArtworkId,
        size: Option<ImageSize>,
    ) -> Result<Option<Arc<EncodedImage>>> {
        let desc = EntryDesc {
            id: artwork_id,
            size,
        };

        if let Some(image) = self.cache.get_image(&desc) {
            return Ok(Some(image));
        }

        let Some(artwork) = db::artworks::find_by_id(self.db.pool(), artwork_id).await? else {
            return Ok(None);
        };

        let Some(raw_bytes) = self.read_source_bytes(&artwork.source).await? else {
            return Ok(None);
        };

        let Some(image) = self.process(&raw_bytes, size) else {
            return Ok(None);
        };

        let image = Arc::new(image);
        self.cache.add_image(desc, Arc::clone(&image));
        Ok(Some(image))
    }

    /// Image for a track: its own artwork first, then its release's
    pub async fn get_track_image(
        &self,
        track_id: TrackId,
        size: Option<ImageSize>,
        allow_release_fallback: bool,
    ) -> Result<Option<Arc<EncodedImage>>> {
        let Some(track) = db::tracks::find_by_id(self.db.pool(), track_id).await? else {
            return Ok(None);
        };

        if let Some(artwork_id) = track.artwork_id {
            if let Some(image) = self.get_image(artwork_id, size).await? {
                return Ok(Some(image));
            }
        }

        if allow_release_fallback {
            if let Some(release_id) = track.release_id {
                return self.get_release_image(release_id, size).await;
            }
        }

        Ok(None)
    }

    /// Image for a release: its artwork row, else the first track's embedded
    /// picture
    pub async fn get_release_image(
        &self,
        release_id: ReleaseId,
        size: Option<ImageSize>,
    ) -> Result<Option<Arc<EncodedImage>>> {
        let Some(release) = db::releases::find_by_id(self.db.pool(), release_id).await? else {
            return Ok(None);
        };

        if let Some(artwork_id) = release.artwork_id {
            if let Some(image) = self.get_image(artwork_id, size).await? {
                return Ok(Some(image));
            }
        }

        // No artwork row yet (e.g. mid-scan); try the first embedded picture
        // directly. Nothing to key a cache entry on, so this path is
        // uncached.
        if let Some(track_id) =
            db::tracks::find_embedded_artwork_track(self.db.pool(), release_id).await?
        {
            if let Some(track) = db::tracks::find_by_id(self.db.pool(), track_id).await? {
                let source = ArtworkSource::TrackEmbedded {
                    track: track.id,
                    index: 0,
                };
                if let Some(bytes) = self.read_source_bytes(&source).await? {
                    return Ok(self.process(&bytes, size).map(Arc::new));
                }
            }
        }

        Ok(None)
    }

    /// Image for an artist, from its artwork handle
    pub async fn get_artist_image(
        &self,
        artist_id: ArtistId,
        size: Option<ImageSize>,
    ) -> Result<Option<Arc<EncodedImage>>> {
        let Some(artist) = db::artists::find_by_id(self.db.pool(), artist_id).await? else {
            return Ok(None);
        };

        match artist.artwork_id {
            Some(artwork_id) => self.get_image(artwork_id, size).await,
            None => Ok(None),
        }
    }

    /// Placeholder served when a release has no artwork. Never cached.
    pub fn get_default_release_image(&self) -> Arc<EncodedImage> {
        Arc::clone(&self.default_release_image)
    }

    /// Placeholder served when an artist has no artwork. Never cached.
    pub fn get_default_artist_image(&self) -> Arc<EncodedImage> {
        Arc::clone(&self.default_artist_image)
    }

    /// Drop the whole cache; called after a scan changed the catalog
    pub fn flush_cache(&self) {
        self.cache.flush();
    }

    #[cfg(test)]
    pub(crate) fn cache(&self) -> &ImageCache {
        &self.cache
    }

    /// Load the raw encoded bytes behind an artwork source
    async fn read_source_bytes(&self, source: &ArtworkSource) -> Result<Option<Vec<u8>>> {
        match source {
            ArtworkSource::File(path) => {
                let file_size = std::fs::metadata(path)?.len();
                if file_size > self.max_file_size {
                    tracing::info!(
                        path = %path.display(),
                        file_size,
                        limit = self.max_file_size,
                        "Image file is too big"
                    );
                    return Ok(None);
                }
                Ok(Some(std::fs::read(path)?))
            }
            ArtworkSource::TrackEmbedded { track, index } => {
                let Some(row) = db::tracks::find_by_id(self.db.pool(), *track).await? else {
                    return Ok(None);
                };
                match metadata::read_embedded_picture(row.absolute_path(), *index) {
                    Ok(bytes) => Ok(bytes),
                    Err(e) => {
                        tracing::error!(
                            path = %row.absolute_path,
                            error = %e,
                            "Cannot read embedded picture"
                        );
                        Ok(None)
                    }
                }
            }
        }
    }

    /// Decode, resize and re-encode; or pass raw bytes through when no size
    /// is requested
    fn process(&self, bytes: &[u8], size: Option<ImageSize>) -> Option<EncodedImage> {
        match size {
            Some(size) => match imaging::decode(bytes) {
                Ok(raw) => match raw.resize(size).encode_jpeg(self.jpeg_quality) {
                    Ok(encoded) => Some(encoded),
                    Err(e) => {
                        tracing::error!(error = %e, "Cannot encode image");
                        None
                    }
                },
                Err(e) => {
                    tracing::error!(error = %e, "Cannot decode image");
                    None
                }
            },
            None => Some(EncodedImage::new(
                imaging::guess_mime_type(bytes),
                bytes.to_vec(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn write_svg(dir: &Path, name: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"<?xml version=\"1.0\"?><svg></svg>").unwrap();
        path
    }

    fn write_png(path: &Path, width: u32, height: u32) {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([10, 20, 30]));
        let mut data = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut data), image::ImageFormat::Png)
            .unwrap();
        std::fs::write(path, data).unwrap();
    }

    async fn make_service(dir: &Path) -> (Db, ArtworkService) {
        let db = Db::open_in_memory().await.unwrap();
        let settings = Settings::default();
        let release_svg = write_svg(dir, "release.svg");
        let artist_svg = write_svg(dir, "artist.svg");
        let service = ArtworkService::new(db.clone(), &settings, &release_svg, &artist_svg).unwrap();
        (db, service)
    }

    #[tokio::test]
    async fn test_resized_image_is_cached_and_flushable() {
        let dir = tempfile::tempdir().unwrap();
        let (db, service) = make_service(dir.path()).await;

        let cover = dir.path().join("cover.png");
        write_png(&cover, 64, 64);

        let mut conn = db.pool().acquire().await.unwrap();
        let artwork_id = db::artworks::get_or_create_file(&mut conn, &cover)
            .await
            .unwrap();
        drop(conn);

        let first = service.get_image(artwork_id, Some(32)).await.unwrap().unwrap();
        assert_eq!(first.mime_type(), "image/jpeg");
        assert_eq!(service.cache().entry_count(), 1);
        assert_eq!(service.cache().misses(), 1);

        // Second fetch is a cache hit with identical bytes
        let second = service.get_image(artwork_id, Some(32)).await.unwrap().unwrap();
        assert_eq!(service.cache().hits(), 1);
        assert_eq!(first.data(), second.data());

        // After a flush, the same request misses again but the bytes match
        service.flush_cache();
        let third = service.get_image(artwork_id, Some(32)).await.unwrap().unwrap();
        assert_eq!(service.cache().misses(), 1);
        assert_eq!(first.data(), third.data());
    }

    #[tokio::test]
    async fn test_raw_request_bypasses_cache_and_keeps_original_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let (db, service) = make_service(dir.path()).await;

        let cover = dir.path().join("front.png");
        write_png(&cover, 16, 16);
        let original = std::fs::read(&cover).unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        let artwork_id = db::artworks::get_or_create_file(&mut conn, &cover)
            .await
            .unwrap();
        drop(conn);

        let image = service.get_image(artwork_id, None).await.unwrap().unwrap();
        assert_eq!(image.mime_type(), "image/png");
        assert_eq!(image.data(), original.as_slice());
        assert_eq!(service.cache().entry_count(), 0);
    }

    #[tokio::test]
    async fn test_oversized_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let db = Db::open_in_memory().await.unwrap();
        let settings = Settings {
            cover_max_file_size: 10,
            ..Settings::default()
        };
        let release_svg = write_svg(dir.path(), "release.svg");
        let artist_svg = write_svg(dir.path(), "artist.svg");
        let service =
            ArtworkService::new(db.clone(), &settings, &release_svg, &artist_svg).unwrap();

        let cover = dir.path().join("cover.png");
        write_png(&cover, 16, 16);

        let mut conn = db.pool().acquire().await.unwrap();
        let artwork_id = db::artworks::get_or_create_file(&mut conn, &cover)
            .await
            .unwrap();
        drop(conn);

        assert!(service.get_image(artwork_id, Some(32)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_default_images_are_served_without_caching() {
        let dir = tempfile::tempdir().unwrap();
        let (_db, service) = make_service(dir.path()).await;

        let release = service.get_default_release_image();
        let artist = service.get_default_artist_image();
        assert_eq!(release.mime_type(), "image/svg+xml");
        assert_eq!(artist.mime_type(), "image/svg+xml");
        assert_eq!(service.cache().entry_count(), 0);
    }
}
