//! Audio file metadata reader
//!
//! Parses tags and audio properties using `lofty`. Supports ID3v2/ID3v1,
//! Vorbis Comments, APE, MP4 and RIFF INFO. Missing tags are not an error;
//! every field degrades to `None` independently.

use lofty::file::{AudioFile, TaggedFileExt};
use lofty::probe::Probe;
use lofty::tag::{Accessor, ItemKey, Tag};
use mezzo_common::db::models::TrackArtistLinkType;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot parse audio file: {0}")]
    Parse(String),

    #[error("No audio track found")]
    NoAudioTrack,
}

/// Release-level tags found on a track
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReleaseMetadata {
    pub name: String,
    pub mb_release_id: Option<String>,
    pub total_discs: Option<u32>,
}

/// Everything the scanner needs from one audio file
#[derive(Debug, Clone, Default)]
pub struct TrackMetadata {
    pub title: Option<String>,
    pub duration_secs: f64,
    pub track_number: Option<u32>,
    pub total_tracks: Option<u32>,
    pub disc_number: Option<u32>,
    pub mb_track_id: Option<String>,
    pub release: Option<ReleaseMetadata>,
    /// (name, role, mbid) triples; the mbid is only known for the main artist
    pub artists: Vec<ArtistCredit>,
    pub genres: Vec<String>,
    pub embedded_picture_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArtistCredit {
    pub name: String,
    pub role: TrackArtistLinkType,
    pub mb_artist_id: Option<String>,
}

/// Tag keys carrying secondary artist roles
const ROLE_KEYS: &[(ItemKey, TrackArtistLinkType)] = &[
    (ItemKey::AlbumArtist, TrackArtistLinkType::ReleaseArtist),
    (ItemKey::Arranger, TrackArtistLinkType::Arranger),
    (ItemKey::Composer, TrackArtistLinkType::Composer),
    (ItemKey::Conductor, TrackArtistLinkType::Conductor),
    (ItemKey::Lyricist, TrackArtistLinkType::Lyricist),
    (ItemKey::Producer, TrackArtistLinkType::Producer),
    (ItemKey::Remixer, TrackArtistLinkType::Remixer),
    (ItemKey::Writer, TrackArtistLinkType::Writer),
];

/// Parse tags and properties of one audio file
pub fn read_metadata(path: &Path) -> Result<TrackMetadata, MetadataError> {
    let tagged_file = Probe::open(path)
        .map_err(|e| MetadataError::Io(std::io::Error::other(e)))?
        .read()
        .map_err(|e| MetadataError::Parse(e.to_string()))?;

    let properties = tagged_file.properties();
    if properties.sample_rate().is_none() {
        return Err(MetadataError::NoAudioTrack);
    }
    let duration_secs = properties.duration().as_secs_f64();

    let mut metadata = TrackMetadata {
        duration_secs,
        ..TrackMetadata::default()
    };

    let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) else {
        return Ok(metadata);
    };

    metadata.title = tag.title().map(|t| t.to_string());
    metadata.track_number = tag.track();
    metadata.total_tracks = tag.track_total();
    metadata.disc_number = tag.disk();
    metadata.mb_track_id = get_trimmed(tag, &ItemKey::MusicBrainzRecordingId);
    metadata.embedded_picture_count = tag.pictures().len();

    if let Some(album) = tag.album() {
        metadata.release = Some(ReleaseMetadata {
            name: album.to_string(),
            mb_release_id: get_trimmed(tag, &ItemKey::MusicBrainzReleaseId),
            total_discs: tag.disk_total(),
        });
    }

    if let Some(artist) = tag.artist() {
        metadata.artists.push(ArtistCredit {
            name: artist.to_string(),
            role: TrackArtistLinkType::Artist,
            mb_artist_id: get_trimmed(tag, &ItemKey::MusicBrainzArtistId),
        });
    }
    for (key, role) in ROLE_KEYS {
        if let Some(name) = get_trimmed(tag, key) {
            metadata.artists.push(ArtistCredit {
                name,
                role: *role,
                mb_artist_id: None,
            });
        }
    }

    if let Some(genre) = tag.genre() {
        // Multi-valued genre tags commonly use ';' or '\0' separators
        metadata.genres = genre
            .split([';', '\0'])
            .map(|g| g.trim())
            .filter(|g| !g.is_empty())
            .map(|g| g.to_string())
            .collect();
    }

    Ok(metadata)
}

/// Read the bytes of one embedded picture, by index
pub fn read_embedded_picture(
    path: &Path,
    index: usize,
) -> Result<Option<Vec<u8>>, MetadataError> {
    let tagged_file = Probe::open(path)
        .map_err(|e| MetadataError::Io(std::io::Error::other(e)))?
        .read()
        .map_err(|e| MetadataError::Parse(e.to_string()))?;

    let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) else {
        return Ok(None);
    };

    Ok(tag.pictures().get(index).map(|p| p.data().to_vec()))
}

fn get_trimmed(tag: &Tag, key: &ItemKey) -> Option<String> {
    tag.get_string(key)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}
