//! Catalog row types and id handles
//!
//! Handles are 64-bit rowids wrapped in newtypes so they stay ordered,
//! hashable and impossible to mix up across entities. Traversal between
//! entities always goes through queries, never through object graphs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
            Serialize, Deserialize, sqlx::Type,
        )]
        #[sqlx(transparent)]
        pub struct $name(pub i64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(MediaLibraryId);
id_type!(TrackId);
id_type!(ReleaseId);
id_type!(ArtistId);
id_type!(ArtworkId);
id_type!(ClusterId);
id_type!(ClusterTypeId);
id_type!(PlaylistId);

/// A named directory subtree the scanner is allowed to read
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MediaLibrary {
    pub id: MediaLibraryId,
    pub name: String,
    pub root_path: String,
    pub track_count: i64,
    pub total_duration_secs: f64,
}

impl MediaLibrary {
    pub fn root_path(&self) -> &Path {
        Path::new(&self.root_path)
    }
}

/// One audio file of the catalog
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Track {
    pub id: TrackId,
    pub absolute_path: String,
    pub file_size: i64,
    pub last_write_time: DateTime<Utc>,
    pub content_hash: Option<String>,
    pub mb_track_id: Option<String>,
    pub name: Option<String>,
    pub duration_secs: f64,
    pub track_number: Option<i64>,
    pub disc_number: Option<i64>,
    pub total_tracks: Option<i64>,
    pub release_id: Option<ReleaseId>,
    pub media_library_id: MediaLibraryId,
    pub artwork_id: Option<ArtworkId>,
    pub has_embedded_artwork: bool,
}

impl Track {
    pub fn absolute_path(&self) -> &Path {
        Path::new(&self.absolute_path)
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Release {
    pub id: ReleaseId,
    pub name: String,
    pub mb_release_id: Option<String>,
    pub total_discs: i64,
    pub artwork_id: Option<ArtworkId>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Artist {
    pub id: ArtistId,
    pub name: String,
    pub mb_artist_id: Option<String>,
    pub artwork_id: Option<ArtworkId>,
}

/// Role of an artist on a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TrackArtistLinkType {
    Artist,
    Arranger,
    Composer,
    Conductor,
    Lyricist,
    Mixer,
    Performer,
    Producer,
    ReleaseArtist,
    Remixer,
    Writer,
}

impl TrackArtistLinkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackArtistLinkType::Artist => "artist",
            TrackArtistLinkType::Arranger => "arranger",
            TrackArtistLinkType::Composer => "composer",
            TrackArtistLinkType::Conductor => "conductor",
            TrackArtistLinkType::Lyricist => "lyricist",
            TrackArtistLinkType::Mixer => "mixer",
            TrackArtistLinkType::Performer => "performer",
            TrackArtistLinkType::Producer => "producer",
            TrackArtistLinkType::ReleaseArtist => "release_artist",
            TrackArtistLinkType::Remixer => "remixer",
            TrackArtistLinkType::Writer => "writer",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "artist" => TrackArtistLinkType::Artist,
            "arranger" => TrackArtistLinkType::Arranger,
            "composer" => TrackArtistLinkType::Composer,
            "conductor" => TrackArtistLinkType::Conductor,
            "lyricist" => TrackArtistLinkType::Lyricist,
            "mixer" => TrackArtistLinkType::Mixer,
            "performer" => TrackArtistLinkType::Performer,
            "producer" => TrackArtistLinkType::Producer,
            "release_artist" => TrackArtistLinkType::ReleaseArtist,
            "remixer" => TrackArtistLinkType::Remixer,
            "writer" => TrackArtistLinkType::Writer,
            _ => return None,
        })
    }

    /// All roles, for iteration
    pub fn all() -> &'static [TrackArtistLinkType] {
        &[
            TrackArtistLinkType::Artist,
            TrackArtistLinkType::Arranger,
            TrackArtistLinkType::Composer,
            TrackArtistLinkType::Conductor,
            TrackArtistLinkType::Lyricist,
            TrackArtistLinkType::Mixer,
            TrackArtistLinkType::Performer,
            TrackArtistLinkType::Producer,
            TrackArtistLinkType::ReleaseArtist,
            TrackArtistLinkType::Remixer,
            TrackArtistLinkType::Writer,
        ]
    }
}

/// Where artwork bytes come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtworkSource {
    /// A standalone image file
    File(PathBuf),
    /// A picture embedded in an audio file's tag, by index
    TrackEmbedded { track: TrackId, index: usize },
}

#[derive(Debug, Clone)]
pub struct Artwork {
    pub id: ArtworkId,
    pub source: ArtworkSource,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Cluster {
    pub id: ClusterId,
    pub cluster_type_id: ClusterTypeId,
    pub name: String,
    pub track_count: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Playlist {
    pub id: PlaylistId,
    pub name: String,
    pub file_path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_type_round_trip() {
        for link_type in TrackArtistLinkType::all() {
            assert_eq!(
                TrackArtistLinkType::from_str(link_type.as_str()),
                Some(*link_type)
            );
        }
        assert_eq!(TrackArtistLinkType::from_str("dj"), None);
    }

    #[test]
    fn test_id_ordering_and_display() {
        assert!(TrackId(1) < TrackId(2));
        assert_eq!(TrackId(42).to_string(), "42");
    }
}
