//! Scan progress and result types carried by scanner events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::db::models::TrackId;

/// Why a track was flagged as a duplicate of an earlier one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DuplicateReason {
    /// Identical content hash
    SameHash,
    /// Identical MusicBrainz track id
    SameTrackMbid,
}

/// One duplicate finding, recorded once per non-first group member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanDuplicate {
    pub track_id: TrackId,
    pub reason: DuplicateReason,
}

/// Pipeline steps, in canonical execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanStepKind {
    ScanFiles,
    FetchTrackFeatures,
    CheckForRemovedFiles,
    RemoveOrphanedDbEntries,
    CheckForDuplicatedFiles,
    AssociateReleaseImages,
    AssociateTrackImages,
    AssociateArtistImages,
    AssociateExternalLyrics,
    AssociatePlayListTracks,
    ReconciliateArtists,
    ComputeClusterStats,
    UpdateLibraryFields,
    RecreateViews,
    Compact,
    Optimize,
    ReloadSimilarityEngine,
}

impl ScanStepKind {
    /// Human readable step name for logs and reports
    pub fn name(&self) -> &'static str {
        match self {
            ScanStepKind::ScanFiles => "ScanFiles",
            ScanStepKind::FetchTrackFeatures => "FetchTrackFeatures",
            ScanStepKind::CheckForRemovedFiles => "CheckForRemovedFiles",
            ScanStepKind::RemoveOrphanedDbEntries => "RemoveOrphanedDbEntries",
            ScanStepKind::CheckForDuplicatedFiles => "CheckForDuplicatedFiles",
            ScanStepKind::AssociateReleaseImages => "AssociateReleaseImages",
            ScanStepKind::AssociateTrackImages => "AssociateTrackImages",
            ScanStepKind::AssociateArtistImages => "AssociateArtistImages",
            ScanStepKind::AssociateExternalLyrics => "AssociateExternalLyrics",
            ScanStepKind::AssociatePlayListTracks => "AssociatePlayListTracks",
            ScanStepKind::ReconciliateArtists => "ReconciliateArtists",
            ScanStepKind::ComputeClusterStats => "ComputeClusterStats",
            ScanStepKind::UpdateLibraryFields => "UpdateLibraryFields",
            ScanStepKind::RecreateViews => "RecreateViews",
            ScanStepKind::Compact => "Compact",
            ScanStepKind::Optimize => "Optimize",
            ScanStepKind::ReloadSimilarityEngine => "ReloadSimilarityEngine",
        }
    }
}

/// Per-file scan failure, with enough context to report it
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ScanError {
    #[error("IO error on '{path}': {message}")]
    Io { path: PathBuf, message: String },

    #[error("Cannot parse audio file '{path}'")]
    AudioFile { path: PathBuf },

    #[error("Cannot read embedded image #{index} in '{path}': {message}")]
    EmbeddedImage {
        path: PathBuf,
        index: usize,
        message: String,
    },

    #[error("No audio track found in '{path}'")]
    NoAudioTrackFound { path: PathBuf },

    #[error("Bad audio duration in '{path}'")]
    BadAudioDuration { path: PathBuf },

    #[error("Cannot parse artist info file '{path}'")]
    ArtistInfoFile { path: PathBuf },

    #[error("Missing artist name in '{path}'")]
    MissingArtistName { path: PathBuf },

    #[error("Cannot read image file '{path}': {message}")]
    ImageFile { path: PathBuf, message: String },

    #[error("Cannot read lyrics file '{path}'")]
    LyricsFile { path: PathBuf },

    #[error("Cannot parse playlist file '{path}'")]
    PlayListFile { path: PathBuf },

    #[error("Playlist '{path}': no such track '{entry}'")]
    PlayListFilePathMissing { path: PathBuf, entry: String },

    #[error("Playlist '{path}': no entry could be resolved")]
    PlayListFileAllPathsMissing { path: PathBuf },
}

/// Progress snapshot of the step currently being executed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanStepStats {
    pub start_time: DateTime<Utc>,
    pub step_count: usize,
    pub step_index: usize,
    pub current_step: ScanStepKind,
    pub total_elems: usize,
    pub processed_elems: usize,
}

impl ScanStepStats {
    pub fn new(step_count: usize, step_index: usize, current_step: ScanStepKind) -> Self {
        Self {
            start_time: Utc::now(),
            step_count,
            step_index,
            current_step,
            total_elems: 0,
            processed_elems: 0,
        }
    }

    /// Completion percentage. `total_elems` may be an early estimate, so the
    /// result can legitimately exceed 100.
    pub fn progress(&self) -> u32 {
        (self.processed_elems * 100 / self.total_elems.max(1)) as u32
    }
}

/// Aggregate counters for one scan run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanStats {
    pub start_time: Option<DateTime<Utc>>,
    pub stop_time: Option<DateTime<Utc>>,

    /// Total number of candidate files (only valid after the file scan step)
    pub total_file_count: usize,

    /// No change since last scan
    pub skips: usize,
    /// Files actually scanned
    pub scans: usize,

    /// Tracks added to the catalog
    pub additions: usize,
    /// Tracks removed from the catalog
    pub deletions: usize,
    /// Tracks updated in the catalog
    pub updates: usize,
    /// Scan failures
    pub failures: usize,

    /// Feature records imported from sidecar files
    pub features_fetched: usize,

    /// Stored errors, capped at [`ScanStats::MAX_STORED_ERROR_COUNT`]
    pub errors: Vec<ScanError>,
    /// Total error occurrences; may exceed `errors.len()`
    pub errors_count: usize,
    pub duplicates: Vec<ScanDuplicate>,
}

impl ScanStats {
    pub const MAX_STORED_ERROR_COUNT: usize = 5_000;

    /// Record an error, keeping at most `MAX_STORED_ERROR_COUNT` of them
    pub fn push_error(&mut self, error: ScanError) {
        self.errors_count += 1;
        if self.errors.len() < Self::MAX_STORED_ERROR_COUNT {
            self.errors.push(error);
        }
    }

    /// Number of catalog mutations made by this scan
    pub fn changes_count(&self) -> usize {
        self.additions + self.deletions + self.updates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_rounds_down_and_may_exceed_100() {
        let mut stats = ScanStepStats::new(17, 0, ScanStepKind::ScanFiles);
        stats.total_elems = 3;
        stats.processed_elems = 1;
        assert_eq!(stats.progress(), 33);

        stats.processed_elems = 6;
        assert_eq!(stats.progress(), 200);
    }

    #[test]
    fn test_progress_with_zero_total() {
        let stats = ScanStepStats::new(17, 2, ScanStepKind::CheckForRemovedFiles);
        assert_eq!(stats.progress(), 0);
    }

    #[test]
    fn test_error_storage_cap() {
        let mut stats = ScanStats::default();
        for i in 0..ScanStats::MAX_STORED_ERROR_COUNT + 10 {
            stats.push_error(ScanError::AudioFile {
                path: PathBuf::from(format!("/m/{i}.flac")),
            });
        }
        assert_eq!(stats.errors.len(), ScanStats::MAX_STORED_ERROR_COUNT);
        assert_eq!(stats.errors_count, ScanStats::MAX_STORED_ERROR_COUNT + 10);
    }

    #[test]
    fn test_changes_count() {
        let stats = ScanStats {
            additions: 3,
            deletions: 2,
            updates: 1,
            skips: 10,
            ..ScanStats::default()
        };
        assert_eq!(stats.changes_count(), 6);
    }
}
