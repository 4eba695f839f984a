//! Scan run state shared by the pipeline steps

use mezzo_common::config::{Settings, StartTime, UpdatePeriod};
use mezzo_common::db::models::MediaLibrary;
use mezzo_common::events::{ScanStats, ScanStepKind, ScanStepStats};

/// Scanner knobs snapshot, taken from [`Settings`] at service construction
#[derive(Debug, Clone)]
pub struct ScannerSettings {
    pub supported_extensions: Vec<String>,
    pub cover_preferred_file_names: Vec<String>,
    pub cover_max_file_size: u64,
    pub update_period: UpdatePeriod,
    pub update_start_time: StartTime,
}

impl ScannerSettings {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            supported_extensions: settings
                .supported_extensions
                .iter()
                .map(|e| e.to_lowercase())
                .collect(),
            cover_preferred_file_names: settings
                .cover_preferred_file_names
                .iter()
                .map(|n| n.to_lowercase())
                .collect(),
            cover_max_file_size: settings.cover_max_file_size,
            update_period: settings.scan_update_period,
            update_start_time: settings.scan_update_start_time,
        }
    }
}

/// Mutable state of one scan run. Owned by the pipeline; steps mutate it
/// sequentially.
pub struct ScanContext {
    /// The library set as of scan start
    pub libraries: Vec<MediaLibrary>,
    /// Re-scan files whose (size, mtime) are unchanged
    pub force_scan: bool,
    /// Aggregate counters, observable mid-scan through the service status
    pub stats: ScanStats,
    /// Progress of the step currently executing
    pub current_step_stats: ScanStepStats,
}

impl ScanContext {
    pub fn new(libraries: Vec<MediaLibrary>, force_scan: bool, step_count: usize) -> Self {
        let mut stats = ScanStats::default();
        stats.start_time = Some(chrono::Utc::now());
        Self {
            libraries,
            force_scan,
            stats,
            current_step_stats: ScanStepStats::new(step_count, 0, ScanStepKind::ScanFiles),
        }
    }

    /// Reset the per-step progress for a new step
    pub fn begin_step(&mut self, step_index: usize, kind: ScanStepKind) {
        let step_count = self.current_step_stats.step_count;
        self.current_step_stats = ScanStepStats::new(step_count, step_index, kind);
    }
}
