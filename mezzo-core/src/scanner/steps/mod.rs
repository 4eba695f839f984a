//! Scan pipeline steps
//!
//! Each step is one pass over the filesystem or the catalog. Steps run
//! strictly in canonical order and see the cumulative effect of the steps
//! before them. A step checks the shared abort flag at every declared
//! checkpoint and commits or rolls back its current transaction before
//! returning early.

mod artwork_assoc;
mod duplicates;
mod fetch_features;
mod lyrics;
mod maintenance;
mod orphans;
mod playlists;
mod reconcile_artists;
mod reload_engine;
mod removed_files;
mod scan_files;

use crate::recommend::FeatureEngine;
use crate::scanner::context::{ScanContext, ScannerSettings};
use async_trait::async_trait;
use mezzo_common::db::Db;
use mezzo_common::events::{ScanStepKind, ScanStepStats};
use mezzo_common::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Files per write transaction
pub(crate) const WRITE_BATCH_SIZE: usize = 50;

pub(crate) type ProgressCallback = Box<dyn Fn(&ScanStepStats) + Send + Sync>;

/// Everything a step needs besides the scan context
pub(crate) struct StepDeps {
    pub db: Db,
    pub settings: ScannerSettings,
    pub abort: Arc<AtomicBool>,
    pub progress: ProgressCallback,
    pub engine: Arc<FeatureEngine>,
}

impl StepDeps {
    pub fn aborted(&self) -> bool {
        self.abort.load(Ordering::Relaxed)
    }

    pub fn report(&self, ctx: &ScanContext) {
        (self.progress)(&ctx.current_step_stats);
    }
}

/// One pass of the scan pipeline
#[async_trait]
pub(crate) trait ScanStep: Send + Sync {
    fn kind(&self) -> ScanStepKind;

    async fn process(&self, ctx: &mut ScanContext) -> Result<()>;
}

/// The pipeline, in canonical order
pub(crate) fn build_pipeline(deps: Arc<StepDeps>) -> Vec<Box<dyn ScanStep>> {
    vec![
        Box::new(scan_files::ScanFilesStep::new(Arc::clone(&deps))),
        Box::new(fetch_features::FetchTrackFeaturesStep::new(Arc::clone(&deps))),
        Box::new(removed_files::CheckForRemovedFilesStep::new(Arc::clone(&deps))),
        Box::new(orphans::RemoveOrphanedDbEntriesStep::new(Arc::clone(&deps))),
        Box::new(duplicates::CheckForDuplicatedFilesStep::new(Arc::clone(&deps))),
        Box::new(artwork_assoc::AssociateReleaseImagesStep::new(Arc::clone(&deps))),
        Box::new(artwork_assoc::AssociateTrackImagesStep::new(Arc::clone(&deps))),
        Box::new(artwork_assoc::AssociateArtistImagesStep::new(Arc::clone(&deps))),
        Box::new(lyrics::AssociateExternalLyricsStep::new(Arc::clone(&deps))),
        Box::new(playlists::AssociatePlayListTracksStep::new(Arc::clone(&deps))),
        Box::new(reconcile_artists::ReconciliateArtistsStep::new(Arc::clone(&deps))),
        Box::new(maintenance::ComputeClusterStatsStep::new(Arc::clone(&deps))),
        Box::new(maintenance::UpdateLibraryFieldsStep::new(Arc::clone(&deps))),
        Box::new(maintenance::RecreateViewsStep::new(Arc::clone(&deps))),
        Box::new(maintenance::CompactStep::new(Arc::clone(&deps))),
        Box::new(maintenance::OptimizeStep::new(Arc::clone(&deps))),
        Box::new(reload_engine::ReloadSimilarityEngineStep::new(deps)),
    ]
}
