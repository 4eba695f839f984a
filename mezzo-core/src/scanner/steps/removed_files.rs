//! Removed file detection step
//!
//! Drops catalog tracks whose file is gone, is no longer a regular file, no
//! longer lies inside any library root (ignored subtrees included), or whose
//! extension is no longer supported.

use crate::scanner::context::ScanContext;
use crate::scanner::paths;
use crate::scanner::steps::{ScanStep, StepDeps, WRITE_BATCH_SIZE};
use async_trait::async_trait;
use mezzo_common::db::models::TrackId;
use mezzo_common::db::tracks;
use mezzo_common::events::ScanStepKind;
use mezzo_common::Result;
use std::path::Path;
use std::sync::Arc;

pub(crate) struct CheckForRemovedFilesStep {
    deps: Arc<StepDeps>,
}

impl CheckForRemovedFilesStep {
    pub fn new(deps: Arc<StepDeps>) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl ScanStep for CheckForRemovedFilesStep {
    fn kind(&self) -> ScanStepKind {
        ScanStepKind::CheckForRemovedFiles
    }

    async fn process(&self, ctx: &mut ScanContext) -> Result<()> {
        let pool = self.deps.db.pool();

        ctx.current_step_stats.total_elems = tracks::count(pool).await?;
        self.deps.report(ctx);
        tracing::debug!(
            count = ctx.current_step_stats.total_elems,
            "Checking tracks to be removed"
        );

        let mut last_seen = TrackId(0);
        loop {
            let batch = tracks::find_paths_after(pool, last_seen, WRITE_BATCH_SIZE).await?;
            if batch.is_empty() {
                break;
            }
            last_seen = batch.last().map(|(id, _)| *id).unwrap_or(last_seen);

            let mut to_remove: Vec<TrackId> = Vec::new();
            for (track_id, path) in &batch {
                if self.deps.aborted() {
                    return Ok(());
                }
                if !self.check_file(ctx, Path::new(path)) {
                    to_remove.push(*track_id);
                }
                ctx.current_step_stats.processed_elems += 1;
            }

            if !to_remove.is_empty() {
                let mut tx = pool.begin().await?;
                for track_id in &to_remove {
                    tracks::remove(&mut tx, *track_id).await?;
                    ctx.stats.deletions += 1;
                }
                tx.commit().await?;
            }

            self.deps.report(ctx);
        }

        Ok(())
    }
}

impl CheckForRemovedFilesStep {
    /// Whether the file should stay in the catalog
    fn check_file(&self, ctx: &ScanContext, path: &Path) -> bool {
        match std::fs::metadata(path) {
            Ok(metadata) => {
                if !metadata.is_file() {
                    tracing::info!(path = %path.display(), "Removing: not a regular file");
                    return false;
                }
            }
            Err(_) => {
                tracing::info!(path = %path.display(), "Removing: missing");
                return false;
            }
        }

        let in_library = ctx.libraries.iter().any(|library| {
            paths::is_path_in_root(path, library.root_path())
                && !paths::is_path_ignored(path, library.root_path())
        });
        if !in_library {
            tracing::info!(path = %path.display(), "Removing: out of media libraries");
            return false;
        }

        if !paths::has_extension_in(path, &self.deps.settings.supported_extensions) {
            tracing::info!(path = %path.display(), "Removing: file format no longer handled");
            return false;
        }

        true
    }
}
