//! Duplicate detection step
//!
//! Tracks are grouped by exact content hash and by exact MusicBrainz track
//! id; in each group of more than one, every member after the first (in
//! discovery order) is recorded as a duplicate. Nothing is deleted.

use crate::scanner::context::ScanContext;
use crate::scanner::steps::{ScanStep, StepDeps};
use async_trait::async_trait;
use mezzo_common::db::models::TrackId;
use mezzo_common::db::tracks;
use mezzo_common::events::{DuplicateReason, ScanDuplicate, ScanStepKind};
use mezzo_common::Result;
use std::sync::Arc;

pub(crate) struct CheckForDuplicatedFilesStep {
    deps: Arc<StepDeps>,
}

impl CheckForDuplicatedFilesStep {
    pub fn new(deps: Arc<StepDeps>) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl ScanStep for CheckForDuplicatedFilesStep {
    fn kind(&self) -> ScanStepKind {
        ScanStepKind::CheckForDuplicatedFiles
    }

    async fn process(&self, ctx: &mut ScanContext) -> Result<()> {
        let pool = self.deps.db.pool();

        let by_hash = tracks::find_hash_duplicates(pool).await?;
        let by_mbid = tracks::find_mbid_duplicates(pool).await?;

        ctx.current_step_stats.total_elems = by_hash.len() + by_mbid.len();
        self.deps.report(ctx);

        record_group_duplicates(ctx, &by_hash, DuplicateReason::SameHash, &self.deps);
        record_group_duplicates(ctx, &by_mbid, DuplicateReason::SameTrackMbid, &self.deps);

        tracing::debug!(
            count = ctx.stats.duplicates.len(),
            "Duplicate check complete"
        );
        self.deps.report(ctx);
        Ok(())
    }
}

/// `rows` is (group key, track id), ordered by key then id; every non-first
/// row of a group becomes one duplicate entry
fn record_group_duplicates(
    ctx: &mut ScanContext,
    rows: &[(String, TrackId)],
    reason: DuplicateReason,
    deps: &StepDeps,
) {
    let mut previous_key: Option<&str> = None;

    for (key, track_id) in rows {
        if deps.aborted() {
            return;
        }

        if previous_key == Some(key.as_str()) {
            ctx.stats.duplicates.push(ScanDuplicate {
                track_id: *track_id,
                reason,
            });
        }
        previous_key = Some(key);
        ctx.current_step_stats.processed_elems += 1;
    }
}
