//! Orphan removal step
//!
//! Sweeps the catalog in dependency order: clusters with no tracks, artists
//! with no links, releases with no tracks, then artworks referenced by
//! nothing. Tracks themselves were already handled by the removed-files
//! step. Each sweep runs in one transaction.

use crate::scanner::context::ScanContext;
use crate::scanner::steps::{ScanStep, StepDeps};
use async_trait::async_trait;
use mezzo_common::db::{artists, artworks, clusters, releases};
use mezzo_common::events::ScanStepKind;
use mezzo_common::Result;
use std::sync::Arc;

pub(crate) struct RemoveOrphanedDbEntriesStep {
    deps: Arc<StepDeps>,
}

impl RemoveOrphanedDbEntriesStep {
    pub fn new(deps: Arc<StepDeps>) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl ScanStep for RemoveOrphanedDbEntriesStep {
    fn kind(&self) -> ScanStepKind {
        ScanStepKind::RemoveOrphanedDbEntries
    }

    async fn process(&self, ctx: &mut ScanContext) -> Result<()> {
        self.remove_orphan_clusters(ctx).await?;
        self.remove_orphan_artists(ctx).await?;
        self.remove_orphan_releases(ctx).await?;
        self.remove_orphan_artworks(ctx).await?;
        self.deps.report(ctx);
        Ok(())
    }
}

impl RemoveOrphanedDbEntriesStep {
    async fn remove_orphan_clusters(&self, ctx: &mut ScanContext) -> Result<()> {
        tracing::debug!("Checking orphan clusters");
        let pool = self.deps.db.pool();

        let mut tx = pool.begin().await?;
        let orphans = clusters::find_orphans(&mut *tx).await?;
        ctx.current_step_stats.total_elems += orphans.len();
        for cluster_id in orphans {
            if self.deps.aborted() {
                break;
            }
            clusters::remove(&mut tx, cluster_id).await?;
            ctx.current_step_stats.processed_elems += 1;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn remove_orphan_artists(&self, ctx: &mut ScanContext) -> Result<()> {
        tracing::debug!("Checking orphan artists");
        let pool = self.deps.db.pool();

        let mut tx = pool.begin().await?;
        let orphans = artists::find_orphans(&mut *tx).await?;
        ctx.current_step_stats.total_elems += orphans.len();
        for artist_id in orphans {
            if self.deps.aborted() {
                break;
            }
            artists::remove(&mut *tx, artist_id).await?;
            ctx.current_step_stats.processed_elems += 1;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn remove_orphan_releases(&self, ctx: &mut ScanContext) -> Result<()> {
        tracing::debug!("Checking orphan releases");
        let pool = self.deps.db.pool();

        let mut tx = pool.begin().await?;
        let orphans = releases::find_orphans(&mut *tx).await?;
        ctx.current_step_stats.total_elems += orphans.len();
        for release_id in orphans {
            if self.deps.aborted() {
                break;
            }
            releases::remove(&mut *tx, release_id).await?;
            ctx.current_step_stats.processed_elems += 1;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn remove_orphan_artworks(&self, ctx: &mut ScanContext) -> Result<()> {
        tracing::debug!("Checking orphan artworks");
        let pool = self.deps.db.pool();

        let mut tx = pool.begin().await?;
        let orphans = artworks::find_orphans(&mut *tx).await?;
        ctx.current_step_stats.total_elems += orphans.len();
        for artwork_id in orphans {
            if self.deps.aborted() {
                break;
            }
            artworks::remove(&mut tx, artwork_id).await?;
            ctx.current_step_stats.processed_elems += 1;
        }
        tx.commit().await?;
        Ok(())
    }
}
