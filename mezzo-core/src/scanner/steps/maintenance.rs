//! Maintenance steps
//!
//! Idempotent catalog upkeep passes: denormalized statistics, view
//! re-creation, compaction and query planner statistics.

use crate::scanner::context::ScanContext;
use crate::scanner::steps::{ScanStep, StepDeps};
use async_trait::async_trait;
use mezzo_common::db::{clusters, libraries, schema};
use mezzo_common::events::ScanStepKind;
use mezzo_common::Result;
use std::sync::Arc;

pub(crate) struct ComputeClusterStatsStep {
    deps: Arc<StepDeps>,
}

impl ComputeClusterStatsStep {
    pub fn new(deps: Arc<StepDeps>) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl ScanStep for ComputeClusterStatsStep {
    fn kind(&self) -> ScanStepKind {
        ScanStepKind::ComputeClusterStats
    }

    async fn process(&self, ctx: &mut ScanContext) -> Result<()> {
        clusters::refresh_track_counts(self.deps.db.pool()).await?;
        self.deps.report(ctx);
        Ok(())
    }
}

pub(crate) struct UpdateLibraryFieldsStep {
    deps: Arc<StepDeps>,
}

impl UpdateLibraryFieldsStep {
    pub fn new(deps: Arc<StepDeps>) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl ScanStep for UpdateLibraryFieldsStep {
    fn kind(&self) -> ScanStepKind {
        ScanStepKind::UpdateLibraryFields
    }

    async fn process(&self, ctx: &mut ScanContext) -> Result<()> {
        libraries::refresh_stats(self.deps.db.pool()).await?;
        self.deps.report(ctx);
        Ok(())
    }
}

pub(crate) struct RecreateViewsStep {
    deps: Arc<StepDeps>,
}

impl RecreateViewsStep {
    pub fn new(deps: Arc<StepDeps>) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl ScanStep for RecreateViewsStep {
    fn kind(&self) -> ScanStepKind {
        ScanStepKind::RecreateViews
    }

    async fn process(&self, ctx: &mut ScanContext) -> Result<()> {
        tracing::debug!("Recreating views");

        let mut tx = self.deps.db.pool().begin().await?;
        for (name, ddl) in schema::VIEWS {
            sqlx::query(&format!("DROP VIEW IF EXISTS {name}"))
                .execute(&mut *tx)
                .await?;
            sqlx::query(ddl).execute(&mut *tx).await?;
        }
        tx.commit().await?;

        self.deps.report(ctx);
        Ok(())
    }
}

pub(crate) struct CompactStep {
    deps: Arc<StepDeps>,
}

impl CompactStep {
    pub fn new(deps: Arc<StepDeps>) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl ScanStep for CompactStep {
    fn kind(&self) -> ScanStepKind {
        ScanStepKind::Compact
    }

    async fn process(&self, ctx: &mut ScanContext) -> Result<()> {
        tracing::debug!("Compacting database");
        // VACUUM cannot run inside a transaction
        sqlx::query("VACUUM").execute(self.deps.db.pool()).await?;
        self.deps.report(ctx);
        Ok(())
    }
}

pub(crate) struct OptimizeStep {
    deps: Arc<StepDeps>,
}

impl OptimizeStep {
    pub fn new(deps: Arc<StepDeps>) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl ScanStep for OptimizeStep {
    fn kind(&self) -> ScanStepKind {
        ScanStepKind::Optimize
    }

    async fn process(&self, ctx: &mut ScanContext) -> Result<()> {
        tracing::debug!("Optimizing database");
        sqlx::query("ANALYZE").execute(self.deps.db.pool()).await?;
        sqlx::query("PRAGMA optimize")
            .execute(self.deps.db.pool())
            .await?;
        self.deps.report(ctx);
        Ok(())
    }
}
