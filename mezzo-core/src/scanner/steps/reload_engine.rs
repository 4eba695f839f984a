//! Similarity engine reload step
//!
//! When the scan changed the catalog, the recommendation engine is
//! re-trained against the new state. An unchanged catalog leaves the
//! previously loaded engine untouched.

use crate::scanner::context::ScanContext;
use crate::scanner::steps::{ScanStep, StepDeps};
use async_trait::async_trait;
use mezzo_common::events::ScanStepKind;
use mezzo_common::Result;
use std::sync::Arc;

pub(crate) struct ReloadSimilarityEngineStep {
    deps: Arc<StepDeps>,
}

impl ReloadSimilarityEngineStep {
    pub fn new(deps: Arc<StepDeps>) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl ScanStep for ReloadSimilarityEngineStep {
    fn kind(&self) -> ScanStepKind {
        ScanStepKind::ReloadSimilarityEngine
    }

    async fn process(&self, ctx: &mut ScanContext) -> Result<()> {
        if ctx.stats.changes_count() == 0 {
            tracing::debug!("Catalog unchanged, not reloading the similarity engine");
            return Ok(());
        }

        let deps = Arc::clone(&self.deps);
        let step_stats = &mut ctx.current_step_stats;
        self.deps
            .engine
            .load(true, |progress| {
                step_stats.total_elems = progress.iteration_count;
                step_stats.processed_elems = progress.id_iteration + 1;
                (deps.progress)(step_stats);
            })
            .await?;

        Ok(())
    }
}
