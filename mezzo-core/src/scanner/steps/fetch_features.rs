//! Feature sidecar import step
//!
//! An external analyzer can leave a `<audio file>.features.json` sidecar
//! next to each track: a JSON object mapping feature names to number
//! arrays. This step imports the registered subset of those maps for tracks
//! that have no feature record yet. Vectors with a wrong dimensionality are
//! kept here and rejected later, at training time, with a warning.

use crate::recommend::features::is_registered_feature;
use crate::scanner::context::ScanContext;
use crate::scanner::steps::{ScanStep, StepDeps, WRITE_BATCH_SIZE};
use async_trait::async_trait;
use mezzo_common::db::features::{self, FeatureMap};
use mezzo_common::db::tracks;
use mezzo_common::events::{ScanError, ScanStepKind};
use mezzo_common::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const SIDECAR_SUFFIX: &str = ".features.json";

pub(crate) struct FetchTrackFeaturesStep {
    deps: Arc<StepDeps>,
}

impl FetchTrackFeaturesStep {
    pub fn new(deps: Arc<StepDeps>) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl ScanStep for FetchTrackFeaturesStep {
    fn kind(&self) -> ScanStepKind {
        ScanStepKind::FetchTrackFeatures
    }

    async fn process(&self, ctx: &mut ScanContext) -> Result<()> {
        let pending = tracks::find_paths_without_features(self.deps.db.pool()).await?;

        ctx.current_step_stats.total_elems = pending.len();
        self.deps.report(ctx);

        for (index, (track_id, path)) in pending.iter().enumerate() {
            if self.deps.aborted() {
                return Ok(());
            }

            let sidecar = PathBuf::from(format!("{path}{SIDECAR_SUFFIX}"));
            if sidecar.is_file() {
                match read_sidecar(&sidecar) {
                    Ok(features) if !features.is_empty() => {
                        features::upsert(self.deps.db.pool(), *track_id, &features).await?;
                        ctx.stats.features_fetched += 1;
                    }
                    Ok(_) => {
                        tracing::debug!(
                            path = %sidecar.display(),
                            "Feature sidecar holds no registered feature"
                        );
                    }
                    Err(message) => {
                        ctx.stats.push_error(ScanError::Io {
                            path: sidecar.clone(),
                            message,
                        });
                    }
                }
            }

            ctx.current_step_stats.processed_elems += 1;
            if (index + 1) % WRITE_BATCH_SIZE == 0 {
                self.deps.report(ctx);
            }
        }

        self.deps.report(ctx);
        Ok(())
    }
}

/// Parse a sidecar, keeping only registered feature names
fn read_sidecar(path: &Path) -> std::result::Result<FeatureMap, String> {
    let content = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    let raw: FeatureMap = serde_json::from_str(&content).map_err(|e| e.to_string())?;

    Ok(raw
        .into_iter()
        .filter(|(name, _)| is_registered_feature(name))
        .collect())
}
