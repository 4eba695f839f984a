//! Artist reconciliation step
//!
//! Artists sharing a MusicBrainz id whose names differ only by
//! normalization (case and whitespace) are merged into the earliest one;
//! links and artwork move with them.

use crate::scanner::context::ScanContext;
use crate::scanner::steps::{ScanStep, StepDeps};
use async_trait::async_trait;
use mezzo_common::db::artists;
use mezzo_common::db::models::Artist;
use mezzo_common::events::ScanStepKind;
use mezzo_common::Result;
use std::sync::Arc;

pub(crate) struct ReconciliateArtistsStep {
    deps: Arc<StepDeps>,
}

impl ReconciliateArtistsStep {
    pub fn new(deps: Arc<StepDeps>) -> Self {
        Self { deps }
    }
}

fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[async_trait]
impl ScanStep for ReconciliateArtistsStep {
    fn kind(&self) -> ScanStepKind {
        ScanStepKind::ReconciliateArtists
    }

    async fn process(&self, ctx: &mut ScanContext) -> Result<()> {
        let pool = self.deps.db.pool();

        // Ordered by (mbid, id): the first of each group is the keeper
        let duplicated = artists::find_mbid_duplicates(pool).await?;
        ctx.current_step_stats.total_elems = duplicated.len();
        self.deps.report(ctx);

        let mut keeper: Option<Artist> = None;
        for artist in duplicated {
            if self.deps.aborted() {
                return Ok(());
            }

            let same_group = keeper
                .as_ref()
                .map(|k| k.mb_artist_id == artist.mb_artist_id)
                .unwrap_or(false);

            if !same_group {
                keeper = Some(artist);
            } else if let Some(keeper) = &keeper {
                if normalize_name(&keeper.name) == normalize_name(&artist.name) {
                    tracing::info!(
                        from = %artist.name,
                        into = %keeper.name,
                        "Merging duplicated artist"
                    );
                    let mut tx = pool.begin().await?;
                    artists::relink_tracks(&mut tx, artist.id, keeper.id).await?;
                    if keeper.artwork_id.is_none() {
                        if let Some(artwork_id) = artist.artwork_id {
                            artists::set_artwork(&mut *tx, keeper.id, artwork_id).await?;
                        }
                    }
                    artists::remove(&mut *tx, artist.id).await?;
                    tx.commit().await?;
                }
            }

            ctx.current_step_stats.processed_elems += 1;
        }

        self.deps.report(ctx);
        Ok(())
    }
}
