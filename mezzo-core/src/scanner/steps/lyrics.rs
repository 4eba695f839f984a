//! External lyrics association step
//!
//! Records `.lrc`/`.txt` sidecars sharing a track's file stem. The lyrics
//! content is not parsed here; unreadable sidecars are reported as scan
//! errors.

use crate::scanner::context::ScanContext;
use crate::scanner::steps::{ScanStep, StepDeps, WRITE_BATCH_SIZE};
use async_trait::async_trait;
use mezzo_common::db::models::TrackId;
use mezzo_common::db::{lyrics, tracks};
use mezzo_common::events::{ScanError, ScanStepKind};
use mezzo_common::Result;
use std::path::Path;
use std::sync::Arc;

const LYRICS_EXTENSIONS: &[&str] = &["lrc", "txt"];

pub(crate) struct AssociateExternalLyricsStep {
    deps: Arc<StepDeps>,
}

impl AssociateExternalLyricsStep {
    pub fn new(deps: Arc<StepDeps>) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl ScanStep for AssociateExternalLyricsStep {
    fn kind(&self) -> ScanStepKind {
        ScanStepKind::AssociateExternalLyrics
    }

    async fn process(&self, ctx: &mut ScanContext) -> Result<()> {
        let pool = self.deps.db.pool();

        ctx.current_step_stats.total_elems = tracks::count(pool).await?;
        self.deps.report(ctx);

        let mut last_seen = TrackId(0);
        loop {
            let batch = tracks::find_paths_after(pool, last_seen, WRITE_BATCH_SIZE).await?;
            if batch.is_empty() {
                break;
            }
            last_seen = batch.last().map(|(id, _)| *id).unwrap_or(last_seen);

            for (track_id, path) in &batch {
                if self.deps.aborted() {
                    return Ok(());
                }

                for extension in LYRICS_EXTENSIONS {
                    let sidecar = Path::new(path).with_extension(extension);
                    if !sidecar.is_file() {
                        continue;
                    }
                    // Make sure the sidecar is actually readable before
                    // recording it
                    match std::fs::File::open(&sidecar) {
                        Ok(_) => {
                            lyrics::upsert(pool, *track_id, &sidecar.to_string_lossy())
                                .await?;
                        }
                        Err(e) => {
                            tracing::warn!(
                                path = %sidecar.display(),
                                error = %e,
                                "Cannot read lyrics file"
                            );
                            ctx.stats
                                .push_error(ScanError::LyricsFile { path: sidecar });
                        }
                    }
                }

                ctx.current_step_stats.processed_elems += 1;
            }

            self.deps.report(ctx);
        }

        Ok(())
    }
}
