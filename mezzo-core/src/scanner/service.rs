//! Scanner service
//!
//! Owns the scan pipeline: schedules periodic runs, serves immediate scan
//! requests (coalesced to at most one pending), surfaces status snapshots
//! and publishes scanner events. At most one scan is in flight; its context
//! is mutated only by the scanner task.

use crate::artwork::ArtworkService;
use crate::recommend::FeatureEngine;
use crate::scanner::context::{ScanContext, ScannerSettings};
use crate::scanner::schedule::next_scan_time;
use crate::scanner::steps::{build_pipeline, StepDeps};
use chrono::{DateTime, Local, Utc};
use mezzo_common::db::{self, Db};
use mezzo_common::events::{MezzoEvent, ScanStats, ScanStepStats};
use mezzo_common::{Error, EventBus, Settings};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Scheduling state of the scanner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScannerState {
    NotScheduled,
    Scheduled { at: DateTime<Utc> },
    InProgress,
}

/// Point-in-time snapshot of the scanner
#[derive(Debug, Clone)]
pub struct Status {
    pub state: ScannerState,
    pub last_complete_scan_stats: Option<ScanStats>,
    pub current_step_stats: Option<ScanStepStats>,
}

struct StatusInner {
    state: ScannerState,
    last_complete_scan_stats: Option<ScanStats>,
    current_step_stats: Option<ScanStepStats>,
}

struct ScanRequest {
    force: bool,
}

struct ScannerInner {
    db: Db,
    settings: ScannerSettings,
    events: EventBus,
    artwork: Arc<ArtworkService>,
    engine: Arc<FeatureEngine>,
    abort_scan: Arc<AtomicBool>,
    status: Mutex<StatusInner>,
}

/// Handle on the scanner; cheap to clone
#[derive(Clone)]
pub struct ScannerService {
    inner: Arc<ScannerInner>,
    scan_tx: mpsc::Sender<ScanRequest>,
    reload_tx: mpsc::Sender<()>,
}

impl ScannerService {
    /// Build the service and start its scheduler task
    pub fn start(
        db: Db,
        settings: &Settings,
        events: EventBus,
        artwork: Arc<ArtworkService>,
        engine: Arc<FeatureEngine>,
    ) -> Self {
        // Capacity 1: a request arriving while one is pending is coalesced
        let (scan_tx, scan_rx) = mpsc::channel(1);
        let (reload_tx, reload_rx) = mpsc::channel(1);

        let inner = Arc::new(ScannerInner {
            db,
            settings: ScannerSettings::from_settings(settings),
            events,
            artwork,
            engine,
            abort_scan: Arc::new(AtomicBool::new(false)),
            status: Mutex::new(StatusInner {
                state: ScannerState::NotScheduled,
                last_complete_scan_stats: None,
                current_step_stats: None,
            }),
        });

        tokio::spawn(run_scheduler(Arc::clone(&inner), scan_rx, reload_rx));

        Self {
            inner,
            scan_tx,
            reload_tx,
        }
    }

    /// Fire-and-forget scan request. While a scan is running, at most one
    /// further request stays pending; the rest are coalesced into it.
    pub fn request_immediate_scan(&self, force: bool) {
        if self.scan_tx.try_send(ScanRequest { force }).is_err() {
            tracing::debug!("Scan already pending, request coalesced");
        }
    }

    /// Cooperative cancellation: the running scan exits at its next
    /// checkpoint
    pub fn request_stop(&self) {
        tracing::info!("Scan stop requested");
        self.inner.abort_scan.store(true, Ordering::Relaxed);
        self.inner.engine.request_cancel_load();
    }

    /// Cancel any in-flight scan and recompute the schedule against the
    /// current media library set
    pub fn request_reload(&self) {
        self.inner.abort_scan.store(true, Ordering::Relaxed);
        self.inner.engine.request_cancel_load();
        let _ = self.reload_tx.try_send(());
    }

    pub fn get_status(&self) -> Status {
        let status = self.inner.status.lock().unwrap();
        Status {
            state: status.state,
            last_complete_scan_stats: status.last_complete_scan_stats.clone(),
            current_step_stats: status.current_step_stats.clone(),
        }
    }
}

async fn run_scheduler(
    inner: Arc<ScannerInner>,
    mut scan_rx: mpsc::Receiver<ScanRequest>,
    mut reload_rx: mpsc::Receiver<()>,
) {
    loop {
        let next = next_scan_time(
            inner.settings.update_period,
            inner.settings.update_start_time,
            Local::now(),
        );

        {
            let mut status = inner.status.lock().unwrap();
            status.state = match next {
                Some(at) => ScannerState::Scheduled {
                    at: at.with_timezone(&Utc),
                },
                None => ScannerState::NotScheduled,
            };
        }
        if let Some(at) = next {
            inner.events.emit_lossy(MezzoEvent::ScanScheduled {
                at: at.with_timezone(&Utc),
            });
        }

        let wait = next.map(|at| {
            (at.with_timezone(&Utc) - Utc::now())
                .to_std()
                .unwrap_or_default()
        });

        tokio::select! {
            request = scan_rx.recv() => match request {
                Some(request) => run_scan(&inner, request.force).await,
                None => break,
            },
            _ = reload_rx.recv() => {
                tracing::debug!("Reloading scanner schedule");
                continue;
            }
            _ = async {
                match wait {
                    Some(wait) => tokio::time::sleep(wait).await,
                    None => std::future::pending::<()>().await,
                }
            } => run_scan(&inner, false).await,
        }
    }
}

/// Drive the whole pipeline once
async fn run_scan(inner: &Arc<ScannerInner>, force: bool) {
    inner.abort_scan.store(false, Ordering::Relaxed);

    let libraries = match db::libraries::find_all(inner.db.pool()).await {
        Ok(libraries) => libraries,
        Err(e) => {
            tracing::error!(error = %e, "Cannot read media libraries, skipping scan");
            return;
        }
    };

    {
        let mut status = inner.status.lock().unwrap();
        status.state = ScannerState::InProgress;
        status.current_step_stats = None;
    }
    inner.events.emit_lossy(MezzoEvent::ScanStarted {
        timestamp: Utc::now(),
    });
    tracing::info!(force, libraries = libraries.len(), "Scan started");

    let progress_inner = Arc::clone(inner);
    let deps = Arc::new(StepDeps {
        db: inner.db.clone(),
        settings: inner.settings.clone(),
        abort: Arc::clone(&inner.abort_scan),
        engine: Arc::clone(&inner.engine),
        progress: Box::new(move |step_stats: &ScanStepStats| {
            progress_inner.status.lock().unwrap().current_step_stats = Some(step_stats.clone());
            progress_inner.events.emit_lossy(MezzoEvent::ScanProgress {
                step: step_stats.clone(),
            });
        }),
    });

    let steps = build_pipeline(Arc::clone(&deps));
    let mut ctx = ScanContext::new(libraries, force, steps.len());

    for (index, step) in steps.iter().enumerate() {
        if inner.abort_scan.load(Ordering::Relaxed) {
            tracing::info!("Scan aborted");
            break;
        }

        ctx.begin_step(index, step.kind());
        deps.report(&ctx);
        tracing::debug!(step = step.kind().name(), "Scan step started");

        match step.process(&mut ctx).await {
            Ok(()) => {}
            Err(Error::Database(e)) => {
                // The catalog is unusable; stop here and report what we have
                tracing::error!(step = step.kind().name(), error = %e, "Scan aborted on database error");
                break;
            }
            Err(e) => {
                tracing::error!(step = step.kind().name(), error = %e, "Scan step failed");
            }
        }
    }

    ctx.stats.stop_time = Some(Utc::now());
    let changed = ctx.stats.changes_count() > 0;

    // Flush before anyone observes the completion, so post-scan artwork
    // fetches never serve stale images
    if changed {
        inner.artwork.flush_cache();
    }

    tracing::info!(
        additions = ctx.stats.additions,
        updates = ctx.stats.updates,
        deletions = ctx.stats.deletions,
        skips = ctx.stats.skips,
        failures = ctx.stats.failures,
        duplicates = ctx.stats.duplicates.len(),
        "Scan complete"
    );

    {
        let mut status = inner.status.lock().unwrap();
        status.last_complete_scan_stats = Some(ctx.stats.clone());
        status.current_step_stats = None;
    }
    inner.events.emit_lossy(MezzoEvent::ScanComplete {
        stats: ctx.stats,
        changed,
    });
}
