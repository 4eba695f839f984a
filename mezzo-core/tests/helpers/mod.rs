//! Shared test helpers: audio fixtures and scan driving

#![allow(dead_code)]

use lofty::config::WriteOptions;
use lofty::tag::{Accessor, ItemKey, Tag, TagExt, TagType};
use mezzo_common::db::Db;
use mezzo_common::events::{MezzoEvent, ScanStats};
use mezzo_common::{EventBus, Settings};
use mezzo_core::{ArtworkService, FeatureEngine, ScannerService};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;

/// Tag fields applied to a generated audio file
#[derive(Default, Clone)]
pub struct TrackTags {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub track_number: Option<u32>,
    pub track_total: Option<u32>,
    pub genre: Option<String>,
    pub mb_track_id: Option<String>,
}

/// Write a one-second 44.1 kHz mono WAV file
pub fn write_wav(path: &Path) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 44100,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for i in 0..44100u32 {
        let sample = ((i as f32 * 0.05).sin() * 8000.0) as i16;
        writer.write_sample(sample).unwrap();
    }
    writer.finalize().unwrap();
}

/// Apply tags to an existing audio file
pub fn tag_file(path: &Path, tags: &TrackTags) {
    let mut tag = Tag::new(TagType::Id3v2);
    if let Some(title) = &tags.title {
        tag.set_title(title.clone());
    }
    if let Some(artist) = &tags.artist {
        tag.set_artist(artist.clone());
    }
    if let Some(album) = &tags.album {
        tag.set_album(album.clone());
    }
    if let Some(track_number) = tags.track_number {
        tag.set_track(track_number);
    }
    if let Some(track_total) = tags.track_total {
        tag.set_track_total(track_total);
    }
    if let Some(genre) = &tags.genre {
        tag.set_genre(genre.clone());
    }
    if let Some(mbid) = &tags.mb_track_id {
        tag.insert_text(ItemKey::MusicBrainzRecordingId, mbid.clone());
    }
    tag.save_to_path(path, WriteOptions::default()).unwrap();
}

/// A tagged WAV file in one call
pub fn write_tagged_wav(path: &Path, tags: &TrackTags) {
    write_wav(path);
    tag_file(path, tags);
}

/// Everything a scan test needs
pub struct TestServer {
    pub db: Db,
    pub events: EventBus,
    pub scanner: ScannerService,
    pub artwork: Arc<ArtworkService>,
    pub engine: Arc<FeatureEngine>,
    pub working_dir: TempDir,
}

/// In-memory catalog + services wired against `library_root`
pub async fn start_server(library_root: &Path) -> TestServer {
    let working_dir = TempDir::new().unwrap();
    let db = Db::open_in_memory().await.unwrap();

    {
        let mut conn = db.pool().acquire().await.unwrap();
        mezzo_common::db::libraries::create(&mut conn, "main", library_root)
            .await
            .unwrap();
    }

    let settings = Settings {
        working_dir: working_dir.path().to_path_buf(),
        ..Settings::default()
    };

    let release_svg = working_dir.path().join("default-release.svg");
    let artist_svg = working_dir.path().join("default-artist.svg");
    std::fs::write(&release_svg, b"<?xml version=\"1.0\"?><svg></svg>").unwrap();
    std::fs::write(&artist_svg, b"<?xml version=\"1.0\"?><svg></svg>").unwrap();

    let events = EventBus::new(1000);
    let artwork =
        Arc::new(ArtworkService::new(db.clone(), &settings, &release_svg, &artist_svg).unwrap());
    let engine = Arc::new(FeatureEngine::with_seed(
        db.clone(),
        settings.features_cache_dir(),
        1234,
    ));

    let scanner = ScannerService::start(
        db.clone(),
        &settings,
        events.clone(),
        Arc::clone(&artwork),
        Arc::clone(&engine),
    );

    TestServer {
        db,
        events,
        scanner,
        artwork,
        engine,
        working_dir,
    }
}

/// Request a scan and block until its completion event
pub async fn scan_and_wait(server: &TestServer, force: bool) -> (ScanStats, bool) {
    let mut rx = server.events.subscribe();
    server.scanner.request_immediate_scan(force);
    wait_for_scan_complete(&mut rx).await
}

/// Drain events until `ScanComplete`
pub async fn wait_for_scan_complete(
    rx: &mut broadcast::Receiver<MezzoEvent>,
) -> (ScanStats, bool) {
    let deadline = Duration::from_secs(60);
    tokio::time::timeout(deadline, async {
        loop {
            match rx.recv().await {
                Ok(MezzoEvent::ScanComplete { stats, changed }) => return (stats, changed),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(e) => panic!("event stream closed: {e}"),
            }
        }
    })
    .await
    .expect("scan did not complete in time")
}
