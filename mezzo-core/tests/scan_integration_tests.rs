//! End-to-end scan pipeline tests
//!
//! Each test builds a real library tree in a tempdir, runs a full scan
//! through the scanner service and checks the catalog and the reported
//! statistics.

mod helpers;

use helpers::*;
use mezzo_common::db::models::TrackArtistLinkType;
use mezzo_common::db::{artists as db_artists, lyrics as db_lyrics, playlists as db_playlists,
    releases as db_releases, tracks as db_tracks};
use mezzo_common::events::{DuplicateReason, ScanError};
use tempfile::TempDir;

#[tokio::test]
async fn test_minimal_scan_adds_track_artist_release() {
    let root = TempDir::new().unwrap();
    let file = root.path().join("a.wav");
    write_tagged_wav(
        &file,
        &TrackTags {
            title: Some("Song".into()),
            artist: Some("A".into()),
            album: Some("R".into()),
            track_number: Some(1),
            track_total: Some(1),
            ..TrackTags::default()
        },
    );

    let server = start_server(root.path()).await;
    let (stats, changed) = scan_and_wait(&server, false).await;

    assert!(changed);
    assert_eq!(stats.additions, 1);
    assert_eq!(stats.skips, 0);
    assert_eq!(stats.deletions, 0);
    assert_eq!(stats.updates, 0);
    assert_eq!(stats.failures, 0);
    assert_eq!(stats.total_file_count, 1);

    let track = db_tracks::find_by_path(server.db.pool(), &file.to_string_lossy())
        .await
        .unwrap()
        .expect("track should be in the catalog");
    assert!(track.duration_secs > 0.0);
    assert_eq!(track.name.as_deref(), Some("Song"));
    assert_eq!(track.track_number, Some(1));

    let release_id = track.release_id.expect("release should be linked");
    let release = db_releases::find_by_id(server.db.pool(), release_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(release.name, "R");
    assert_eq!(release.total_discs, 1);

    let links = db_artists::find_links_for_track(server.db.pool(), track.id)
        .await
        .unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].1, TrackArtistLinkType::Artist);
    let artist = db_artists::find_by_id(server.db.pool(), links[0].0)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(artist.name, "A");
}

#[tokio::test]
async fn test_ignored_subtree_is_skipped() {
    let root = TempDir::new().unwrap();
    let sub = root.path().join("x");
    std::fs::create_dir(&sub).unwrap();
    write_tagged_wav(&sub.join("t.wav"), &TrackTags::default());
    std::fs::write(sub.join(".lmsignore"), b"").unwrap();

    let server = start_server(root.path()).await;
    let (stats, _) = scan_and_wait(&server, false).await;

    assert_eq!(stats.additions, 0);
    assert_eq!(stats.total_file_count, 0);
}

#[tokio::test]
async fn test_rescan_without_changes_only_skips() {
    let root = TempDir::new().unwrap();
    for name in ["a.wav", "b.wav"] {
        write_tagged_wav(
            &root.path().join(name),
            &TrackTags {
                artist: Some("A".into()),
                album: Some("R".into()),
                ..TrackTags::default()
            },
        );
    }

    let server = start_server(root.path()).await;
    let (first, _) = scan_and_wait(&server, false).await;
    assert_eq!(first.additions, 2);

    let (second, changed) = scan_and_wait(&server, false).await;
    assert!(!changed);
    assert_eq!(second.additions, 0);
    assert_eq!(second.deletions, 0);
    assert_eq!(second.updates, 0);
    assert_eq!(second.skips, second.total_file_count);
    assert_eq!(second.skips, 2);
}

#[tokio::test]
async fn test_force_scan_on_empty_root_completes_unchanged() {
    let root = TempDir::new().unwrap();
    let server = start_server(root.path()).await;

    let (stats, changed) = scan_and_wait(&server, true).await;
    assert_eq!(stats.total_file_count, 0);
    assert!(!changed);
}

#[tokio::test]
async fn test_identical_files_are_reported_as_duplicates() {
    let root = TempDir::new().unwrap();
    let first = root.path().join("a.wav");
    write_tagged_wav(
        &first,
        &TrackTags {
            artist: Some("A".into()),
            ..TrackTags::default()
        },
    );
    // Byte-identical copy: same content hash
    std::fs::copy(&first, root.path().join("b.wav")).unwrap();

    let server = start_server(root.path()).await;
    let (stats, _) = scan_and_wait(&server, false).await;

    assert_eq!(stats.additions, 2);
    assert_eq!(stats.duplicates.len(), 1);
    assert_eq!(stats.duplicates[0].reason, DuplicateReason::SameHash);

    // Both tracks stay in the catalog; the flagged one is the second
    // discovered (higher id)
    let a = db_tracks::find_by_path(
        server.db.pool(),
        &root.path().join("a.wav").to_string_lossy(),
    )
    .await
    .unwrap()
    .unwrap();
    let b = db_tracks::find_by_path(
        server.db.pool(),
        &root.path().join("b.wav").to_string_lossy(),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(stats.duplicates[0].track_id, a.id.max(b.id));
}

#[tokio::test]
async fn test_removed_file_and_orphans_are_cleaned_up() {
    let root = TempDir::new().unwrap();
    let file = root.path().join("a.wav");
    write_tagged_wav(
        &file,
        &TrackTags {
            artist: Some("Lonesome".into()),
            album: Some("Gone".into()),
            ..TrackTags::default()
        },
    );

    let server = start_server(root.path()).await;
    let (first, _) = scan_and_wait(&server, false).await;
    assert_eq!(first.additions, 1);

    std::fs::remove_file(&file).unwrap();
    let (second, changed) = scan_and_wait(&server, false).await;

    assert!(changed);
    assert_eq!(second.deletions, 1);
    assert!(db_tracks::find_by_path(server.db.pool(), &file.to_string_lossy())
        .await
        .unwrap()
        .is_none());

    // The artist and release lost their last track and were swept
    assert!(db_artists::find_orphans(server.db.pool())
        .await
        .unwrap()
        .is_empty());
    assert!(db_releases::find_orphans(server.db.pool())
        .await
        .unwrap()
        .is_empty());
    assert_eq!(db_tracks::count(server.db.pool()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_unparseable_file_is_a_failure_and_counters_add_up() {
    let root = TempDir::new().unwrap();
    write_tagged_wav(
        &root.path().join("good.wav"),
        &TrackTags {
            artist: Some("A".into()),
            ..TrackTags::default()
        },
    );
    std::fs::write(root.path().join("bad.wav"), b"definitely not audio").unwrap();

    let server = start_server(root.path()).await;
    let (stats, _) = scan_and_wait(&server, false).await;

    assert_eq!(stats.total_file_count, 2);
    assert_eq!(stats.additions, 1);
    assert_eq!(stats.failures, 1);
    assert_eq!(stats.errors_count, 1);
    assert!(matches!(
        stats.errors[0],
        ScanError::AudioFile { .. } | ScanError::NoAudioTrackFound { .. }
    ));

    // scans = additions + updates + failures; total = skips + scans
    assert_eq!(stats.scans, stats.additions + stats.updates + stats.failures);
    assert_eq!(stats.total_file_count, stats.skips + stats.scans);
}

#[tokio::test]
async fn test_modified_file_is_an_update() {
    let root = TempDir::new().unwrap();
    let file = root.path().join("a.wav");
    write_tagged_wav(
        &file,
        &TrackTags {
            title: Some("Before".into()),
            ..TrackTags::default()
        },
    );

    let server = start_server(root.path()).await;
    scan_and_wait(&server, false).await;

    // Rewrite with a different title and a different size; wait so the
    // second-granularity mtime moves too
    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
    write_tagged_wav(
        &file,
        &TrackTags {
            title: Some("After the change".into()),
            ..TrackTags::default()
        },
    );

    let (stats, _) = scan_and_wait(&server, false).await;
    assert_eq!(stats.updates, 1);
    assert_eq!(stats.additions, 0);

    let track = db_tracks::find_by_path(server.db.pool(), &file.to_string_lossy())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(track.name.as_deref(), Some("After the change"));
}

#[tokio::test]
async fn test_release_cover_file_is_associated_and_served() {
    let root = TempDir::new().unwrap();
    write_tagged_wav(
        &root.path().join("a.wav"),
        &TrackTags {
            artist: Some("A".into()),
            album: Some("R".into()),
            ..TrackTags::default()
        },
    );

    // A tiny but real PNG as the cover
    let png = image::RgbImage::from_pixel(8, 8, image::Rgb([200, 100, 50]));
    let mut png_bytes = Vec::new();
    image::DynamicImage::ImageRgb8(png)
        .write_to(
            &mut std::io::Cursor::new(&mut png_bytes),
            image::ImageFormat::Png,
        )
        .unwrap();
    std::fs::write(root.path().join("cover.png"), &png_bytes).unwrap();

    let server = start_server(root.path()).await;
    scan_and_wait(&server, false).await;

    let track = db_tracks::find_by_path(
        server.db.pool(),
        &root.path().join("a.wav").to_string_lossy(),
    )
    .await
    .unwrap()
    .unwrap();
    let release_id = track.release_id.unwrap();

    let release = db_releases::find_by_id(server.db.pool(), release_id)
        .await
        .unwrap()
        .unwrap();
    assert!(release.artwork_id.is_some());

    // Raw fetch passes the original bytes through
    let image = server
        .artwork
        .get_release_image(release_id, None)
        .await
        .unwrap()
        .expect("release artwork should resolve");
    assert_eq!(image.mime_type(), "image/png");
    assert_eq!(image.data(), png_bytes.as_slice());
}

#[tokio::test]
async fn test_lyrics_sidecar_is_recorded() {
    let root = TempDir::new().unwrap();
    let file = root.path().join("a.wav");
    write_tagged_wav(&file, &TrackTags::default());
    std::fs::write(
        root.path().join("a.lrc"),
        "[00:01.00]First line\n[00:05.00]Second line\n",
    )
    .unwrap();

    let server = start_server(root.path()).await;
    scan_and_wait(&server, false).await;

    let track = db_tracks::find_by_path(server.db.pool(), &file.to_string_lossy())
        .await
        .unwrap()
        .unwrap();
    let lyrics = db_lyrics::find_for_track(server.db.pool(), track.id)
        .await
        .unwrap();
    assert_eq!(lyrics.len(), 1);
    assert!(lyrics[0].ends_with("a.lrc"));
}

#[tokio::test]
async fn test_playlist_resolution_reports_missing_entries() {
    let root = TempDir::new().unwrap();
    write_tagged_wav(&root.path().join("a.wav"), &TrackTags::default());
    std::fs::write(
        root.path().join("mix.m3u"),
        "#EXTM3U\na.wav\nnot-there.wav\n",
    )
    .unwrap();

    let server = start_server(root.path()).await;
    let (stats, _) = scan_and_wait(&server, false).await;

    assert!(stats.errors.iter().any(|e| matches!(
        e,
        ScanError::PlayListFilePathMissing { entry, .. } if entry == "not-there.wav"
    )));

    let playlists = db_playlists::find_all(server.db.pool()).await.unwrap();
    assert_eq!(playlists.len(), 1);
    assert_eq!(playlists[0].name, "mix");
    let tracks = db_playlists::find_tracks(server.db.pool(), playlists[0].id)
        .await
        .unwrap();
    assert_eq!(tracks.len(), 1);
}

#[tokio::test]
async fn test_feature_sidecars_feed_the_similarity_engine() {
    let root = TempDir::new().unwrap();

    for i in 0..4 {
        let file = root.path().join(format!("t{i}.wav"));
        write_tagged_wav(
            &file,
            &TrackTags {
                title: Some(format!("T{i}")),
                ..TrackTags::default()
            },
        );

        let features = serde_json::json!({
            "spectral_energyband_high.mean": [0.1 * i as f64],
            "spectral_rolloff.median": [0.2 * i as f64],
            "spectral_contrast_valleys.var": [0.1, 0.2, 0.3, 0.4, 0.5, 0.6],
            "erbbands.mean": vec![0.5; 40],
            "gfcc.mean": vec![0.25; 13],
        });
        std::fs::write(
            format!("{}.features.json", file.display()),
            serde_json::to_vec(&features).unwrap(),
        )
        .unwrap();
    }

    let server = start_server(root.path()).await;
    let (stats, changed) = scan_and_wait(&server, false).await;

    assert!(changed);
    assert_eq!(stats.additions, 4);
    assert_eq!(stats.features_fetched, 4);

    // The final pipeline step trained the engine on the imported features
    assert!(server.engine.is_loaded());

    let a_track = db_tracks::find_by_path(
        server.db.pool(),
        &root.path().join("t0.wav").to_string_lossy(),
    )
    .await
    .unwrap()
    .unwrap();
    let similar = server
        .engine
        .find_similar_tracks(&[a_track.id], 3)
        .await
        .unwrap();
    assert!(similar.len() <= 3);
    assert!(!similar.contains(&a_track.id));
}
