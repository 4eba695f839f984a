//! Recommendation engine
//!
//! Trains a self-organizing map from per-track feature vectors (or loads a
//! previously trained one from the cache) and answers similar-track /
//! similar-release / similar-artist queries by walking the trained grid.

use crate::recommend::cache::{EngineCache, TrackPositions};
use crate::recommend::features::{feature_dimension, TrainSettings};
use crate::recommend::som::{DataNormalizer, InputVector, Network, Position};
use mezzo_common::db::models::{ArtistId, ReleaseId, TrackArtistLinkType, TrackId};
use mezzo_common::db::{self, Db};
use mezzo_common::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::hash::Hash;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};

/// Ratio applied to the median neighbor distance when growing the search
/// area of a similarity query
const GROWTH_DISTANCE_RATIO: f64 = 0.75;

/// Training progress, forwarded to the caller's callback
#[derive(Debug, Clone, Copy)]
pub struct TrainProgress {
    pub id_iteration: usize,
    pub iteration_count: usize,
}

/// Grid-position → ids index, one cell per network position
struct PositionMap<T> {
    width: u32,
    cells: Vec<Vec<T>>,
}

impl<T: Copy + PartialEq> PositionMap<T> {
    fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            cells: vec![Vec::new(); (width * height) as usize],
        }
    }

    fn get(&self, position: Position) -> &[T] {
        &self.cells[(position.y * self.width + position.x) as usize]
    }

    fn push_if_absent(&mut self, position: Position, value: T) {
        let cell = &mut self.cells[(position.y * self.width + position.x) as usize];
        if !cell.contains(&value) {
            cell.push(value);
        }
    }
}

fn push_if_absent<T: PartialEq>(values: &mut Vec<T>, value: T) {
    if !values.contains(&value) {
        values.push(value);
    }
}

struct EngineState {
    network: Network,
    ref_vectors_distance_median: f64,
    track_positions: HashMap<TrackId, Vec<Position>>,
    track_matrix: PositionMap<TrackId>,
    release_positions: HashMap<ReleaseId, Vec<Position>>,
    release_matrix: PositionMap<ReleaseId>,
    artist_positions: HashMap<ArtistId, Vec<Position>>,
    artist_matrix: HashMap<TrackArtistLinkType, PositionMap<ArtistId>>,
}

/// SOM trainer and similarity query service
pub struct FeatureEngine {
    db: Db,
    cache_dir: PathBuf,
    train_settings: TrainSettings,
    load_cancelled: AtomicBool,
    state: RwLock<Option<EngineState>>,
    rng: Mutex<StdRng>,
}

impl FeatureEngine {
    pub fn new(db: Db, cache_dir: PathBuf) -> Self {
        Self::with_rng(db, cache_dir, StdRng::from_entropy())
    }

    /// Engine with a fixed seed, for reproducible training
    pub fn with_seed(db: Db, cache_dir: PathBuf, seed: u64) -> Self {
        Self::with_rng(db, cache_dir, StdRng::seed_from_u64(seed))
    }

    fn with_rng(db: Db, cache_dir: PathBuf, rng: StdRng) -> Self {
        Self {
            db,
            cache_dir,
            train_settings: TrainSettings::default(),
            load_cancelled: AtomicBool::new(false),
            state: RwLock::new(None),
            rng: Mutex::new(rng),
        }
    }

    /// Whether a trained network is installed
    pub fn is_loaded(&self) -> bool {
        self.state.read().unwrap().is_some()
    }

    /// Ask a running `load` to stop at its next checkpoint. The previous
    /// state (if any) stays installed.
    pub fn request_cancel_load(&self) {
        tracing::debug!("Requesting feature engine load cancellation");
        self.load_cancelled.store(true, Ordering::Relaxed);
    }

    fn cancelled(&self) -> bool {
        self.load_cancelled.load(Ordering::Relaxed)
    }

    /// Load the engine: from the disk cache when allowed and present,
    /// otherwise by training from the catalog's feature records.
    pub async fn load(
        &self,
        force_reload: bool,
        progress: impl FnMut(TrainProgress),
    ) -> Result<()> {
        self.load_cancelled.store(false, Ordering::Relaxed);

        if force_reload {
            EngineCache::invalidate(&self.cache_dir);
        } else if let Some(cache) = EngineCache::read(&self.cache_dir) {
            self.install(cache.network, cache.track_positions).await?;
            return Ok(());
        }

        self.load_from_training(progress).await
    }

    async fn load_from_training(&self, mut progress: impl FnMut(TrainProgress)) -> Result<()> {
        let settings = &self.train_settings;
        let dimensions = settings.total_dimensions();

        tracing::info!(dimensions, "Constructing feature engine");

        let records = db::features::find_all(self.db.pool()).await?;

        let mut samples: Vec<InputVector> = Vec::with_capacity(records.len());
        let mut sample_tracks: Vec<TrackId> = Vec::with_capacity(records.len());

        'records: for (track, feature_map) in records {
            if self.cancelled() {
                return Ok(());
            }

            let mut values: Vec<f64> = Vec::with_capacity(dimensions);
            for (name, _) in &settings.feature_settings {
                let Some(expected) = feature_dimension(name) else {
                    continue;
                };
                match feature_map.get(name) {
                    Some(vector) if vector.len() == expected => values.extend(vector),
                    Some(vector) => {
                        tracing::warn!(
                            track = %track,
                            feature = %name,
                            expected,
                            got = vector.len(),
                            "Feature dimension mismatch, skipping track"
                        );
                        continue 'records;
                    }
                    None => continue 'records,
                }
            }

            samples.push(InputVector::from_vec(values));
            sample_tracks.push(track);
        }

        if samples.is_empty() {
            tracing::info!("Nothing to classify");
            return Ok(());
        }

        tracing::debug!(count = samples.len(), "Normalizing samples");
        let normalizer = DataNormalizer::compute(&samples, dimensions);
        for sample in &mut samples {
            normalizer.normalize(sample);
        }

        let mut size = ((samples.len() / settings.samples_per_neuron) as f64).sqrt() as u32;
        if size < 2 {
            tracing::warn!(
                count = samples.len(),
                "Very few tracks are being used by the feature engine, expect bad behaviors"
            );
            size = 2;
        }
        tracing::info!(
            count = samples.len(),
            size,
            "Constructing a {size}x{size} network"
        );

        let (network, track_positions) = {
            let mut rng = self.rng.lock().unwrap();

            let mut network = Network::new_random(size, size, dimensions, &mut *rng);
            network
                .set_data_weights(self.build_data_weights(dimensions))
                .map_err(|e| mezzo_common::Error::Engine(e.to_string()))?;

            tracing::debug!("Training network");
            network.train(
                &samples,
                settings.iteration_count,
                &mut *rng,
                |iteration| {
                    tracing::debug!(
                        pass = iteration.id_iteration,
                        count = iteration.iteration_count,
                        "Training pass complete"
                    );
                    progress(TrainProgress {
                        id_iteration: iteration.id_iteration,
                        iteration_count: iteration.iteration_count,
                    });
                },
                || self.cancelled(),
            );
            if self.cancelled() {
                return Ok(());
            }
            tracing::debug!("Training network done");

            let mut track_positions = TrackPositions::new();
            for (sample, track) in samples.iter().zip(&sample_tracks) {
                if self.cancelled() {
                    return Ok(());
                }
                let position = network.closest_ref_vector_position(sample);
                push_if_absent(track_positions.entry(*track).or_default(), position);
            }

            (network, track_positions)
        };

        let cache = EngineCache::new(network.clone(), track_positions.clone());
        self.install(network, track_positions).await?;

        if !self.cancelled() {
            if let Err(e) = cache.write(&self.cache_dir) {
                tracing::warn!(error = %e, "Feature engine state will be re-trained next time");
            }
        }

        Ok(())
    }

    /// Per-dimension weights: each component of feature j contributes
    /// (1 / Dⱼ) · weightⱼ
    fn build_data_weights(&self, dimensions: usize) -> InputVector {
        let mut weights = Vec::with_capacity(dimensions);
        for (name, feature_settings) in &self.train_settings.feature_settings {
            let Some(feature_dims) = feature_dimension(name) else {
                continue;
            };
            for _ in 0..feature_dims {
                weights.push(1.0 / feature_dims as f64 * feature_settings.weight);
            }
        }
        InputVector::from_vec(weights)
    }

    /// Build the position indexes and swap in the new state
    async fn install(&self, network: Network, track_positions: TrackPositions) -> Result<()> {
        let median = network.ref_vectors_distance_median();
        tracing::debug!(median, "Median distance between ref vectors");

        let width = network.width();
        let height = network.height();

        let mut state = EngineState {
            network,
            ref_vectors_distance_median: median,
            track_positions: HashMap::new(),
            track_matrix: PositionMap::new(width, height),
            release_positions: HashMap::new(),
            release_matrix: PositionMap::new(width, height),
            artist_positions: HashMap::new(),
            artist_matrix: HashMap::new(),
        };

        let mut track_ids: Vec<TrackId> = track_positions.keys().copied().collect();
        track_ids.sort();

        for track_id in track_ids {
            if self.cancelled() {
                return Ok(());
            }

            let Some(track) = db::tracks::find_by_id(self.db.pool(), track_id).await? else {
                continue;
            };
            let links = db::artists::find_links_for_track(self.db.pool(), track_id).await?;

            for &position in &track_positions[&track_id] {
                push_if_absent(state.track_positions.entry(track_id).or_default(), position);
                state.track_matrix.push_if_absent(position, track_id);

                if let Some(release_id) = track.release_id {
                    push_if_absent(
                        state.release_positions.entry(release_id).or_default(),
                        position,
                    );
                    state.release_matrix.push_if_absent(position, release_id);
                }

                for &(artist_id, link_type) in &links {
                    push_if_absent(
                        state.artist_positions.entry(artist_id).or_default(),
                        position,
                    );
                    state
                        .artist_matrix
                        .entry(link_type)
                        .or_insert_with(|| PositionMap::new(width, height))
                        .push_if_absent(position, artist_id);
                }
            }
        }

        *self.state.write().unwrap() = Some(state);
        tracing::info!("Feature engine loaded");
        Ok(())
    }

    /// Tracks similar to the given set, most related first
    pub async fn find_similar_tracks(
        &self,
        track_ids: &[TrackId],
        max_count: usize,
    ) -> Result<Vec<TrackId>> {
        let candidates = {
            let state = self.state.read().unwrap();
            let Some(state) = state.as_ref() else {
                return Ok(Vec::new());
            };
            find_similar_in(
                state,
                track_ids,
                &state.track_matrix,
                &state.track_positions,
                max_count,
            )
        };

        // Tracks may have been removed since the engine was trained
        let mut existing = Vec::with_capacity(candidates.len());
        for id in candidates {
            if db::tracks::exists(self.db.pool(), id).await? {
                existing.push(id);
            }
        }
        Ok(existing)
    }

    /// Releases similar to the given release
    pub async fn find_similar_releases(
        &self,
        release_id: ReleaseId,
        max_count: usize,
    ) -> Result<Vec<ReleaseId>> {
        let candidates = {
            let state = self.state.read().unwrap();
            let Some(state) = state.as_ref() else {
                return Ok(Vec::new());
            };
            find_similar_in(
                state,
                &[release_id],
                &state.release_matrix,
                &state.release_positions,
                max_count,
            )
        };

        let mut existing = Vec::with_capacity(candidates.len());
        for id in candidates {
            if db::releases::exists(self.db.pool(), id).await? {
                existing.push(id);
            }
        }
        Ok(existing)
    }

    /// Artists similar to the given artist, unioned across the requested
    /// link types. An over-full union is trimmed at random down to
    /// `max_count`.
    pub async fn find_similar_artists(
        &self,
        artist_id: ArtistId,
        link_types: &[TrackArtistLinkType],
        max_count: usize,
    ) -> Result<Vec<ArtistId>> {
        let candidates = {
            let state = self.state.read().unwrap();
            let Some(state) = state.as_ref() else {
                return Ok(Vec::new());
            };

            let mut union: Vec<ArtistId> = Vec::new();
            for link_type in link_types {
                let Some(matrix) = state.artist_matrix.get(link_type) else {
                    continue;
                };
                for id in find_similar_in(
                    state,
                    &[artist_id],
                    matrix,
                    &state.artist_positions,
                    max_count,
                ) {
                    push_if_absent(&mut union, id);
                }
            }
            union
        };

        let mut existing = Vec::with_capacity(candidates.len());
        for id in candidates {
            if db::artists::exists(self.db.pool(), id).await? {
                existing.push(id);
            }
        }

        let mut rng = self.rng.lock().unwrap();
        while existing.len() > max_count {
            let index = rng.gen_range(0..existing.len());
            existing.remove(index);
        }

        Ok(existing)
    }
}

/// Iterative grid search: start from the seed positions of the input ids,
/// collect co-located ids, and grow the seed set one nearby cell at a time
/// until enough results are found or no close-enough neighbor remains.
fn find_similar_in<T: Copy + Eq + Hash>(
    state: &EngineState,
    input_ids: &[T],
    matrix: &PositionMap<T>,
    positions: &HashMap<T, Vec<Position>>,
    max_count: usize,
) -> Vec<T> {
    let max_distance = state.ref_vectors_distance_median * GROWTH_DISTANCE_RATIO;

    let mut seeds: Vec<Position> = Vec::new();
    for id in input_ids {
        if let Some(id_positions) = positions.get(id) {
            for &position in id_positions {
                push_if_absent(&mut seeds, position);
            }
        }
    }
    if seeds.is_empty() {
        return Vec::new();
    }

    let mut result: Vec<T> = Vec::new();
    loop {
        for &seed in &seeds {
            for &id in matrix.get(seed) {
                if input_ids.contains(&id) || result.contains(&id) {
                    continue;
                }
                result.push(id);
                if result.len() == max_count {
                    return result;
                }
            }
        }

        match state
            .network
            .closest_neighbour_position(&seeds, max_distance)
        {
            Some(grown) => seeds.push(grown),
            None => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mezzo_common::db::models::MediaLibraryId;
    use mezzo_common::db::tracks::NewTrack;
    use std::path::Path;

    async fn insert_track(db: &Db, path: &str) -> TrackId {
        db::tracks::upsert(
            db.pool(),
            &NewTrack {
                absolute_path: path,
                file_size: 1000,
                last_write_time: Utc::now(),
                content_hash: None,
                mb_track_id: None,
                name: None,
                duration_secs: 120.0,
                track_number: None,
                disc_number: None,
                total_tracks: None,
                release_id: None,
                media_library_id: MediaLibraryId(1),
                has_embedded_artwork: false,
            },
        )
        .await
        .unwrap()
    }

    /// 6x6 grid, D=1, checkerboard ref values except (1, 0) pulled close to
    /// (0, 0). Median neighbor distance is 1.0.
    fn test_network() -> Network {
        let mut network = Network::new(6, 6, 1);
        for y in 0..6 {
            for x in 0..6 {
                let value = if (x, y) == (1, 0) {
                    0.1
                } else {
                    ((x + y) % 2) as f64
                };
                network
                    .set_ref_vector(Position::new(x, y), InputVector::from_vec(vec![value]))
                    .unwrap();
            }
        }
        assert_eq!(network.ref_vectors_distance_median(), 1.0);
        network
    }

    #[tokio::test]
    async fn test_similarity_grows_through_close_neighbours_only() {
        let db = Db::open_in_memory().await.unwrap();
        let engine = FeatureEngine::with_seed(db.clone(), PathBuf::from("/nonexistent"), 3);

        let t1 = insert_track(&db, "/m/1.flac").await;
        let t2 = insert_track(&db, "/m/2.flac").await;
        let t3 = insert_track(&db, "/m/3.flac").await;
        let t4 = insert_track(&db, "/m/4.flac").await;

        let mut positions = TrackPositions::new();
        positions.insert(t1, vec![Position::new(0, 0)]);
        positions.insert(t2, vec![Position::new(0, 0)]);
        positions.insert(t3, vec![Position::new(1, 0)]);
        positions.insert(t4, vec![Position::new(5, 5)]);

        engine.install(test_network(), positions).await.unwrap();

        // T2 shares the seed position; T3 sits on the one close-enough
        // neighbor; T4 is beyond the growth threshold
        let similar = engine.find_similar_tracks(&[t1], 2).await.unwrap();
        assert_eq!(similar, vec![t2, t3]);

        let similar = engine.find_similar_tracks(&[t1], 10).await.unwrap();
        assert_eq!(similar, vec![t2, t3]);
    }

    #[tokio::test]
    async fn test_similarity_excludes_inputs_and_missing_tracks() {
        let db = Db::open_in_memory().await.unwrap();
        let engine = FeatureEngine::with_seed(db.clone(), PathBuf::from("/nonexistent"), 3);

        let t1 = insert_track(&db, "/m/1.flac").await;
        let t2 = insert_track(&db, "/m/2.flac").await;
        let ghost = TrackId(9999);

        let mut positions = TrackPositions::new();
        positions.insert(t1, vec![Position::new(0, 0)]);
        positions.insert(t2, vec![Position::new(0, 0)]);
        positions.insert(ghost, vec![Position::new(0, 0)]);

        engine.install(test_network(), positions).await.unwrap();

        let similar = engine.find_similar_tracks(&[t1], 10).await.unwrap();
        assert!(!similar.contains(&t1));
        assert!(!similar.contains(&ghost));
        assert_eq!(similar, vec![t2]);
    }

    #[tokio::test]
    async fn test_unknown_input_yields_empty_result() {
        let db = Db::open_in_memory().await.unwrap();
        let engine = FeatureEngine::with_seed(db.clone(), PathBuf::from("/nonexistent"), 3);
        engine
            .install(test_network(), TrackPositions::new())
            .await
            .unwrap();

        let similar = engine
            .find_similar_tracks(&[TrackId(123)], 5)
            .await
            .unwrap();
        assert!(similar.is_empty());
    }

    #[tokio::test]
    async fn test_load_with_no_features_leaves_engine_unloaded() {
        let dir = tempfile::tempdir().unwrap();
        let db = Db::open_in_memory().await.unwrap();
        let engine = FeatureEngine::with_seed(db.clone(), dir.path().to_path_buf(), 3);

        engine.load(true, |_| {}).await.unwrap();
        assert!(!engine.is_loaded());
        assert!(engine
            .find_similar_tracks(&[TrackId(1)], 5)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_train_then_reload_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let db = Db::open_in_memory().await.unwrap();

        // A handful of tracks with one-dimensional feature records
        let mut ids = Vec::new();
        for i in 0..8 {
            let id = insert_track(&db, &format!("/m/{i}.flac")).await;
            let mut features = db::features::FeatureMap::new();
            features.insert("average_loudness".to_string(), vec![i as f64 / 8.0]);
            db::features::upsert(db.pool(), id, &features).await.unwrap();
            ids.push(id);
        }

        let engine = FeatureEngine::with_seed(db.clone(), dir.path().to_path_buf(), 3);
        let mut settings = TrainSettings::default();
        settings.feature_settings = vec![(
            "average_loudness".to_string(),
            crate::recommend::features::FeatureSettings { weight: 1.0 },
        )];

        let engine = FeatureEngine {
            train_settings: settings,
            ..engine
        };

        let mut passes = 0;
        engine.load(true, |_| passes += 1).await.unwrap();
        assert!(engine.is_loaded());
        assert_eq!(passes, engine.train_settings.iteration_count);

        // A second engine picks the trained state up from the cache
        let engine2 = FeatureEngine::with_seed(db.clone(), dir.path().to_path_buf(), 99);
        engine2
            .load(false, |_| panic!("cache load must not train"))
            .await
            .unwrap();
        assert!(engine2.is_loaded());
    }
}
