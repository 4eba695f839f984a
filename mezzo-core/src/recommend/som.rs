//! Self-organizing map
//!
//! A fixed-size 2-D grid of reference vectors trained to topologically
//! approximate the distribution of the input samples. Distances are weighted
//! squared euclidean; the training schedule uses an exponential decay for
//! both the learning factor and the neighborhood radius.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SomError {
    #[error("Bad data dimension count: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Position ({x}, {y}) outside {width}x{height} grid")]
    OutOfGrid {
        x: Coordinate,
        y: Coordinate,
        width: Coordinate,
        height: Coordinate,
    },
}

pub type Coordinate = u32;

/// A cell position in the grid
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Position {
    pub x: Coordinate,
    pub y: Coordinate,
}

impl Position {
    pub fn new(x: Coordinate, y: Coordinate) -> Self {
        Self { x, y }
    }
}

/// A fixed-length vector of reals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputVector(Vec<f64>);

impl InputVector {
    /// Zero vector of the given dimension
    pub fn zeroed(dimensions: usize) -> Self {
        Self(vec![0.0; dimensions])
    }

    /// Vector of ones, the neutral data weight
    pub fn ones(dimensions: usize) -> Self {
        Self(vec![1.0; dimensions])
    }

    pub fn from_vec(values: Vec<f64>) -> Self {
        Self(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, f64> {
        self.0.iter()
    }

    /// Weighted squared euclidean distance: Σᵢ wᵢ·(xᵢ − yᵢ)²
    pub fn euclidean_distance_squared(&self, other: &InputVector, weights: &InputVector) -> f64 {
        self.0
            .iter()
            .zip(&other.0)
            .zip(&weights.0)
            .map(|((a, b), w)| w * (a - b) * (a - b))
            .sum()
    }
}

impl std::ops::Index<usize> for InputVector {
    type Output = f64;

    fn index(&self, index: usize) -> &f64 {
        &self.0[index]
    }
}

impl std::ops::IndexMut<usize> for InputVector {
    fn index_mut(&mut self, index: usize) -> &mut f64 {
        &mut self.0[index]
    }
}

/// Training loop progress
#[derive(Debug, Clone, Copy)]
pub struct CurrentIteration {
    pub id_iteration: usize,
    pub iteration_count: usize,
}

/// The 2-D grid of reference vectors
#[derive(Debug, Clone)]
pub struct Network {
    width: Coordinate,
    height: Coordinate,
    input_dim_count: usize,
    weights: InputVector,
    // Row-major: index = y * width + x
    ref_vectors: Vec<InputVector>,
}

impl Network {
    /// Grid with zeroed reference vectors and neutral data weights
    pub fn new(width: Coordinate, height: Coordinate, input_dim_count: usize) -> Self {
        Self {
            width,
            height,
            input_dim_count,
            weights: InputVector::ones(input_dim_count),
            ref_vectors: vec![InputVector::zeroed(input_dim_count); (width * height) as usize],
        }
    }

    /// Grid with each reference vector drawn uniformly from [0, 1)^D
    pub fn new_random<R: Rng>(
        width: Coordinate,
        height: Coordinate,
        input_dim_count: usize,
        rng: &mut R,
    ) -> Self {
        let mut network = Self::new(width, height, input_dim_count);
        for ref_vector in &mut network.ref_vectors {
            for value in &mut ref_vector.0 {
                *value = rng.gen_range(0.0..1.0);
            }
        }
        network
    }

    pub fn width(&self) -> Coordinate {
        self.width
    }

    pub fn height(&self) -> Coordinate {
        self.height
    }

    pub fn input_dim_count(&self) -> usize {
        self.input_dim_count
    }

    pub fn data_weights(&self) -> &InputVector {
        &self.weights
    }

    pub fn set_data_weights(&mut self, weights: InputVector) -> Result<(), SomError> {
        self.check_dimensions(&weights)?;
        self.weights = weights;
        Ok(())
    }

    pub fn ref_vector(&self, position: Position) -> &InputVector {
        &self.ref_vectors[self.cell_index(position)]
    }

    pub fn set_ref_vector(
        &mut self,
        position: Position,
        data: InputVector,
    ) -> Result<(), SomError> {
        self.check_dimensions(&data)?;
        self.check_position(position)?;
        let index = self.cell_index(position);
        self.ref_vectors[index] = data;
        Ok(())
    }

    /// Distance between the reference vectors of two cells
    pub fn ref_vectors_distance(&self, a: Position, b: Position) -> f64 {
        self.ref_vector(a)
            .euclidean_distance_squared(self.ref_vector(b), &self.weights)
    }

    /// Median of the distances between all horizontally and vertically
    /// adjacent cell pairs
    pub fn ref_vectors_distance_median(&self) -> f64 {
        let mut values = Vec::with_capacity(
            (2 * self.width * self.height - self.width - self.height) as usize,
        );
        for y in 0..self.height {
            for x in 0..self.width {
                if x != self.width - 1 {
                    values.push(self.ref_vectors_distance(
                        Position::new(x, y),
                        Position::new(x + 1, y),
                    ));
                }
                if y != self.height - 1 {
                    values.push(self.ref_vectors_distance(
                        Position::new(x, y),
                        Position::new(x, y + 1),
                    ));
                }
            }
        }

        if values.is_empty() {
            return 0.0;
        }
        values.sort_by(|a, b| a.total_cmp(b));
        values[if values.len() > 1 {
            values.len() / 2 - 1
        } else {
            0
        }]
    }

    /// Position of the best matching unit for `data`. Ties are broken toward
    /// the smallest (row, column).
    pub fn closest_ref_vector_position(&self, data: &InputVector) -> Position {
        let mut best = Position::new(0, 0);
        let mut best_distance = f64::INFINITY;
        for y in 0..self.height {
            for x in 0..self.width {
                let position = Position::new(x, y);
                let distance = self
                    .ref_vector(position)
                    .euclidean_distance_squared(data, &self.weights);
                if distance < best_distance {
                    best_distance = distance;
                    best = position;
                }
            }
        }
        best
    }

    /// Grid neighbor closest to the given position set
    ///
    /// Considers every cell von-Neumann adjacent to the set but not in it,
    /// keeps those whose reference-vector distance to the nearest set member
    /// is at most `max_distance`, and returns the closest one.
    pub fn closest_neighbour_position(
        &self,
        positions: &[Position],
        max_distance: f64,
    ) -> Option<Position> {
        let mut neighbours: Vec<Position> = Vec::new();
        for &position in positions {
            let mut candidates = Vec::with_capacity(4);
            if position.y > 0 {
                candidates.push(Position::new(position.x, position.y - 1));
            }
            if position.y < self.height - 1 {
                candidates.push(Position::new(position.x, position.y + 1));
            }
            if position.x > 0 {
                candidates.push(Position::new(position.x - 1, position.y));
            }
            if position.x < self.width - 1 {
                candidates.push(Position::new(position.x + 1, position.y));
            }
            for candidate in candidates {
                if !positions.contains(&candidate) && !neighbours.contains(&candidate) {
                    neighbours.push(candidate);
                }
            }
        }

        let mut best: Option<(Position, f64)> = None;
        for neighbour in neighbours {
            let distance = positions
                .iter()
                .map(|&p| self.ref_vectors_distance(p, neighbour))
                .fold(f64::INFINITY, f64::min);
            if distance > max_distance {
                continue;
            }
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((neighbour, distance));
            }
        }

        best.map(|(position, _)| position)
    }

    /// Train the grid on `samples` for `nb_iterations` passes
    ///
    /// Samples are re-shuffled every iteration. `should_stop` is polled at
    /// the start of each iteration and before each sample; when it returns
    /// true the last partial state is kept.
    pub fn train<R: Rng>(
        &mut self,
        samples: &[InputVector],
        nb_iterations: usize,
        rng: &mut R,
        mut progress: impl FnMut(CurrentIteration),
        mut should_stop: impl FnMut() -> bool,
    ) {
        let mut shuffled: Vec<usize> = (0..samples.len()).collect();

        for id_iteration in 0..nb_iterations {
            if should_stop() {
                return;
            }

            let iteration = CurrentIteration {
                id_iteration,
                iteration_count: nb_iterations,
            };

            shuffled.shuffle(rng);
            let learning_factor = learning_factor(iteration);

            for &sample_index in &shuffled {
                if should_stop() {
                    return;
                }

                let sample = &samples[sample_index];
                let bmu = self.closest_ref_vector_position(sample);
                self.update_ref_vectors(bmu, sample, learning_factor, iteration);
            }

            progress(iteration);
        }
    }

    fn update_ref_vectors(
        &mut self,
        bmu: Position,
        input: &InputVector,
        learning_factor: f64,
        iteration: CurrentIteration,
    ) {
        let sigma = sigma(iteration);
        for y in 0..self.height {
            for x in 0..self.width {
                let norm_squared = position_norm_squared(Position::new(x, y), bmu);
                let strength =
                    learning_factor * (-norm_squared / (2.0 * sigma * sigma)).exp();

                let index = (y * self.width + x) as usize;
                let ref_vector = &mut self.ref_vectors[index];
                for (value, target) in ref_vector.0.iter_mut().zip(&input.0) {
                    *value += strength * (target - *value);
                }
            }
        }
    }

    fn cell_index(&self, position: Position) -> usize {
        (position.y * self.width + position.x) as usize
    }

    fn check_dimensions(&self, data: &InputVector) -> Result<(), SomError> {
        if data.len() != self.input_dim_count {
            return Err(SomError::DimensionMismatch {
                expected: self.input_dim_count,
                got: data.len(),
            });
        }
        Ok(())
    }

    fn check_position(&self, position: Position) -> Result<(), SomError> {
        if position.x >= self.width || position.y >= self.height {
            return Err(SomError::OutOfGrid {
                x: position.x,
                y: position.y,
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }
}

/// η(i) = exp(−(i+1)/iterationCount)
fn learning_factor(iteration: CurrentIteration) -> f64 {
    (-((iteration.id_iteration + 1) as f64 / iteration.iteration_count as f64)).exp()
}

/// σ(i), same decay schedule as the learning factor with σ₀ = 1
fn sigma(iteration: CurrentIteration) -> f64 {
    (-((iteration.id_iteration + 1) as f64 / iteration.iteration_count as f64)).exp()
}

/// Squared euclidean distance between two grid positions
fn position_norm_squared(a: Position, b: Position) -> f64 {
    let dx = a.x as f64 - b.x as f64;
    let dy = a.y as f64 - b.y as f64;
    dx * dx + dy * dy
}

/// Per-dimension standardization of a sample set
pub struct DataNormalizer {
    means: Vec<f64>,
    std_devs: Vec<f64>,
}

impl DataNormalizer {
    /// Compute per-dimension mean and standard deviation over `samples`.
    /// A zero deviation (constant dimension) is treated as 1.
    pub fn compute(samples: &[InputVector], dimensions: usize) -> Self {
        let count = samples.len().max(1) as f64;

        let mut means = vec![0.0; dimensions];
        for sample in samples {
            for (mean, value) in means.iter_mut().zip(sample.iter()) {
                *mean += value;
            }
        }
        for mean in &mut means {
            *mean /= count;
        }

        let mut std_devs = vec![0.0; dimensions];
        for sample in samples {
            for ((std_dev, mean), value) in std_devs.iter_mut().zip(&means).zip(sample.iter()) {
                *std_dev += (value - mean) * (value - mean);
            }
        }
        for std_dev in &mut std_devs {
            *std_dev = (*std_dev / count).sqrt();
            if *std_dev == 0.0 {
                *std_dev = 1.0;
            }
        }

        Self { means, std_devs }
    }

    /// Transform a sample in place: xⱼ ← (xⱼ − μⱼ) / σⱼ
    pub fn normalize(&self, sample: &mut InputVector) {
        for (index, value) in sample.0.iter_mut().enumerate() {
            *value = (*value - self.means[index]) / self.std_devs[index];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn unit_square_network() -> Network {
        // 2x2 grid, D=2, corners mapped to themselves
        let mut network = Network::new(2, 2, 2);
        network
            .set_ref_vector(Position::new(0, 0), InputVector::from_vec(vec![0.0, 0.0]))
            .unwrap();
        network
            .set_ref_vector(Position::new(1, 0), InputVector::from_vec(vec![1.0, 0.0]))
            .unwrap();
        network
            .set_ref_vector(Position::new(0, 1), InputVector::from_vec(vec![0.0, 1.0]))
            .unwrap();
        network
            .set_ref_vector(Position::new(1, 1), InputVector::from_vec(vec![1.0, 1.0]))
            .unwrap();
        network
    }

    #[test]
    fn test_closest_ref_vector_position() {
        let network = unit_square_network();
        let closest =
            network.closest_ref_vector_position(&InputVector::from_vec(vec![0.9, 0.1]));
        assert_eq!(closest, Position::new(1, 0));
    }

    #[test]
    fn test_closest_position_tie_breaks_to_first_row_column() {
        // All-zero grid: every cell is equally distant
        let network = Network::new(3, 3, 2);
        let closest =
            network.closest_ref_vector_position(&InputVector::from_vec(vec![0.5, 0.5]));
        assert_eq!(closest, Position::new(0, 0));
    }

    #[test]
    fn test_dimension_checks() {
        let mut network = Network::new(2, 2, 3);
        assert_eq!(
            network.set_data_weights(InputVector::ones(2)),
            Err(SomError::DimensionMismatch {
                expected: 3,
                got: 2
            })
        );
        assert!(network
            .set_ref_vector(Position::new(0, 0), InputVector::zeroed(3))
            .is_ok());
        assert!(network
            .set_ref_vector(Position::new(5, 0), InputVector::zeroed(3))
            .is_err());
    }

    #[test]
    fn test_ref_vectors_distance_median() {
        let network = unit_square_network();
        // Four neighbor pairs, each at squared distance 1
        assert_eq!(network.ref_vectors_distance_median(), 1.0);
    }

    #[test]
    fn test_closest_neighbour_with_zero_max_distance() {
        let network = unit_square_network();
        let seeds = [Position::new(0, 0)];
        assert_eq!(network.closest_neighbour_position(&seeds, 0.0), None);

        // With an all-equal grid, a zero max distance matches an adjacent cell
        let flat = Network::new(2, 2, 2);
        assert!(flat
            .closest_neighbour_position(&seeds, 0.0)
            .is_some());
    }

    #[test]
    fn test_closest_neighbour_excludes_the_set_itself() {
        let network = Network::new(2, 1, 2);
        let seeds = [Position::new(0, 0), Position::new(1, 0)];
        assert_eq!(
            network.closest_neighbour_position(&seeds, f64::INFINITY),
            None
        );
    }

    #[test]
    fn test_training_keeps_vectors_finite_with_correct_dimension() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut network = Network::new_random(4, 4, 3, &mut rng);

        let samples: Vec<InputVector> = (0..32)
            .map(|i| {
                InputVector::from_vec(vec![
                    (i % 4) as f64,
                    (i % 7) as f64 * 0.5,
                    (i % 3) as f64 * 2.0,
                ])
            })
            .collect();

        let mut iterations_seen = 0;
        network.train(&samples, 5, &mut rng, |_| iterations_seen += 1, || false);
        assert_eq!(iterations_seen, 5);

        for y in 0..4 {
            for x in 0..4 {
                let ref_vector = network.ref_vector(Position::new(x, y));
                assert_eq!(ref_vector.len(), 3);
                assert!(ref_vector.iter().all(|v| v.is_finite()));
            }
        }
    }

    #[test]
    fn test_training_is_reproducible_with_same_seed() {
        let samples: Vec<InputVector> = (0..16)
            .map(|i| InputVector::from_vec(vec![i as f64, (16 - i) as f64]))
            .collect();

        let run = |seed: u64| {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut network = Network::new_random(3, 3, 2, &mut rng);
            network.train(&samples, 4, &mut rng, |_| {}, || false);
            network
        };

        let a = run(42);
        let b = run(42);
        for y in 0..3 {
            for x in 0..3 {
                assert_eq!(
                    a.ref_vector(Position::new(x, y)),
                    b.ref_vector(Position::new(x, y))
                );
            }
        }
    }

    #[test]
    fn test_training_stops_on_request() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut network = Network::new_random(2, 2, 1, &mut rng);
        let samples = vec![InputVector::from_vec(vec![0.5])];

        let mut calls = 0;
        network.train(
            &samples,
            100,
            &mut rng,
            |_| panic!("no full iteration should complete"),
            || {
                // First poll at iteration start, second before the sample
                calls += 1;
                calls >= 2
            },
        );
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_normalizer_standardizes_each_dimension() {
        let mut samples = vec![
            InputVector::from_vec(vec![1.0, 5.0]),
            InputVector::from_vec(vec![3.0, 5.0]),
        ];

        let normalizer = DataNormalizer::compute(&samples, 2);
        for sample in &mut samples {
            normalizer.normalize(sample);
        }

        assert_eq!(samples[0].as_slice(), &[-1.0, 0.0]);
        assert_eq!(samples[1].as_slice(), &[1.0, 0.0]);
    }
}
