//! Durable storage of a trained network
//!
//! Two sibling XML files under the cache directory: `network` holds the grid
//! (dimensions, data weights, reference vectors), `track_positions` maps
//! track ids to their grid positions. Either file missing or malformed means
//! the cache is absent and training starts from scratch.

use crate::recommend::som::{Coordinate, InputVector, Network, Position};
use mezzo_common::db::models::TrackId;
use mezzo_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub type TrackPositions = HashMap<TrackId, Vec<Position>>;

/// A deserialized engine cache, ready to install
pub struct EngineCache {
    pub network: Network,
    pub track_positions: TrackPositions,
}

const NETWORK_FILE: &str = "network";
const TRACK_POSITIONS_FILE: &str = "track_positions";

fn network_file_path(cache_dir: &Path) -> PathBuf {
    cache_dir.join(NETWORK_FILE)
}

fn track_positions_file_path(cache_dir: &Path) -> PathBuf {
    cache_dir.join(TRACK_POSITIONS_FILE)
}

// XML layout of the `network` file

#[derive(Serialize, Deserialize)]
#[serde(rename = "network")]
struct NetworkFile {
    width: Coordinate,
    height: Coordinate,
    dim_count: usize,
    weights: WeightsNode,
    ref_vectors: RefVectorsNode,
}

#[derive(Serialize, Deserialize)]
struct WeightsNode {
    #[serde(rename = "weight", default)]
    weight: Vec<f64>,
}

#[derive(Serialize, Deserialize)]
struct RefVectorsNode {
    #[serde(rename = "ref_vector", default)]
    ref_vector: Vec<RefVectorNode>,
}

#[derive(Serialize, Deserialize)]
struct RefVectorNode {
    coord_x: Coordinate,
    coord_y: Coordinate,
    values: ValuesNode,
}

#[derive(Serialize, Deserialize)]
struct ValuesNode {
    #[serde(rename = "value", default)]
    value: Vec<f64>,
}

// XML layout of the `track_positions` file

#[derive(Serialize, Deserialize)]
#[serde(rename = "objects")]
struct ObjectsFile {
    #[serde(rename = "object", default)]
    object: Vec<ObjectNode>,
}

#[derive(Serialize, Deserialize)]
struct ObjectNode {
    id: i64,
    position: PositionsNode,
}

#[derive(Serialize, Deserialize)]
struct PositionsNode {
    #[serde(rename = "position", default)]
    position: Vec<PositionNode>,
}

#[derive(Serialize, Deserialize)]
struct PositionNode {
    x: Coordinate,
    y: Coordinate,
}

impl EngineCache {
    pub fn new(network: Network, track_positions: TrackPositions) -> Self {
        Self {
            network,
            track_positions,
        }
    }

    /// Read the cache, returning `None` when any part is missing or
    /// malformed
    pub fn read(cache_dir: &Path) -> Option<EngineCache> {
        let network = match read_network(&network_file_path(cache_dir)) {
            Ok(network) => network?,
            Err(e) => {
                tracing::error!(error = %e, "Cannot read network cache");
                return None;
            }
        };

        let track_positions =
            match read_track_positions(&track_positions_file_path(cache_dir)) {
                Ok(positions) => positions?,
                Err(e) => {
                    tracing::error!(error = %e, "Cannot read track positions cache");
                    return None;
                }
            };

        tracing::info!("Read feature engine state from cache");
        Some(EngineCache::new(network, track_positions))
    }

    /// Persist both files. A failure on either removes both so a partial
    /// cache can never be read back.
    pub fn write(&self, cache_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(cache_dir)?;

        if let Err(e) = write_network(&self.network, &network_file_path(cache_dir)).and_then(
            |_| write_track_positions(&self.track_positions, &track_positions_file_path(cache_dir)),
        ) {
            tracing::error!(error = %e, "Cannot write feature engine cache, invalidating");
            Self::invalidate(cache_dir);
            return Err(e);
        }

        tracing::debug!("Created feature engine cache");
        Ok(())
    }

    /// Remove both cache files
    pub fn invalidate(cache_dir: &Path) {
        let _ = std::fs::remove_file(network_file_path(cache_dir));
        let _ = std::fs::remove_file(track_positions_file_path(cache_dir));
    }
}

fn read_network(path: &Path) -> Result<Option<Network>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(path)?;
    let file: NetworkFile = quick_xml::de::from_str(&content)
        .map_err(|e| Error::Engine(format!("Malformed network cache: {e}")))?;

    let mut network = Network::new(file.width, file.height, file.dim_count);
    network
        .set_data_weights(InputVector::from_vec(file.weights.weight))
        .map_err(|e| Error::Engine(format!("Bad network cache weights: {e}")))?;

    let expected = (file.width as usize) * (file.height as usize);
    if file.ref_vectors.ref_vector.len() != expected {
        return Err(Error::Engine(format!(
            "Bad network cache: expected {expected} ref vectors, got {}",
            file.ref_vectors.ref_vector.len()
        )));
    }

    for node in file.ref_vectors.ref_vector {
        network
            .set_ref_vector(
                Position::new(node.coord_x, node.coord_y),
                InputVector::from_vec(node.values.value),
            )
            .map_err(|e| Error::Engine(format!("Bad network cache ref vector: {e}")))?;
    }

    Ok(Some(network))
}

fn write_network(network: &Network, path: &Path) -> Result<()> {
    let mut ref_vectors = Vec::with_capacity(
        (network.width() as usize) * (network.height() as usize),
    );
    for x in 0..network.width() {
        for y in 0..network.height() {
            let position = Position::new(x, y);
            ref_vectors.push(RefVectorNode {
                coord_x: x,
                coord_y: y,
                values: ValuesNode {
                    value: network.ref_vector(position).as_slice().to_vec(),
                },
            });
        }
    }

    let file = NetworkFile {
        width: network.width(),
        height: network.height(),
        dim_count: network.input_dim_count(),
        weights: WeightsNode {
            weight: network.data_weights().as_slice().to_vec(),
        },
        ref_vectors: RefVectorsNode {
            ref_vector: ref_vectors,
        },
    };

    let xml = quick_xml::se::to_string(&file)
        .map_err(|e| Error::Engine(format!("Cannot serialize network cache: {e}")))?;
    std::fs::write(path, xml)?;
    Ok(())
}

fn read_track_positions(path: &Path) -> Result<Option<TrackPositions>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(path)?;
    let file: ObjectsFile = quick_xml::de::from_str(&content)
        .map_err(|e| Error::Engine(format!("Malformed track positions cache: {e}")))?;

    let mut positions = TrackPositions::new();
    for object in file.object {
        let entry = positions.entry(TrackId(object.id)).or_default();
        for position in object.position.position {
            entry.push(Position::new(position.x, position.y));
        }
    }

    Ok(Some(positions))
}

fn write_track_positions(track_positions: &TrackPositions, path: &Path) -> Result<()> {
    // Sort by id so the file is stable across runs
    let mut ids: Vec<TrackId> = track_positions.keys().copied().collect();
    ids.sort();

    let objects = ids
        .into_iter()
        .map(|id| ObjectNode {
            id: id.0,
            position: PositionsNode {
                position: track_positions[&id]
                    .iter()
                    .map(|p| PositionNode { x: p.x, y: p.y })
                    .collect(),
            },
        })
        .collect();

    let xml = quick_xml::se::to_string(&ObjectsFile { object: objects })
        .map_err(|e| Error::Engine(format!("Cannot serialize track positions cache: {e}")))?;
    std::fs::write(path, xml)?;
    Ok(())
}
