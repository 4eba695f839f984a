//! Per-track acoustic feature records
//!
//! Feature maps (feature name → vector of reals) are stored as JSON text;
//! the recommendation engine parses them at load time.

use crate::db::models::TrackId;
use crate::Result;
use sqlx::SqliteExecutor;
use std::collections::BTreeMap;

/// A parsed feature map. BTreeMap keeps lookups and iteration stable.
pub type FeatureMap = BTreeMap<String, Vec<f64>>;

pub async fn upsert(ex: impl SqliteExecutor<'_>, track: TrackId, features: &FeatureMap) -> Result<()> {
    let json = serde_json::to_string(features)
        .map_err(|e| crate::Error::CorruptRecord(format!("Cannot serialize feature map: {e}")))?;
    sqlx::query(
        "INSERT INTO track_features (track_id, features_json) VALUES (?, ?)
         ON CONFLICT(track_id) DO UPDATE SET features_json = excluded.features_json",
    )
    .bind(track)
    .bind(json)
    .execute(ex)
    .await?;
    Ok(())
}

pub async fn find(ex: impl SqliteExecutor<'_>, track: TrackId) -> Result<Option<FeatureMap>> {
    let json: Option<String> =
        sqlx::query_scalar("SELECT features_json FROM track_features WHERE track_id = ?")
            .bind(track)
            .fetch_optional(ex)
            .await?;
    match json {
        Some(json) => Ok(Some(parse(&json)?)),
        None => Ok(None),
    }
}

/// Every feature record in the catalog, ordered by track id
pub async fn find_all(ex: impl SqliteExecutor<'_>) -> Result<Vec<(TrackId, FeatureMap)>> {
    let rows: Vec<(TrackId, String)> =
        sqlx::query_as("SELECT track_id, features_json FROM track_features ORDER BY track_id")
            .fetch_all(ex)
            .await?;

    let mut results = Vec::with_capacity(rows.len());
    for (track, json) in rows {
        results.push((track, parse(&json)?));
    }
    Ok(results)
}

pub async fn count(ex: impl SqliteExecutor<'_>) -> Result<usize> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM track_features")
        .fetch_one(ex)
        .await?;
    Ok(count as usize)
}

fn parse(json: &str) -> Result<FeatureMap> {
    serde_json::from_str(json)
        .map_err(|e| crate::Error::CorruptRecord(format!("Cannot parse stored feature map: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;

    #[tokio::test]
    async fn test_upsert_and_read_back() {
        let db = Db::open_in_memory().await.unwrap();

        let mut features = FeatureMap::new();
        features.insert("gfcc.mean".to_string(), vec![0.1, 0.2, 0.3]);
        features.insert("average_loudness".to_string(), vec![0.7]);

        upsert(db.pool(), TrackId(1), &features).await.unwrap();
        let read = find(db.pool(), TrackId(1)).await.unwrap().unwrap();
        assert_eq!(read, features);

        // Overwrite
        features.insert("average_loudness".to_string(), vec![0.9]);
        upsert(db.pool(), TrackId(1), &features).await.unwrap();
        assert_eq!(count(db.pool()).await.unwrap(), 1);
        let read = find(db.pool(), TrackId(1)).await.unwrap().unwrap();
        assert_eq!(read["average_loudness"], vec![0.9]);
    }
}
