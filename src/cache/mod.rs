use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use tracing::{info, warn};

use crate::core::matrix::DistanceMatrix;
use crate::domain::OptimizationResult;

/// Lowercase hex SHA-256 of the input.
pub fn hex_digest(data: &[u8]) -> String {
    Sha256::digest(data)
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

/// Opens (creating if missing) the SQLite database backing the persistent
/// distance-matrix cache and bootstraps its schema.
pub async fn db_connection(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    let pool = SqlitePool::connect_with(options).await?;
    info!("Connected to SQLite database at {database_url}");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS distance_matrix_cache (
            cache_key TEXT PRIMARY KEY,
            matrix_data TEXT NOT NULL,
            location_ids TEXT NOT NULL,
            time_matrix_data TEXT,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    Ok(pool)
}

/// Persistent cache of computed distance matrices, keyed by a hash of the
/// sorted location-id list. Writers upsert; concurrent writers of the same
/// key resolve last-writer-wins. Stale entries are ignored on read.
pub struct MatrixCache {
    pool: SqlitePool,
}

impl MatrixCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn cache_key(location_ids: &[String]) -> String {
        let mut sorted: Vec<&String> = location_ids.iter().collect();
        sorted.sort();
        let serialized = serde_json::to_string(&sorted).unwrap_or_default();
        hex_digest(serialized.as_bytes())
    }

    pub async fn get(&self, location_ids: &[String], expiry_days: i64) -> Option<DistanceMatrix> {
        let key = Self::cache_key(location_ids);
        let cutoff = chrono::Utc::now().timestamp() - expiry_days * 24 * 3600;

        let row: Option<(String, String, Option<String>)> = match sqlx::query_as(
            r#"
            SELECT matrix_data, location_ids, time_matrix_data
            FROM distance_matrix_cache
            WHERE cache_key = ? AND created_at >= ?
            "#,
        )
        .bind(&key)
        .bind(cutoff)
        .fetch_optional(&self.pool)
        .await
        {
            Ok(row) => row,
            Err(e) => {
                warn!("Error retrieving from matrix cache: {e}");
                return None;
            }
        };

        let (matrix_data, ids_data, time_data) = row?;
        let distances: Vec<Vec<f64>> = serde_json::from_str(&matrix_data).ok()?;
        let location_ids: Vec<String> = serde_json::from_str(&ids_data).ok()?;
        let times = match time_data {
            Some(raw) => Some(serde_json::from_str(&raw).ok()?),
            None => None,
        };

        Some(DistanceMatrix {
            distances,
            times,
            location_ids,
        })
    }

    pub async fn upsert(&self, matrix: &DistanceMatrix) -> Result<(), sqlx::Error> {
        let key = Self::cache_key(&matrix.location_ids);
        let matrix_data =
            serde_json::to_string(&matrix.distances).unwrap_or_else(|_| "[]".to_string());
        let ids_data =
            serde_json::to_string(&matrix.location_ids).unwrap_or_else(|_| "[]".to_string());
        let time_data = matrix
            .times
            .as_ref()
            .and_then(|t| serde_json::to_string(t).ok());

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO distance_matrix_cache
                (cache_key, matrix_data, location_ids, time_matrix_data, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&key)
        .bind(&matrix_data)
        .bind(&ids_data)
        .bind(&time_data)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Process-wide TTL cache of whole optimization results, keyed by the
/// request fingerprint. Only successful results are stored.
pub struct ResultCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, (OptimizationResult, Instant)>>,
}

impl ResultCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<OptimizationResult> {
        let mut entries = self.entries.lock().expect("result cache poisoned");
        match entries.get(key) {
            Some((result, stored_at)) if stored_at.elapsed() < self.ttl => Some(result.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: String, result: &OptimizationResult) {
        let mut entries = self.entries.lock().expect("result cache poisoned");
        entries.insert(key, (result.clone(), Instant::now()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_matrix() -> DistanceMatrix {
        DistanceMatrix {
            distances: vec![vec![0.0, 2.0], vec![2.0, 0.0]],
            times: Some(vec![vec![0.0, 3.0], vec![3.0, 0.0]]),
            location_ids: vec!["a".to_string(), "b".to_string()],
        }
    }

    #[test]
    fn cache_key_ignores_location_order() {
        let forward = vec!["a".to_string(), "b".to_string()];
        let reversed = vec!["b".to_string(), "a".to_string()];
        assert_eq!(MatrixCache::cache_key(&forward), MatrixCache::cache_key(&reversed));

        let other = vec!["a".to_string(), "c".to_string()];
        assert_ne!(MatrixCache::cache_key(&forward), MatrixCache::cache_key(&other));
    }

    #[tokio::test]
    async fn matrix_cache_round_trips() {
        let pool = db_connection("sqlite::memory:").await.unwrap();
        let cache = MatrixCache::new(pool);
        let matrix = sample_matrix();

        assert!(cache.get(&matrix.location_ids, 30).await.is_none());
        cache.upsert(&matrix).await.unwrap();
        let hit = cache.get(&matrix.location_ids, 30).await.unwrap();
        assert_eq!(hit, matrix);
    }

    #[tokio::test]
    async fn expired_entries_are_ignored() {
        let pool = db_connection("sqlite::memory:").await.unwrap();
        let cache = MatrixCache::new(pool);
        let matrix = sample_matrix();
        cache.upsert(&matrix).await.unwrap();

        // A negative expiry window puts the cutoff in the future, so the
        // just-written entry is already stale.
        assert!(cache.get(&matrix.location_ids, -1).await.is_none());
    }

    #[tokio::test]
    async fn upsert_overwrites_existing_entry() {
        let pool = db_connection("sqlite::memory:").await.unwrap();
        let cache = MatrixCache::new(pool);
        let mut matrix = sample_matrix();
        cache.upsert(&matrix).await.unwrap();

        matrix.distances[0][1] = 9.0;
        cache.upsert(&matrix).await.unwrap();
        let hit = cache.get(&matrix.location_ids, 30).await.unwrap();
        assert_eq!(hit.distances[0][1], 9.0);
    }

    #[test]
    fn result_cache_respects_ttl() {
        let cache = ResultCache::new(Duration::from_secs(3600));
        let result = OptimizationResult::success();
        cache.put("key".to_string(), &result);
        assert_eq!(cache.get("key"), Some(result.clone()));

        let expired = ResultCache::new(Duration::from_secs(0));
        expired.put("key".to_string(), &result);
        assert_eq!(expired.get("key"), None);
    }
}
