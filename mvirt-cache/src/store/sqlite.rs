//! SQLite-backed store.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use std::collections::HashSet;
use std::path::Path;

use crate::cache::{CacheData, Namespace};
use crate::now_millis;

use super::error::Result;
use super::traits::CacheStore;
use super::{StoredRecord, merge_sources};

/// SQLite-backed cache store
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn new(path: impl AsRef<Path>) -> Result<Self> {
        let db_url = format!("sqlite:{}?mode=rwc", path.as_ref().display());

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Private in-memory database. A single connection keeps every query on
    /// the same database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cache_records (
                namespace TEXT NOT NULL,
                id TEXT NOT NULL,
                source TEXT NOT NULL,
                attributes TEXT NOT NULL,
                relationships TEXT NOT NULL,
                expires_at INTEGER,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (namespace, id, source)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_cache_records_expiry
            ON cache_records (expires_at)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Delete contributions whose TTL has passed.
    pub async fn purge_expired(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM cache_records
            WHERE expires_at IS NOT NULL AND expires_at <= ?
            "#,
        )
        .bind(now_millis())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    fn row_to_stored(row: &SqliteRow) -> Result<StoredRecord> {
        let attributes: String = row.try_get("attributes")?;
        let relationships: String = row.try_get("relationships")?;
        Ok(StoredRecord {
            attributes: serde_json::from_str(&attributes)?,
            relationships: serde_json::from_str(&relationships)?,
            expires_at: row.try_get("expires_at")?,
            written_at: row.try_get("updated_at")?,
        })
    }

    /// JSON path of a top-level attribute.
    fn attribute_path(attribute: &str) -> String {
        format!("$.{}", attribute)
    }

    async fn load(&self, namespace: Namespace, id: &str, now: i64) -> Result<Option<CacheData>> {
        let rows = sqlx::query(
            r#"
            SELECT attributes, relationships, expires_at, updated_at
            FROM cache_records
            WHERE namespace = ? AND id = ? AND (expires_at IS NULL OR expires_at > ?)
            ORDER BY source
            "#,
        )
        .bind(namespace.as_str())
        .bind(id)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        let sources = rows
            .iter()
            .map(Self::row_to_stored)
            .collect::<Result<Vec<_>>>()?;
        Ok(merge_sources(id, now, &sources))
    }
}

#[async_trait]
impl CacheStore for SqliteStore {
    async fn get(&self, namespace: Namespace, id: &str) -> Result<Option<CacheData>> {
        self.load(namespace, id, now_millis()).await
    }

    async fn get_all(&self, namespace: Namespace, ids: &[String]) -> Result<Vec<CacheData>> {
        let now = now_millis();
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.load(namespace, id, now).await? {
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn filter_identifiers(&self, namespace: Namespace, pattern: &str) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT id FROM cache_records
            WHERE namespace = ? AND id GLOB ? AND (expires_at IS NULL OR expires_at > ?)
            ORDER BY id
            "#,
        )
        .bind(namespace.as_str())
        .bind(pattern)
        .bind(now_millis())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| r.try_get("id"))
            .collect::<std::result::Result<Vec<String>, _>>()?)
    }

    async fn put_cache_data(
        &self,
        namespace: Namespace,
        source: &str,
        records: &[CacheData],
    ) -> Result<()> {
        let now = now_millis();
        let mut tx = self.pool.begin().await?;

        for record in records {
            let stored = StoredRecord::from_data(record, now);
            sqlx::query(
                r#"
                INSERT INTO cache_records (namespace, id, source, attributes, relationships,
                                           expires_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT (namespace, id, source) DO UPDATE SET
                    attributes = excluded.attributes,
                    relationships = excluded.relationships,
                    expires_at = excluded.expires_at,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(namespace.as_str())
            .bind(&record.id)
            .bind(source)
            .bind(serde_json::to_string(&stored.attributes)?)
            .bind(serde_json::to_string(&stored.relationships)?)
            .bind(stored.expires_at)
            .bind(stored.written_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn evict_deleted_items(&self, namespace: Namespace, ids: &[String]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for id in ids {
            sqlx::query("DELETE FROM cache_records WHERE namespace = ? AND id = ?")
                .bind(namespace.as_str())
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn put_if_attribute(
        &self,
        namespace: Namespace,
        source: &str,
        record: &CacheData,
        attribute: &str,
        expected: &Value,
    ) -> Result<bool> {
        let now = now_millis();
        let stored = StoredRecord::from_data(record, now);
        let result = sqlx::query(
            r#"
            UPDATE cache_records
            SET attributes = ?, relationships = ?, expires_at = ?, updated_at = ?
            WHERE namespace = ? AND id = ? AND source = ?
              AND (expires_at IS NULL OR expires_at > ?)
              AND json_extract(attributes, ?) = json_extract(?, '$')
            "#,
        )
        .bind(serde_json::to_string(&stored.attributes)?)
        .bind(serde_json::to_string(&stored.relationships)?)
        .bind(stored.expires_at)
        .bind(stored.written_at)
        .bind(namespace.as_str())
        .bind(&record.id)
        .bind(source)
        .bind(now)
        .bind(Self::attribute_path(attribute))
        .bind(serde_json::to_string(expected)?)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn evict_if_attribute(
        &self,
        namespace: Namespace,
        source: &str,
        id: &str,
        attribute: &str,
        expected: &Value,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM cache_records
            WHERE namespace = ? AND id = ? AND EXISTS (
                SELECT 1 FROM cache_records
                WHERE namespace = ? AND id = ? AND source = ?
                  AND (expires_at IS NULL OR expires_at > ?)
                  AND json_extract(attributes, ?) = json_extract(?, '$')
            )
            "#,
        )
        .bind(namespace.as_str())
        .bind(id)
        .bind(namespace.as_str())
        .bind(id)
        .bind(source)
        .bind(now_millis())
        .bind(Self::attribute_path(attribute))
        .bind(serde_json::to_string(expected)?)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn retain_source(&self, namespace: Namespace, source: &str, keep: &[String]) -> Result<u64> {
        let keep: HashSet<&str> = keep.iter().map(String::as_str).collect();
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query("SELECT id FROM cache_records WHERE namespace = ? AND source = ?")
            .bind(namespace.as_str())
            .bind(source)
            .fetch_all(&mut *tx)
            .await?;

        let mut dropped = 0;
        for row in rows {
            let id: String = row.try_get("id")?;
            if keep.contains(id.as_str()) {
                continue;
            }
            dropped += sqlx::query(
                "DELETE FROM cache_records WHERE namespace = ? AND id = ? AND source = ?",
            )
            .bind(namespace.as_str())
            .bind(&id)
            .bind(source)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }

        tx.commit().await?;
        Ok(dropped)
    }

    async fn expire_source(
        &self,
        namespace: Namespace,
        source: &str,
        written_before: i64,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM cache_records
            WHERE namespace = ? AND source = ? AND updated_at < ?
            "#,
        )
        .bind(namespace.as_str())
        .bind(source)
        .bind(written_before)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    async fn setup_store() -> (SqliteStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::new(dir.path().join("cache.db")).await.unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn test_record_crud() {
        let (store, _dir) = setup_store().await;

        let mut data = CacheData::new("mvirt:server-groups:prod:eu-1:web-v001");
        data.attributes.insert("disabled".into(), json!(false));
        data.add_relationship(Namespace::Clusters, "mvirt:clusters:prod:web:web");

        // Put
        store
            .put_cache_data(Namespace::ServerGroups, "agent", std::slice::from_ref(&data))
            .await
            .unwrap();

        // Get
        let fetched = store
            .get(Namespace::ServerGroups, &data.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched, data);

        // Overwrite by the same source
        let mut updated = data.clone();
        updated.attributes.insert("disabled".into(), json!(true));
        updated.relationships.clear();
        store
            .put_cache_data(Namespace::ServerGroups, "agent", &[updated])
            .await
            .unwrap();
        let fetched = store
            .get(Namespace::ServerGroups, &data.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.attribute("disabled"), Some(&json!(true)));
        assert!(fetched.relationships.is_empty());

        // Evict
        store
            .evict_deleted_items(Namespace::ServerGroups, &[data.id.clone()])
            .await
            .unwrap();
        assert!(store.get(Namespace::ServerGroups, &data.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_merges_sources() {
        let store = SqliteStore::in_memory().await.unwrap();

        let mut a = CacheData::new("cluster");
        a.add_relationship(Namespace::ServerGroups, "sg-east");
        let mut b = CacheData::new("cluster");
        b.add_relationship(Namespace::ServerGroups, "sg-west");

        store
            .put_cache_data(Namespace::Clusters, "east", &[a])
            .await
            .unwrap();
        store
            .put_cache_data(Namespace::Clusters, "west", &[b])
            .await
            .unwrap();

        let cluster = store.get(Namespace::Clusters, "cluster").await.unwrap().unwrap();
        assert_eq!(
            cluster.related(Namespace::ServerGroups).collect::<Vec<_>>(),
            ["sg-east", "sg-west"]
        );
    }

    #[tokio::test]
    async fn test_filter_identifiers_glob() {
        let store = SqliteStore::in_memory().await.unwrap();
        store
            .put_cache_data(
                Namespace::LoadBalancers,
                "agent",
                &[
                    CacheData::new("mvirt:load-balancers:prod:eu-1:web"),
                    CacheData::new("mvirt:load-balancers:prod:eu-2:web"),
                ],
            )
            .await
            .unwrap();

        let ids = store
            .filter_identifiers(Namespace::LoadBalancers, "mvirt:load-balancers:prod:eu-1:*")
            .await
            .unwrap();
        assert_eq!(ids, ["mvirt:load-balancers:prod:eu-1:web"]);
    }

    #[tokio::test]
    async fn test_ttl_and_purge() {
        let store = SqliteStore::in_memory().await.unwrap();
        store
            .put_cache_data(
                Namespace::OnDemand,
                "agent",
                &[
                    CacheData::new("expired").with_ttl(Some(-5)),
                    CacheData::new("live").with_ttl(Some(600)),
                ],
            )
            .await
            .unwrap();

        assert!(store.get(Namespace::OnDemand, "expired").await.unwrap().is_none());
        let ids = vec!["expired".to_string(), "live".to_string()];
        let records = store.get_all(Namespace::OnDemand, &ids).await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].ttl_seconds.is_some());

        assert_eq!(store.purge_expired().await.unwrap(), 1);
    }

    fn envelope(cache_time: i64, processed_count: u32) -> CacheData {
        let mut data = CacheData::new("env").with_ttl(Some(600));
        data.attributes.insert("cacheTime".into(), json!(cache_time));
        data.attributes
            .insert("processedCount".into(), json!(processed_count));
        data
    }

    #[tokio::test]
    async fn test_conditional_write_and_evict() {
        let store = SqliteStore::in_memory().await.unwrap();
        store
            .put_cache_data(Namespace::OnDemand, "agent", &[envelope(1_700_000_000_001, 0)])
            .await
            .unwrap();

        // Replaced by a newer envelope: the old bookkeeping must not land
        store
            .put_cache_data(Namespace::OnDemand, "agent", &[envelope(1_700_000_000_002, 0)])
            .await
            .unwrap();
        let written = store
            .put_if_attribute(
                Namespace::OnDemand,
                "agent",
                &envelope(1_700_000_000_001, 1),
                "cacheTime",
                &json!(1_700_000_000_001_i64),
            )
            .await
            .unwrap();
        assert!(!written);
        let current = store.get(Namespace::OnDemand, "env").await.unwrap().unwrap();
        assert_eq!(current.attribute("processedCount"), Some(&json!(0)));

        let written = store
            .put_if_attribute(
                Namespace::OnDemand,
                "agent",
                &envelope(1_700_000_000_002, 1),
                "cacheTime",
                &json!(1_700_000_000_002_i64),
            )
            .await
            .unwrap();
        assert!(written);
        let current = store.get(Namespace::OnDemand, "env").await.unwrap().unwrap();
        assert_eq!(current.attribute("processedCount"), Some(&json!(1)));

        assert!(
            !store
                .evict_if_attribute(Namespace::OnDemand, "agent", "env", "cacheTime", &json!(1))
                .await
                .unwrap()
        );
        assert!(
            store
                .evict_if_attribute(
                    Namespace::OnDemand,
                    "agent",
                    "env",
                    "cacheTime",
                    &json!(1_700_000_000_002_i64),
                )
                .await
                .unwrap()
        );
        assert!(store.get(Namespace::OnDemand, "env").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_retain_and_expire_source() {
        let store = SqliteStore::in_memory().await.unwrap();
        store
            .put_cache_data(
                Namespace::Clusters,
                "agent/on-demand",
                &[CacheData::new("c1"), CacheData::new("c2")],
            )
            .await
            .unwrap();
        store
            .put_cache_data(Namespace::Clusters, "agent", &[CacheData::new("c1"), CacheData::new("c3")])
            .await
            .unwrap();

        let dropped = store
            .retain_source(Namespace::Clusters, "agent", &["c1".to_string()])
            .await
            .unwrap();
        assert_eq!(dropped, 1);
        assert!(store.get(Namespace::Clusters, "c3").await.unwrap().is_none());

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let dropped = store
            .expire_source(Namespace::Clusters, "agent/on-demand", now_millis())
            .await
            .unwrap();
        assert_eq!(dropped, 2);
        assert!(store.get(Namespace::Clusters, "c1").await.unwrap().is_some());
        assert!(store.get(Namespace::Clusters, "c2").await.unwrap().is_none());
    }
}
