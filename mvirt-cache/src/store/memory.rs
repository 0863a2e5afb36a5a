//! In-process store, used for development mode and tests.

use async_trait::async_trait;
use globset::Glob;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::debug;

use crate::cache::{CacheData, Namespace};
use crate::now_millis;

use super::error::{Result, StoreError};
use super::traits::CacheStore;
use super::{StoredRecord, merge_sources};

/// id -> source -> contribution
type Records = BTreeMap<String, BTreeMap<String, StoredRecord>>;

/// Store keeping everything in memory behind a `RwLock`.
#[derive(Default)]
pub struct MemoryStore {
    namespaces: RwLock<HashMap<Namespace, Records>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop contributions whose TTL has passed. Returns how many were removed.
    pub async fn purge_expired(&self) -> u64 {
        let now = now_millis();
        let mut namespaces = self.namespaces.write().await;
        let mut removed = 0;
        for records in namespaces.values_mut() {
            for sources in records.values_mut() {
                sources.retain(|_, record| {
                    let live = record.is_live(now);
                    if !live {
                        removed += 1;
                    }
                    live
                });
            }
            records.retain(|_, sources| !sources.is_empty());
        }
        if removed > 0 {
            debug!("Purged {} expired cache contributions", removed);
        }
        removed
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, namespace: Namespace, id: &str) -> Result<Option<CacheData>> {
        let namespaces = self.namespaces.read().await;
        Ok(namespaces
            .get(&namespace)
            .and_then(|records| records.get(id))
            .and_then(|sources| merge_sources(id, now_millis(), sources.values())))
    }

    async fn get_all(&self, namespace: Namespace, ids: &[String]) -> Result<Vec<CacheData>> {
        let now = now_millis();
        let namespaces = self.namespaces.read().await;
        let Some(records) = namespaces.get(&namespace) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .filter_map(|id| {
                records
                    .get(id)
                    .and_then(|sources| merge_sources(id, now, sources.values()))
            })
            .collect())
    }

    async fn filter_identifiers(&self, namespace: Namespace, pattern: &str) -> Result<Vec<String>> {
        let matcher = Glob::new(pattern)
            .map_err(|e| StoreError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })?
            .compile_matcher();

        let now = now_millis();
        let namespaces = self.namespaces.read().await;
        Ok(namespaces
            .get(&namespace)
            .map(|records| {
                records
                    .iter()
                    .filter(|(id, sources)| {
                        matcher.is_match(id.as_str()) && sources.values().any(|s| s.is_live(now))
                    })
                    .map(|(id, _)| id.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn put_cache_data(
        &self,
        namespace: Namespace,
        source: &str,
        records: &[CacheData],
    ) -> Result<()> {
        let now = now_millis();
        let mut namespaces = self.namespaces.write().await;
        let stored = namespaces.entry(namespace).or_default();
        for record in records {
            stored
                .entry(record.id.clone())
                .or_default()
                .insert(source.to_string(), StoredRecord::from_data(record, now));
        }
        Ok(())
    }

    async fn evict_deleted_items(&self, namespace: Namespace, ids: &[String]) -> Result<()> {
        let mut namespaces = self.namespaces.write().await;
        if let Some(records) = namespaces.get_mut(&namespace) {
            for id in ids {
                records.remove(id);
            }
        }
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
        let mut namespaces = self.namespaces.write().await;
        let current = namespaces
            .get_mut(&namespace)
            .and_then(|records| records.get_mut(&record.id))
            .and_then(|sources| sources.get_mut(source));
        match current {
            Some(current) if current.carries(attribute, expected, now) => {
                *current = StoredRecord::from_data(record, now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn evict_if_attribute(
        &self,
        namespace: Namespace,
        source: &str,
        id: &str,
        attribute: &str,
        expected: &Value,
    ) -> Result<bool> {
        let now = now_millis();
        let mut namespaces = self.namespaces.write().await;
        let Some(records) = namespaces.get_mut(&namespace) else {
            return Ok(false);
        };
        let matches = records
            .get(id)
            .and_then(|sources| sources.get(source))
            .is_some_and(|current| current.carries(attribute, expected, now));
        if matches {
            records.remove(id);
        }
        Ok(matches)
    }

    async fn retain_source(&self, namespace: Namespace, source: &str, keep: &[String]) -> Result<u64> {
        let keep: HashSet<&str> = keep.iter().map(String::as_str).collect();
        let mut namespaces = self.namespaces.write().await;
        let Some(records) = namespaces.get_mut(&namespace) else {
            return Ok(0);
        };
        let mut dropped = 0;
        for (id, sources) in records.iter_mut() {
            if !keep.contains(id.as_str()) && sources.remove(source).is_some() {
                dropped += 1;
            }
        }
        records.retain(|_, sources| !sources.is_empty());
        Ok(dropped)
    }

    async fn expire_source(
        &self,
        namespace: Namespace,
        source: &str,
        written_before: i64,
    ) -> Result<u64> {
        let mut namespaces = self.namespaces.write().await;
        let Some(records) = namespaces.get_mut(&namespace) else {
            return Ok(0);
        };
        let mut dropped = 0;
        for sources in records.values_mut() {
            if sources
                .get(source)
                .is_some_and(|record| record.written_at < written_before)
            {
                sources.remove(source);
                dropped += 1;
            }
        }
        records.retain(|_, sources| !sources.is_empty());
        Ok(dropped)
    }
}
