//! Persistent cache store.
//!
//! Records are written per source (the agent type). Reads merge every live
//! source, so agents contributing to a shared record (several regions adding
//! server groups to one cluster) never clobber each other.

mod error;
mod memory;
mod sqlite;
mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::CacheStore;

use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

use crate::cache::{CacheData, Namespace};

/// One source's contribution to a record.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct StoredRecord {
    pub attributes: Map<String, Value>,
    pub relationships: BTreeMap<Namespace, BTreeSet<String>>,
    /// Epoch millis after which the contribution is invisible.
    pub expires_at: Option<i64>,
    /// Epoch millis of the write.
    pub written_at: i64,
}

impl StoredRecord {
    pub fn from_data(data: &CacheData, now: i64) -> Self {
        Self {
            attributes: data.attributes.clone(),
            relationships: data.relationships.clone(),
            expires_at: data
                .ttl_seconds
                .map(|ttl| now.saturating_add(ttl.saturating_mul(1000))),
            written_at: now,
        }
    }

    pub fn is_live(&self, now: i64) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }

    /// Live and carrying `expected` under the top-level `attribute`.
    pub fn carries(&self, attribute: &str, expected: &Value, now: i64) -> bool {
        self.is_live(now) && self.attributes.get(attribute) == Some(expected)
    }
}

/// Merges the live contributions of all sources into one record.
///
/// Sources are applied in iteration order, so later sources win attribute
/// conflicts. The TTL reported is the longest remaining one, or none if any
/// source is permanent.
pub(crate) fn merge_sources<'a>(
    id: &str,
    now: i64,
    sources: impl IntoIterator<Item = &'a StoredRecord>,
) -> Option<CacheData> {
    let mut data = CacheData::new(id);
    let mut found = false;
    let mut permanent = false;
    let mut latest_expiry = i64::MIN;

    for source in sources.into_iter().filter(|s| s.is_live(now)) {
        found = true;
        data.attributes
            .extend(source.attributes.iter().map(|(k, v)| (k.clone(), v.clone())));
        for (namespace, ids) in &source.relationships {
            data.relationships
                .entry(*namespace)
                .or_default()
                .extend(ids.iter().cloned());
        }
        match source.expires_at {
            Some(at) => latest_expiry = latest_expiry.max(at),
            None => permanent = true,
        }
    }

    if !found {
        return None;
    }
    if !permanent {
        data.ttl_seconds = Some(latest_expiry.saturating_sub(now).saturating_add(999) / 1000);
    }
    Some(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stored(attr: &str, value: i64, expires_at: Option<i64>) -> StoredRecord {
        let mut record = StoredRecord {
            expires_at,
            ..Default::default()
        };
        record.attributes.insert(attr.into(), json!(value));
        record
    }

    #[test]
    fn test_merge_skips_expired_sources() {
        let live = stored("a", 1, Some(10_000));
        let dead = stored("b", 2, Some(500));
        let merged = merge_sources("x", 1_000, [&live, &dead]).unwrap();
        assert!(merged.attribute("a").is_some());
        assert!(merged.attribute("b").is_none());
        assert_eq!(merged.ttl_seconds, Some(9));
    }

    #[test]
    fn test_merge_later_source_wins() {
        let first = stored("a", 1, None);
        let second = stored("a", 2, Some(5_000));
        let merged = merge_sources("x", 0, [&first, &second]).unwrap();
        assert_eq!(merged.attribute("a"), Some(&json!(2)));
        assert_eq!(merged.ttl_seconds, None);
    }

    #[test]
    fn test_huge_ttl_saturates() {
        let data = CacheData::new("x").with_ttl(Some(i64::MAX));
        let record = StoredRecord::from_data(&data, 1_000);
        assert_eq!(record.expires_at, Some(i64::MAX));
        assert!(record.is_live(i64::MAX - 1));

        let merged = merge_sources("x", 1_000, [&record]).unwrap();
        assert!(merged.ttl_seconds.is_some_and(|ttl| ttl > 0));
    }

    #[test]
    fn test_carries_requires_live_match() {
        let record = stored("cacheTime", 7, Some(5_000));
        assert!(record.carries("cacheTime", &json!(7), 1_000));
        assert!(!record.carries("cacheTime", &json!(8), 1_000));
        assert!(!record.carries("cacheTime", &json!(7), 6_000));
    }

    #[test]
    fn test_merge_all_expired_is_none() {
        let dead = stored("a", 1, Some(10));
        assert!(merge_sources("x", 100, [&dead]).is_none());
    }
}
