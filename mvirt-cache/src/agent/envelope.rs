//! On-demand envelopes: the mailbox between point refreshes and full scans.

use serde::{Deserialize, Serialize};

use crate::cache::{CacheData, CacheResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnvelopeAttributes {
    #[serde(default)]
    cache_time: i64,
    #[serde(default)]
    cache_results: String,
    #[serde(default)]
    processed_count: u32,
    #[serde(default)]
    processed_time: Option<i64>,
}

/// A point refresh parked in the `on-demand` namespace under the key of
/// the resource it refreshed.
///
/// Created with `processed_count == 0`. Only full scans change the
/// bookkeeping afterwards, and only full scans delete it.
#[derive(Debug, Clone, PartialEq)]
pub struct OnDemandEnvelope {
    pub id: String,
    /// Epoch millis at which the refresh was taken.
    pub cache_time: i64,
    /// The refresh's [`CacheResult`], serialized.
    pub cache_results: String,
    pub processed_count: u32,
    pub processed_time: Option<i64>,
    pub ttl_seconds: Option<i64>,
}

impl OnDemandEnvelope {
    pub fn new(
        id: impl Into<String>,
        cache_time: i64,
        result: &CacheResult,
        ttl_seconds: i64,
    ) -> serde_json::Result<Self> {
        Ok(Self {
            id: id.into(),
            cache_time,
            cache_results: serde_json::to_string(result)?,
            processed_count: 0,
            processed_time: None,
            ttl_seconds: Some(ttl_seconds),
        })
    }

    /// Reads the bookkeeping fields of a stored envelope. The payload is
    /// not parsed here; see [`Self::cache_results`].
    pub fn from_record(record: &CacheData) -> serde_json::Result<Self> {
        let attrs: EnvelopeAttributes = record.attributes_as()?;
        Ok(Self {
            id: record.id.clone(),
            cache_time: attrs.cache_time,
            cache_results: attrs.cache_results,
            processed_count: attrs.processed_count,
            processed_time: attrs.processed_time,
            ttl_seconds: record.ttl_seconds,
        })
    }

    pub fn into_record(self) -> serde_json::Result<CacheData> {
        let mut record = CacheData::new(self.id).with_ttl(self.ttl_seconds);
        record.set_attributes(&EnvelopeAttributes {
            cache_time: self.cache_time,
            cache_results: self.cache_results,
            processed_count: self.processed_count,
            processed_time: self.processed_time,
        })?;
        Ok(record)
    }

    pub fn cache_results(&self) -> serde_json::Result<CacheResult> {
        serde_json::from_str(&self.cache_results)
    }

    /// Safe to delete for a scan that started at `start_time`: observed by
    /// at least one earlier scan and taken before this one began.
    pub fn is_stale(&self, start_time: i64) -> bool {
        self.processed_count > 0 && self.cache_time < start_time
    }

    /// Taken after a scan that started at `start_time`, so its content is
    /// newer than anything that scan fetched.
    pub fn supersedes(&self, start_time: i64) -> bool {
        self.cache_time > start_time
    }

    pub fn mark_processed(&mut self, now: i64) {
        self.processed_count += 1;
        self.processed_time = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Namespace;
    use serde_json::json;

    fn envelope(cache_time: i64) -> OnDemandEnvelope {
        let mut result = CacheResult::default();
        result
            .cache_results
            .insert(Namespace::ServerGroups, vec![CacheData::new("sg")]);
        OnDemandEnvelope::new("sg", cache_time, &result, 600).unwrap()
    }

    #[test]
    fn test_record_roundtrip_keeps_bookkeeping() {
        let mut env = envelope(1_000);
        env.mark_processed(2_000);

        let record = env.clone().into_record().unwrap();
        assert_eq!(record.attribute("cacheTime"), Some(&json!(1_000)));
        assert_eq!(record.attribute("processedCount"), Some(&json!(1)));
        assert_eq!(record.ttl_seconds, Some(600));

        let parsed = OnDemandEnvelope::from_record(&record).unwrap();
        assert_eq!(parsed, env);
        assert!(parsed.cache_results().unwrap().record(Namespace::ServerGroups, "sg").is_some());
    }

    #[test]
    fn test_unprocessed_is_never_stale() {
        let env = envelope(1_000);
        assert!(!env.is_stale(i64::MAX));
    }

    #[test]
    fn test_staleness_needs_earlier_cache_time() {
        let mut env = envelope(1_000);
        env.mark_processed(1_500);
        assert!(env.is_stale(1_001));
        assert!(!env.is_stale(1_000));
        assert!(env.supersedes(999));
        assert!(!env.supersedes(1_000));
    }

    #[test]
    fn test_malformed_payload() {
        let mut record = CacheData::new("sg");
        record.attributes.insert("cacheTime".into(), json!(5));
        record.attributes.insert("cacheResults".into(), json!("{not json"));

        let env = OnDemandEnvelope::from_record(&record).unwrap();
        assert_eq!(env.processed_count, 0);
        assert!(env.cache_results().is_err());
    }
}
