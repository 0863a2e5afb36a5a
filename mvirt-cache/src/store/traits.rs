//! CacheStore trait definition.

use async_trait::async_trait;
use serde_json::Value;

use crate::cache::{CacheData, CacheResult, Namespace};

use super::error::Result;

/// Namespaced key/value store holding the cache.
///
/// Writes are attributed to a `source`; a write replaces only that source's
/// contribution to each record. Reads merge all live sources. TTLs travel on
/// [`CacheData::ttl_seconds`].
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Get one record, or `None` if absent or expired.
    async fn get(&self, namespace: Namespace, id: &str) -> Result<Option<CacheData>>;

    /// Get several records. Absent ids are skipped; order follows `ids`.
    async fn get_all(&self, namespace: Namespace, ids: &[String]) -> Result<Vec<CacheData>>;

    /// Ids in `namespace` matching a glob pattern (`*`, `?`, `[..]`), sorted.
    async fn filter_identifiers(&self, namespace: Namespace, pattern: &str) -> Result<Vec<String>>;

    /// Write records on behalf of `source`.
    async fn put_cache_data(
        &self,
        namespace: Namespace,
        source: &str,
        records: &[CacheData],
    ) -> Result<()>;

    /// Remove records for every source.
    async fn evict_deleted_items(&self, namespace: Namespace, ids: &[String]) -> Result<()>;

    /// Replace `source`'s contribution to `record.id`, but only while that
    /// contribution is live and its top-level `attribute` equals `expected`.
    /// The check and the write are atomic. Returns whether it was written.
    async fn put_if_attribute(
        &self,
        namespace: Namespace,
        source: &str,
        record: &CacheData,
        attribute: &str,
        expected: &Value,
    ) -> Result<bool>;

    /// Remove `id` for every source, but only while `source`'s contribution
    /// is live and its top-level `attribute` equals `expected`. Atomic like
    /// [`Self::put_if_attribute`]. Returns whether anything was removed.
    async fn evict_if_attribute(
        &self,
        namespace: Namespace,
        source: &str,
        id: &str,
        attribute: &str,
        expected: &Value,
    ) -> Result<bool>;

    /// Drop `source`'s contribution to every record in `namespace` whose id
    /// is not in `keep`. Returns how many contributions were dropped.
    async fn retain_source(&self, namespace: Namespace, source: &str, keep: &[String])
    -> Result<u64>;

    /// Drop `source`'s contributions in `namespace` written before
    /// `written_before` (epoch millis). Returns how many were dropped.
    async fn expire_source(
        &self,
        namespace: Namespace,
        source: &str,
        written_before: i64,
    ) -> Result<u64>;

    /// Commit a built result.
    ///
    /// Resource namespaces are written before the `on-demand` namespace so
    /// that envelope bookkeeping never lands ahead of the data it describes.
    /// Nothing here is transactional across namespaces.
    async fn apply(&self, source: &str, result: &CacheResult) -> Result<()> {
        let resource_namespaces = Namespace::ALL
            .into_iter()
            .filter(|ns| *ns != Namespace::OnDemand);

        for namespace in resource_namespaces.chain([Namespace::OnDemand]) {
            let records = result.records(namespace);
            if !records.is_empty() {
                self.put_cache_data(namespace, source, records).await?;
            }
            let evictions = result.evictions_for(namespace);
            if !evictions.is_empty() {
                self.evict_deleted_items(namespace, evictions).await?;
            }
        }
        Ok(())
    }
}
