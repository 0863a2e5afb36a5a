//! Full scans.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use super::{CachingAgent, OnDemandEnvelope};
use crate::cache::{CacheData, CacheResult, CacheResultBuilder, Namespace, OnDemandBuckets};
use crate::error::Result;
use crate::now_millis;
use crate::resource::ResourceKind;

/// What a committed scan did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSummary {
    pub resources: usize,
    pub kept: usize,
    pub evicted: usize,
    /// Envelopes whose content replaced the scan's own view.
    pub spliced: usize,
    pub on_demand_kept: usize,
    pub on_demand_evicted: usize,
}

/// A built scan, not yet committed.
pub(crate) struct Scan {
    pub start_time: i64,
    pub resources: usize,
    pub spliced: usize,
    /// Records of resources refreshed on demand but missing from the listing.
    pub protected: BTreeMap<Namespace, BTreeSet<String>>,
    pub result: CacheResult,
}

/// Envelopes read in step 3, split by fate, plus the payloads of those newer
/// than the scan.
struct OnDemandState {
    buckets: OnDemandBuckets,
    fresh: BTreeMap<String, CacheResult>,
}

impl<R: ResourceKind> CachingAgent<R> {
    /// Build the result of a full scan without committing it.
    pub async fn load_data(&self) -> Result<CacheResult> {
        Ok(self.scan().await?.result)
    }

    pub(crate) async fn scan(&self) -> Result<Scan> {
        let start_time = now_millis();

        // A failed listing aborts before anything is read or staged.
        let resources = self.api.list_all(&self.scope).await?;
        let discovered: BTreeSet<String> = resources
            .iter()
            .map(|r| self.resource_key(r.name()))
            .collect();

        let OnDemandState { buckets, fresh } = self.read_on_demand(start_time).await?;

        let ctx = self.build_context();
        let mut builder = CacheResultBuilder::new();
        let mut spliced = 0;
        for resource in &resources {
            let key = self.resource_key(resource.name());
            match fresh.get(&key) {
                Some(result) => {
                    debug!(agent = %self.agent_type, key = %key, "On-demand result supersedes scan");
                    builder.splice(result);
                    spliced += 1;
                }
                None => resource.build_cache(&ctx, &mut builder)?,
            }
        }

        // Resources refreshed on demand after the listing was taken may be
        // missing from it; their records are not evidence of deletion.
        let mut protected: BTreeMap<Namespace, BTreeSet<String>> = BTreeMap::new();
        for (key, result) in &fresh {
            if discovered.contains(key) {
                continue;
            }
            for (namespace, records) in &result.cache_results {
                protected
                    .entry(*namespace)
                    .or_default()
                    .extend(records.iter().map(|r| r.id.clone()));
            }
        }

        for namespace in R::AUTHORITATIVE {
            let pattern = self.keys.regional_pattern(
                *namespace,
                &self.scope.account,
                &self.scope.region,
            );
            let cached = self.store.filter_identifiers(*namespace, &pattern).await?;
            let spared = protected.get(namespace);
            let mut view = builder.namespace(*namespace);
            let gone: Vec<String> = cached
                .into_iter()
                .filter(|id| !view.keeps(id) && !spared.is_some_and(|ids| ids.contains(id)))
                .collect();
            for id in gone {
                view.evict(id);
            }
        }

        builder.on_demand = buckets;
        let now = now_millis();
        for (id, record) in builder.on_demand.to_keep.iter_mut() {
            match OnDemandEnvelope::from_record(record) {
                Ok(mut envelope) => {
                    envelope.mark_processed(now);
                    *record = envelope.into_record()?;
                }
                Err(e) => {
                    warn!(agent = %self.agent_type, key = %id, error = %e, "Unreadable on-demand envelope");
                }
            }
        }

        Ok(Scan {
            start_time,
            resources: resources.len(),
            spliced,
            protected,
            result: builder.build(),
        })
    }

    /// Reads every envelope of this agent and classifies it.
    async fn read_on_demand(&self, start_time: i64) -> Result<OnDemandState> {
        let ids = self
            .store
            .filter_identifiers(Namespace::OnDemand, &self.resource_pattern())
            .await?;
        let records = self.store.get_all(Namespace::OnDemand, &ids).await?;

        let mut state = OnDemandState {
            buckets: OnDemandBuckets::default(),
            fresh: BTreeMap::new(),
        };
        for record in records {
            let envelope = match OnDemandEnvelope::from_record(&record) {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!(agent = %self.agent_type, key = %record.id, error = %e, "Unreadable on-demand envelope");
                    state.buckets.to_keep.insert(record.id.clone(), record);
                    continue;
                }
            };

            if envelope.is_stale(start_time) {
                state.buckets.to_evict.insert(record.id);
                continue;
            }

            if envelope.supersedes(start_time) {
                match envelope.cache_results() {
                    Ok(result) => {
                        state.fresh.insert(record.id.clone(), result);
                    }
                    Err(e) => {
                        warn!(agent = %self.agent_type, key = %record.id, error = %e, "Malformed on-demand payload, skipping");
                    }
                }
            }
            state.buckets.to_keep.insert(record.id.clone(), record);
        }
        Ok(state)
    }

    /// Makes the scan the only view of what it observed.
    ///
    /// This agent's records that the scan no longer produced are dropped, as
    /// are readable copies the on-demand path wrote before the scan started:
    /// the listing is at least as new as they are. Copies written later stay
    /// until the next scan.
    async fn replace_contributions(&self, scan: &Scan) -> Result<()> {
        let on_demand_source = self.on_demand_source();
        let namespaces = Namespace::ALL
            .into_iter()
            .filter(|ns| *ns != Namespace::OnDemand);

        for namespace in namespaces {
            let mut keep: Vec<String> = scan
                .result
                .records(namespace)
                .iter()
                .map(|r| r.id.clone())
                .collect();
            keep.extend(scan.protected.get(&namespace).into_iter().flatten().cloned());

            let dropped = self
                .store
                .retain_source(namespace, &self.agent_type, &keep)
                .await?;
            let expired = self
                .store
                .expire_source(namespace, &on_demand_source, scan.start_time)
                .await?;
            if dropped + expired > 0 {
                debug!(
                    agent = %self.agent_type,
                    namespace = %namespace,
                    dropped,
                    expired,
                    "Replaced earlier contributions"
                );
            }
        }
        Ok(())
    }

    /// Writes back processed envelopes and deletes stale ones.
    ///
    /// Both are conditional on the stored envelope still carrying the
    /// `cacheTime` the scan saw, checked atomically by the store. A refresh
    /// that lands at any point during the scan therefore keeps
    /// `processedCount == 0`. Returns how many were written back and the ids
    /// deleted.
    async fn commit_on_demand(
        &self,
        start_time: i64,
        written: &[CacheData],
        evictions: &[String],
    ) -> Result<(usize, Vec<String>)> {
        let mut kept = 0;
        for record in written {
            // Nothing to compare against; the stored copy stays as it is.
            let Some(cache_time) = record.attribute("cacheTime") else {
                continue;
            };
            let stored = self
                .store
                .put_if_attribute(
                    Namespace::OnDemand,
                    &self.agent_type,
                    record,
                    "cacheTime",
                    cache_time,
                )
                .await?;
            if stored {
                kept += 1;
            } else {
                debug!(agent = %self.agent_type, key = %record.id, "Envelope changed during scan, skipping write-back");
            }
        }

        let mut evicted = Vec::with_capacity(evictions.len());
        for id in evictions {
            let Some(current) = self.store.get(Namespace::OnDemand, id).await? else {
                continue;
            };
            let still_stale = OnDemandEnvelope::from_record(&current)
                .is_ok_and(|envelope| envelope.is_stale(start_time));
            let Some(cache_time) = current.attribute("cacheTime").filter(|_| still_stale) else {
                debug!(agent = %self.agent_type, key = %id, "Envelope replaced during scan, not evicting");
                continue;
            };
            let removed = self
                .store
                .evict_if_attribute(
                    Namespace::OnDemand,
                    &self.agent_type,
                    id,
                    "cacheTime",
                    cache_time,
                )
                .await?;
            if removed {
                evicted.push(id.clone());
            }
        }
        Ok((kept, evicted))
    }

    /// Commits a built scan.
    ///
    /// Resource namespaces go first, then earlier contributions are replaced,
    /// then the on-demand bookkeeping lands.
    pub(crate) async fn commit(&self, mut scan: Scan) -> Result<ScanSummary> {
        let written = scan
            .result
            .cache_results
            .remove(&Namespace::OnDemand)
            .unwrap_or_default();
        let evictions = scan
            .result
            .evictions
            .remove(&Namespace::OnDemand)
            .unwrap_or_default();

        self.store.apply(&self.agent_type, &scan.result).await?;
        self.replace_contributions(&scan).await?;
        let (on_demand_kept, on_demand_evicted) = self
            .commit_on_demand(scan.start_time, &written, &evictions)
            .await?;

        let summary = ScanSummary {
            resources: scan.resources,
            kept: count(&scan.result.cache_results),
            evicted: count(&scan.result.evictions),
            spliced: scan.spliced,
            on_demand_kept,
            on_demand_evicted: on_demand_evicted.len(),
        };

        info!(
            agent = %self.agent_type,
            resources = summary.resources,
            kept = summary.kept,
            evicted = summary.evicted,
            spliced = summary.spliced,
            "Scan committed"
        );
        self.audit.scan_committed(&self.agent_type, &summary);
        for id in &on_demand_evicted {
            self.audit.on_demand_processed(&self.agent_type, id);
        }
        Ok(summary)
    }

    pub(crate) async fn scan_and_commit(&self) -> Result<ScanSummary> {
        let scan = match self.scan().await {
            Ok(scan) => scan,
            Err(e) => {
                self.audit.scan_failed(&self.agent_type, &e.to_string());
                return Err(e);
            }
        };
        self.commit(scan).await
    }
}

/// Entries across namespaces.
fn count<T>(map: &BTreeMap<Namespace, Vec<T>>) -> usize {
    map.values().map(Vec::len).sum()
}
