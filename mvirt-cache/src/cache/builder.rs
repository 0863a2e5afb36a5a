use std::collections::{BTreeMap, BTreeSet};

use super::data::{CacheData, CacheResult, Namespace};
use super::graph::EntityGraph;
use super::relationships;

/// Envelopes read at the start of a full scan, split by fate.
///
/// Filled once by the reconciler, consulted during merge, then emitted
/// as the `on-demand` namespace of the built result.
#[derive(Debug, Clone, Default)]
pub struct OnDemandBuckets {
    pub to_keep: BTreeMap<String, CacheData>,
    pub to_evict: BTreeSet<String>,
}

/// Stages a multi-namespace delta before anything is written.
///
/// A pass touches many namespaces; staging keeps partial results from ever
/// becoming visible in the store.
#[derive(Debug, Default)]
pub struct CacheResultBuilder {
    graph: EntityGraph,
    evictions: BTreeMap<Namespace, BTreeSet<String>>,
    pub on_demand: OnDemandBuckets,
}

/// A view over one namespace of a [`CacheResultBuilder`].
pub struct NamespaceCache<'a> {
    records: &'a mut BTreeMap<String, CacheData>,
    to_evict: &'a mut BTreeSet<String>,
}

impl<'a> NamespaceCache<'a> {
    /// The staged record for `id`, created if needed.
    pub fn keep(self, id: &str) -> &'a mut CacheData {
        self.records
            .entry(id.to_string())
            .or_insert_with(|| CacheData::new(id))
    }

    pub fn evict(&mut self, id: impl Into<String>) {
        self.to_evict.insert(id.into());
    }

    pub fn keeps(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn to_evict(&self) -> &BTreeSet<String> {
        self.to_evict
    }
}

impl CacheResultBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn namespace(&mut self, namespace: Namespace) -> NamespaceCache<'_> {
        NamespaceCache {
            records: self.graph.get(namespace),
            to_evict: self.evictions.entry(namespace).or_default(),
        }
    }

    /// Adds an edge, mirrored when the relationship table says so.
    pub fn link(&mut self, from: (Namespace, &str), to: (Namespace, &str)) {
        relationships::link(&mut self.graph, from, to);
    }

    /// Splices a previously built result into this one.
    ///
    /// Records merge into whatever is already staged; the `on-demand`
    /// namespace of `result` is ignored.
    pub fn splice(&mut self, result: &CacheResult) {
        for (namespace, records) in &result.cache_results {
            if *namespace == Namespace::OnDemand {
                continue;
            }
            for record in records {
                self.graph.splice(*namespace, record.clone());
            }
        }
    }

    pub fn graph(&self) -> &EntityGraph {
        &self.graph
    }

    /// Snapshot the staged delta.
    ///
    /// An id staged for keeping is never also reported as evicted from the
    /// same namespace.
    pub fn build(self) -> CacheResult {
        let mut result = CacheResult::default();

        for (namespace, records) in self.graph.into_namespaces() {
            if !records.is_empty() {
                result
                    .cache_results
                    .insert(namespace, records.into_values().collect());
            }
        }
        if !self.on_demand.to_keep.is_empty() {
            result
                .cache_results
                .entry(Namespace::OnDemand)
                .or_default()
                .extend(self.on_demand.to_keep.into_values());
        }

        let mut evictions = self.evictions;
        evictions
            .entry(Namespace::OnDemand)
            .or_default()
            .extend(self.on_demand.to_evict);

        for (namespace, ids) in evictions {
            let kept = result.cache_results.get(&namespace);
            let ids: Vec<String> = ids
                .into_iter()
                .filter(|id| !kept.is_some_and(|records| records.iter().any(|r| &r.id == id)))
                .collect();
            if !ids.is_empty() {
                result.evictions.insert(namespace, ids);
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_keep_is_idempotent() {
        let mut builder = CacheResultBuilder::new();
        builder
            .namespace(Namespace::ServerGroups)
            .keep("sg")
            .attributes
            .insert("a".into(), json!(1));
        builder
            .namespace(Namespace::ServerGroups)
            .keep("sg")
            .attributes
            .insert("b".into(), json!(2));

        let result = builder.build();
        let records = result.records(Namespace::ServerGroups);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].attributes.len(), 2);
    }

    #[test]
    fn test_build_includes_on_demand_buckets() {
        let mut builder = CacheResultBuilder::new();
        builder
            .on_demand
            .to_keep
            .insert("k1".into(), CacheData::new("k1"));
        builder.on_demand.to_evict.insert("k2".into());

        let result = builder.build();
        assert!(result.record(Namespace::OnDemand, "k1").is_some());
        assert_eq!(result.evictions_for(Namespace::OnDemand), ["k2"]);
    }

    #[test]
    fn test_kept_ids_are_not_evicted() {
        let mut builder = CacheResultBuilder::new();
        builder.namespace(Namespace::Instances).keep("i-1");
        let mut instances = builder.namespace(Namespace::Instances);
        instances.evict("i-1");
        instances.evict("i-2");
        assert!(instances.keeps("i-1"));
        assert_eq!(instances.to_evict().len(), 2);

        let result = builder.build();
        assert_eq!(result.evictions_for(Namespace::Instances), ["i-2"]);
    }

    #[test]
    fn test_empty_builder_builds_empty_result() {
        let mut builder = CacheResultBuilder::new();
        builder.namespace(Namespace::Images);
        assert!(builder.build().is_empty());
    }

    #[test]
    fn test_splice_skips_on_demand_namespace() {
        let mut source = CacheResultBuilder::new();
        source.namespace(Namespace::ServerGroups).keep("sg");
        source
            .on_demand
            .to_keep
            .insert("sg".into(), CacheData::new("sg"));
        let spliced = source.build();

        let mut builder = CacheResultBuilder::new();
        builder.splice(&spliced);
        assert!(builder.graph().contains(Namespace::ServerGroups, "sg"));
        assert!(!builder.graph().contains(Namespace::OnDemand, "sg"));
    }

    #[test]
    fn test_link_through_builder() {
        let mut builder = CacheResultBuilder::new();
        builder.link((Namespace::Clusters, "c"), (Namespace::ServerGroups, "sg"));
        let result = builder.build();
        let sg = result.record(Namespace::ServerGroups, "sg").unwrap();
        assert_eq!(sg.related(Namespace::Clusters).collect::<Vec<_>>(), ["c"]);
    }
}
