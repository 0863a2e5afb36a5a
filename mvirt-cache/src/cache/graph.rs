use std::collections::BTreeMap;

use super::data::{CacheData, Namespace};

/// In-memory entity graph built during one pass.
///
/// Records are created on first access, so callers can write
/// `graph.entry(ns, id).add_relationship(..)` without existence checks.
/// The same id always yields the same record, which lets edges added from
/// different code paths accumulate.
#[derive(Debug, Clone, Default)]
pub struct EntityGraph {
    namespaces: BTreeMap<Namespace, BTreeMap<String, CacheData>>,
}

impl EntityGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutable view of one namespace, created empty if absent.
    pub fn get(&mut self, namespace: Namespace) -> &mut BTreeMap<String, CacheData> {
        self.namespaces.entry(namespace).or_default()
    }

    /// The record for `(namespace, id)`, created empty if absent.
    pub fn entry(&mut self, namespace: Namespace, id: &str) -> &mut CacheData {
        self.get(namespace)
            .entry(id.to_string())
            .or_insert_with(|| CacheData::new(id))
    }

    pub fn record(&self, namespace: Namespace, id: &str) -> Option<&CacheData> {
        self.namespaces.get(&namespace)?.get(id)
    }

    pub fn contains(&self, namespace: Namespace, id: &str) -> bool {
        self.record(namespace, id).is_some()
    }

    pub fn ids(&self, namespace: Namespace) -> impl Iterator<Item = &str> {
        self.namespaces
            .get(&namespace)
            .into_iter()
            .flat_map(|records| records.keys().map(String::as_str))
    }

    /// Merge a record produced elsewhere into the graph.
    pub fn splice(&mut self, namespace: Namespace, record: CacheData) {
        let id = record.id.clone();
        self.entry(namespace, &id).merge(record);
    }

    pub fn remove(&mut self, namespace: Namespace, id: &str) -> Option<CacheData> {
        self.namespaces.get_mut(&namespace)?.remove(id)
    }

    pub fn len(&self, namespace: Namespace) -> usize {
        self.namespaces.get(&namespace).map_or(0, BTreeMap::len)
    }

    pub fn into_namespaces(self) -> BTreeMap<Namespace, BTreeMap<String, CacheData>> {
        self.namespaces
    }
}
