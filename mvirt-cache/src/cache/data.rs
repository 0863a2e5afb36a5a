use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A partition of the cache key space, one per resource type.
///
/// `OnDemand` is special: its records are envelopes around a pending
/// point refresh, not resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Namespace {
    Applications,
    Clusters,
    ServerGroups,
    Instances,
    LoadBalancers,
    SecurityGroups,
    Images,
    Networks,
    Subnets,
    OnDemand,
}

impl Namespace {
    pub const ALL: [Namespace; 10] = [
        Namespace::Applications,
        Namespace::Clusters,
        Namespace::ServerGroups,
        Namespace::Instances,
        Namespace::LoadBalancers,
        Namespace::SecurityGroups,
        Namespace::Images,
        Namespace::Networks,
        Namespace::Subnets,
        Namespace::OnDemand,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Applications => "applications",
            Namespace::Clusters => "clusters",
            Namespace::ServerGroups => "server-groups",
            Namespace::Instances => "instances",
            Namespace::LoadBalancers => "load-balancers",
            Namespace::SecurityGroups => "security-groups",
            Namespace::Images => "images",
            Namespace::Networks => "networks",
            Namespace::Subnets => "subnets",
            Namespace::OnDemand => "on-demand",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string does not name a known namespace.
#[derive(Debug, Error)]
#[error("unknown namespace: {0}")]
pub struct UnknownNamespace(pub String);

impl FromStr for Namespace {
    type Err = UnknownNamespace;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Namespace::ALL
            .into_iter()
            .find(|ns| ns.as_str() == s)
            .ok_or_else(|| UnknownNamespace(s.to_string()))
    }
}

/// One cached record: schema-less attributes plus typed relationships.
///
/// Attributes stay untyped at the store boundary; resource kinds project
/// them to and from their own structs with [`CacheData::set_attributes`]
/// and [`CacheData::attributes_as`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheData {
    pub id: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default)]
    pub relationships: BTreeMap<Namespace, BTreeSet<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_seconds: Option<i64>,
}

impl CacheData {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_ttl(mut self, ttl_seconds: Option<i64>) -> Self {
        self.ttl_seconds = ttl_seconds;
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Copy every field of a typed projection into the attribute map.
    ///
    /// Existing keys not present in `value` are left untouched.
    pub fn set_attributes<T: Serialize>(&mut self, value: &T) -> serde_json::Result<()> {
        match serde_json::to_value(value)? {
            Value::Object(fields) => {
                self.attributes.extend(fields);
                Ok(())
            }
            other => Err(serde::ser::Error::custom(format!(
                "attributes must serialize to an object, got {}",
                other
            ))),
        }
    }

    /// Read the attribute map back as a typed projection.
    pub fn attributes_as<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_value(Value::Object(self.attributes.clone()))
    }

    pub fn add_relationship(&mut self, namespace: Namespace, id: impl Into<String>) {
        self.relationships
            .entry(namespace)
            .or_default()
            .insert(id.into());
    }

    /// Ids related to this record in `namespace`.
    pub fn related(&self, namespace: Namespace) -> impl Iterator<Item = &str> {
        self.relationships
            .get(&namespace)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    /// Fold another view of the same record into this one.
    ///
    /// Attributes from `other` win, relationships accumulate.
    pub fn merge(&mut self, other: CacheData) {
        self.attributes.extend(other.attributes);
        for (namespace, ids) in other.relationships {
            self.relationships.entry(namespace).or_default().extend(ids);
        }
        if other.ttl_seconds.is_some() {
            self.ttl_seconds = other.ttl_seconds;
        }
    }
}

/// A coherent multi-namespace delta: records to keep and ids to evict.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheResult {
    #[serde(default)]
    pub cache_results: BTreeMap<Namespace, Vec<CacheData>>,
    #[serde(default)]
    pub evictions: BTreeMap<Namespace, Vec<String>>,
}

impl CacheResult {
    pub fn records(&self, namespace: Namespace) -> &[CacheData] {
        self.cache_results
            .get(&namespace)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn record(&self, namespace: Namespace, id: &str) -> Option<&CacheData> {
        self.records(namespace).iter().find(|r| r.id == id)
    }

    pub fn evictions_for(&self, namespace: Namespace) -> &[String] {
        self.evictions
            .get(&namespace)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.cache_results.values().all(Vec::is_empty) && self.evictions.values().all(Vec::is_empty)
    }
}
