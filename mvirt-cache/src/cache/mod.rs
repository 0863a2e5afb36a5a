//! Cache records and the staging structures a pass builds them in.

mod builder;
mod data;
mod graph;
pub mod relationships;

pub use builder::{CacheResultBuilder, NamespaceCache, OnDemandBuckets};
pub use data::{CacheData, CacheResult, Namespace, UnknownNamespace};
pub use graph::EntityGraph;
