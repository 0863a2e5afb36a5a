//! Declarative relationship table.
//!
//! Every edge in the graph goes through [`link`], which consults
//! [`RELATIONSHIPS`] to decide whether the reverse edge must be added too.

use super::data::Namespace;
use super::graph::EntityGraph;

/// A modelled relationship between two namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relationship {
    pub from: Namespace,
    pub to: Namespace,
    /// When set, an edge in either direction implies the other one.
    pub reciprocal: bool,
}

const fn rel(from: Namespace, to: Namespace, reciprocal: bool) -> Relationship {
    Relationship {
        from,
        to,
        reciprocal,
    }
}

pub const RELATIONSHIPS: &[Relationship] = &[
    rel(Namespace::Applications, Namespace::Clusters, true),
    rel(Namespace::Applications, Namespace::LoadBalancers, true),
    rel(Namespace::Applications, Namespace::SecurityGroups, true),
    rel(Namespace::Clusters, Namespace::ServerGroups, true),
    rel(Namespace::ServerGroups, Namespace::Instances, true),
    rel(Namespace::ServerGroups, Namespace::LoadBalancers, true),
    rel(Namespace::ServerGroups, Namespace::Images, false),
    rel(Namespace::ServerGroups, Namespace::SecurityGroups, false),
    rel(Namespace::LoadBalancers, Namespace::Networks, false),
    rel(Namespace::LoadBalancers, Namespace::Subnets, false),
    rel(Namespace::SecurityGroups, Namespace::Networks, false),
];

/// Looks up the relationship between two namespaces in either direction.
pub fn lookup(a: Namespace, b: Namespace) -> Option<&'static Relationship> {
    RELATIONSHIPS
        .iter()
        .find(|r| (r.from == a && r.to == b) || (r.from == b && r.to == a))
}

pub fn is_reciprocal(a: Namespace, b: Namespace) -> bool {
    lookup(a, b).is_some_and(|r| r.reciprocal)
}

/// Adds the edge `from -> to`, plus `to -> from` when the pair is reciprocal.
pub fn link(graph: &mut EntityGraph, from: (Namespace, &str), to: (Namespace, &str)) {
    let (from_ns, from_id) = from;
    let (to_ns, to_id) = to;

    graph.entry(from_ns, from_id).add_relationship(to_ns, to_id);
    if is_reciprocal(from_ns, to_ns) {
        graph.entry(to_ns, to_id).add_relationship(from_ns, from_id);
    }
}
