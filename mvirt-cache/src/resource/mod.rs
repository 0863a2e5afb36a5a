//! Cacheable resource kinds.
//!
//! Each kind is a typed projection of what the cloud API returns, plus the
//! logic that turns one resource into graph entries. The same logic serves
//! full scans and on-demand refreshes.

mod load_balancer;
mod security_group;
mod server_group;

pub use load_balancer::{LoadBalancer, LoadBalancerAttributes, Listener};
pub use security_group::{SecurityGroup, SecurityGroupAttributes, SecurityRule};
pub use server_group::{Capacity, Instance, InstanceAttributes, ServerGroup, ServerGroupAttributes};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::agent::AgentScope;
use crate::cache::{CacheData, CacheResultBuilder, Namespace};
use crate::keys::Keys;
use crate::naming::Namer;

/// Resource types that accept on-demand refresh requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OnDemandType {
    ServerGroup,
    LoadBalancer,
    SecurityGroup,
}

impl OnDemandType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OnDemandType::ServerGroup => "serverGroup",
            OnDemandType::LoadBalancer => "loadBalancer",
            OnDemandType::SecurityGroup => "securityGroup",
        }
    }

    /// Parameter carrying the resource name in a trigger request.
    pub fn name_param(&self) -> &'static str {
        match self {
            OnDemandType::ServerGroup => "serverGroupName",
            OnDemandType::LoadBalancer => "loadBalancerName",
            OnDemandType::SecurityGroup => "securityGroupName",
        }
    }
}

impl fmt::Display for OnDemandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OnDemandType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "serverGroup" => Ok(OnDemandType::ServerGroup),
            "loadBalancer" => Ok(OnDemandType::LoadBalancer),
            "securityGroup" => Ok(OnDemandType::SecurityGroup),
            other => Err(format!("unknown on-demand type: {}", other)),
        }
    }
}

/// Everything a resource needs to place itself in the graph.
pub struct BuildContext<'a> {
    pub scope: &'a AgentScope,
    pub keys: &'a Keys,
    /// TTL for records this kind only contributes to (applications,
    /// clusters, related resources owned by other kinds).
    pub informative_ttl: Option<i64>,
}

impl BuildContext<'_> {
    pub fn namer(&self) -> &dyn Namer {
        self.keys.namer()
    }

    /// Key of a resource in this context's account and region.
    pub fn key(&self, namespace: Namespace, name: &str) -> String {
        self.keys
            .regional(namespace, &self.scope.account, &self.scope.region, name)
    }

    /// Stages a record this kind does not own, tagged with the informative TTL.
    pub fn informative<'b>(
        &self,
        builder: &'b mut CacheResultBuilder,
        namespace: Namespace,
        id: &str,
    ) -> &'b mut CacheData {
        let record = builder.namespace(namespace).keep(id);
        if record.ttl_seconds.is_none() {
            record.ttl_seconds = self.informative_ttl;
        }
        record
    }
}

/// A cloud resource type the engine can cache.
pub trait ResourceKind: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const ON_DEMAND_TYPE: OnDemandType;

    /// Namespace owning records of this kind.
    const NAMESPACE: Namespace;

    /// Namespaces a full scan of this kind lists completely. Ids absent from
    /// a completed scan are evicted from these.
    const AUTHORITATIVE: &'static [Namespace];

    fn name(&self) -> &str;

    /// Stage this resource, its related records and all edges.
    fn build_cache(
        &self,
        ctx: &BuildContext<'_>,
        builder: &mut CacheResultBuilder,
    ) -> serde_json::Result<()>;
}
