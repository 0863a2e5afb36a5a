//! Load balancers.

use serde::{Deserialize, Serialize};

use super::{BuildContext, OnDemandType, ResourceKind};
use crate::cache::{CacheResultBuilder, Namespace};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listener {
    pub protocol: String,
    pub port: u16,
    pub target_port: u16,
}

/// A load balancer as returned by the cloud API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancer {
    pub name: String,
    #[serde(default)]
    pub dns_name: Option<String>,
    #[serde(default)]
    pub listeners: Vec<Listener>,
    #[serde(default)]
    pub network_id: Option<String>,
    #[serde(default)]
    pub subnets: Vec<String>,
    #[serde(default)]
    pub created_time: Option<i64>,
}

/// Cached attributes of a load balancer record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancerAttributes {
    pub name: String,
    pub account: String,
    pub region: String,
    pub application: String,
    pub dns_name: Option<String>,
    pub listeners: Vec<Listener>,
    pub network_id: Option<String>,
    pub created_time: Option<i64>,
}

impl ResourceKind for LoadBalancer {
    const ON_DEMAND_TYPE: OnDemandType = OnDemandType::LoadBalancer;
    const NAMESPACE: Namespace = Namespace::LoadBalancers;
    const AUTHORITATIVE: &'static [Namespace] = &[Namespace::LoadBalancers];

    fn name(&self) -> &str {
        &self.name
    }

    fn build_cache(
        &self,
        ctx: &BuildContext<'_>,
        builder: &mut CacheResultBuilder,
    ) -> serde_json::Result<()> {
        let moniker = ctx.namer().derive(&self.name);
        let lb_key = ctx.key(Namespace::LoadBalancers, &self.name);
        let app_key = ctx.keys.application(&moniker.app);

        builder
            .namespace(Namespace::LoadBalancers)
            .keep(&lb_key)
            .set_attributes(&LoadBalancerAttributes {
                name: self.name.clone(),
                account: ctx.scope.account.clone(),
                region: ctx.scope.region.clone(),
                application: moniker.app.clone(),
                dns_name: self.dns_name.clone(),
                listeners: self.listeners.clone(),
                network_id: self.network_id.clone(),
                created_time: self.created_time,
            })?;

        ctx.informative(builder, Namespace::Applications, &app_key)
            .attributes
            .insert("name".into(), moniker.app.into());
        builder.link(
            (Namespace::Applications, &app_key),
            (Namespace::LoadBalancers, &lb_key),
        );

        if let Some(network_id) = &self.network_id {
            let network_key = ctx.key(Namespace::Networks, network_id);
            builder.link(
                (Namespace::LoadBalancers, &lb_key),
                (Namespace::Networks, &network_key),
            );
        }
        for subnet in &self.subnets {
            let subnet_key = ctx.key(Namespace::Subnets, subnet);
            builder.link(
                (Namespace::LoadBalancers, &lb_key),
                (Namespace::Subnets, &subnet_key),
            );
        }

        Ok(())
    }
}
