//! Server groups and the instances they run.

use serde::{Deserialize, Serialize};

use super::{BuildContext, OnDemandType, ResourceKind};
use crate::cache::{CacheResultBuilder, Namespace};

/// Scaling bounds of a server group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capacity {
    pub min: u32,
    pub max: u32,
    #[serde(default)]
    pub desired: u32,
}

/// An instance as reported inside its server group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub id: String,
    #[serde(default)]
    pub zone: Option<String>,
    #[serde(default)]
    pub private_ip: Option<String>,
    #[serde(default)]
    pub health_state: Option<String>,
    #[serde(default)]
    pub launch_time: Option<i64>,
}

/// A server group as returned by the cloud API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerGroup {
    pub name: String,
    pub capacity: Capacity,
    #[serde(default)]
    pub zones: Vec<String>,
    #[serde(default)]
    pub image_id: Option<String>,
    #[serde(default)]
    pub instance_type: Option<String>,
    #[serde(default)]
    pub instances: Vec<Instance>,
    #[serde(default)]
    pub load_balancers: Vec<String>,
    #[serde(default)]
    pub security_groups: Vec<String>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub created_time: Option<i64>,
}

/// Cached attributes of a server group record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerGroupAttributes {
    pub name: String,
    pub account: String,
    pub region: String,
    pub application: String,
    pub cluster: String,
    pub capacity: Capacity,
    pub zones: Vec<String>,
    pub image_id: Option<String>,
    pub instance_type: Option<String>,
    pub disabled: bool,
    pub created_time: Option<i64>,
}

/// Cached attributes of an instance record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceAttributes {
    pub name: String,
    pub account: String,
    pub region: String,
    pub server_group: String,
    pub zone: Option<String>,
    pub private_ip: Option<String>,
    pub health_state: Option<String>,
    pub launch_time: Option<i64>,
}

impl ResourceKind for ServerGroup {
    const ON_DEMAND_TYPE: OnDemandType = OnDemandType::ServerGroup;
    const NAMESPACE: Namespace = Namespace::ServerGroups;
    const AUTHORITATIVE: &'static [Namespace] = &[Namespace::ServerGroups, Namespace::Instances];

    fn name(&self) -> &str {
        &self.name
    }

    fn build_cache(
        &self,
        ctx: &BuildContext<'_>,
        builder: &mut CacheResultBuilder,
    ) -> serde_json::Result<()> {
        let moniker = ctx.namer().derive(&self.name);
        let account = &ctx.scope.account;
        let region = &ctx.scope.region;

        let sg_key = ctx.key(Namespace::ServerGroups, &self.name);
        let app_key = ctx.keys.application(&moniker.app);
        let cluster_key = ctx.keys.cluster(account, &moniker.app, &moniker.cluster);

        builder
            .namespace(Namespace::ServerGroups)
            .keep(&sg_key)
            .set_attributes(&ServerGroupAttributes {
                name: self.name.clone(),
                account: account.clone(),
                region: region.clone(),
                application: moniker.app.clone(),
                cluster: moniker.cluster.clone(),
                capacity: self.capacity,
                zones: self.zones.clone(),
                image_id: self.image_id.clone(),
                instance_type: self.instance_type.clone(),
                disabled: self.disabled,
                created_time: self.created_time,
            })?;

        ctx.informative(builder, Namespace::Applications, &app_key)
            .attributes
            .insert("name".into(), moniker.app.clone().into());
        let cluster = ctx.informative(builder, Namespace::Clusters, &cluster_key);
        cluster
            .attributes
            .insert("name".into(), moniker.cluster.clone().into());
        cluster
            .attributes
            .insert("application".into(), moniker.app.clone().into());
        cluster
            .attributes
            .insert("account".into(), account.clone().into());

        builder.link(
            (Namespace::Applications, &app_key),
            (Namespace::Clusters, &cluster_key),
        );
        builder.link(
            (Namespace::Clusters, &cluster_key),
            (Namespace::ServerGroups, &sg_key),
        );

        for instance in &self.instances {
            let instance_key = ctx.key(Namespace::Instances, &instance.id);
            builder
                .namespace(Namespace::Instances)
                .keep(&instance_key)
                .set_attributes(&InstanceAttributes {
                    name: instance.id.clone(),
                    account: account.clone(),
                    region: region.clone(),
                    server_group: self.name.clone(),
                    zone: instance.zone.clone(),
                    private_ip: instance.private_ip.clone(),
                    health_state: instance.health_state.clone(),
                    launch_time: instance.launch_time,
                })?;
            builder.link(
                (Namespace::ServerGroups, &sg_key),
                (Namespace::Instances, &instance_key),
            );
        }

        for lb in &self.load_balancers {
            let lb_key = ctx.key(Namespace::LoadBalancers, lb);
            ctx.informative(builder, Namespace::LoadBalancers, &lb_key);
            builder.link(
                (Namespace::ServerGroups, &sg_key),
                (Namespace::LoadBalancers, &lb_key),
            );
        }

        for group in &self.security_groups {
            let group_key = ctx.key(Namespace::SecurityGroups, group);
            builder.link(
                (Namespace::ServerGroups, &sg_key),
                (Namespace::SecurityGroups, &group_key),
            );
        }

        if let Some(image_id) = &self.image_id {
            let image_key = ctx.key(Namespace::Images, image_id);
            builder.link(
                (Namespace::ServerGroups, &sg_key),
                (Namespace::Images, &image_key),
            );
        }

        Ok(())
    }
}
