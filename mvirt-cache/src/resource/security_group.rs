//! Security groups and their firewall rules.

use serde::{Deserialize, Serialize};

use super::{BuildContext, OnDemandType, ResourceKind};
use crate::cache::{CacheResultBuilder, Namespace};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityRule {
    /// "ingress" or "egress"
    pub direction: String,
    pub protocol: String,
    #[serde(default)]
    pub port_start: Option<u16>,
    #[serde(default)]
    pub port_end: Option<u16>,
    #[serde(default)]
    pub cidr: Option<String>,
}

/// A security group as returned by the cloud API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityGroup {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub network_id: Option<String>,
    #[serde(default)]
    pub rules: Vec<SecurityRule>,
}

/// Cached attributes of a security group record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityGroupAttributes {
    pub name: String,
    pub account: String,
    pub region: String,
    pub application: String,
    pub description: Option<String>,
    pub network_id: Option<String>,
    pub rules: Vec<SecurityRule>,
}

impl ResourceKind for SecurityGroup {
    const ON_DEMAND_TYPE: OnDemandType = OnDemandType::SecurityGroup;
    const NAMESPACE: Namespace = Namespace::SecurityGroups;
    const AUTHORITATIVE: &'static [Namespace] = &[Namespace::SecurityGroups];

    fn name(&self) -> &str {
        &self.name
    }

    fn build_cache(
        &self,
        ctx: &BuildContext<'_>,
        builder: &mut CacheResultBuilder,
    ) -> serde_json::Result<()> {
        let moniker = ctx.namer().derive(&self.name);
        let group_key = ctx.key(Namespace::SecurityGroups, &self.name);
        let app_key = ctx.keys.application(&moniker.app);

        builder
            .namespace(Namespace::SecurityGroups)
            .keep(&group_key)
            .set_attributes(&SecurityGroupAttributes {
                name: self.name.clone(),
                account: ctx.scope.account.clone(),
                region: ctx.scope.region.clone(),
                application: moniker.app.clone(),
                description: self.description.clone(),
                network_id: self.network_id.clone(),
                rules: self.rules.clone(),
            })?;

        ctx.informative(builder, Namespace::Applications, &app_key)
            .attributes
            .insert("name".into(), moniker.app.into());
        builder.link(
            (Namespace::Applications, &app_key),
            (Namespace::SecurityGroups, &group_key),
        );

        if let Some(network_id) = &self.network_id {
            let network_key = ctx.key(Namespace::Networks, network_id);
            builder.link(
                (Namespace::SecurityGroups, &group_key),
                (Namespace::Networks, &network_key),
            );
        }

        Ok(())
    }
}
