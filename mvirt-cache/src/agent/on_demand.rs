//! On-demand refresh of a single resource.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::{CachingAgent, OnDemandEnvelope, ttl_seconds};
use crate::cache::{CacheResult, CacheResultBuilder, Namespace};
use crate::error::Result;
use crate::now_millis;
use crate::resource::ResourceKind;

/// Result of a trigger.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnDemandOutcome {
    /// The request named this agent's scope and a resource.
    pub handled: bool,
    /// The resource was reported absent and its records were removed.
    pub evicted: bool,
    /// The delta built for the resource, or its evictions.
    pub cache_result: CacheResult,
}

impl OnDemandOutcome {
    pub fn not_handled() -> Self {
        Self::default()
    }
}

fn param<'a>(params: &'a Map<String, Value>, name: &str) -> Option<&'a str> {
    params.get(name).and_then(Value::as_str)
}

impl<R: ResourceKind> CachingAgent<R> {
    /// Resource name in `params`, if the request targets this agent's scope.
    fn requested_name<'a>(&self, params: &'a Map<String, Value>) -> Option<&'a str> {
        let account = param(params, "account")?;
        let region = param(params, "region")?;
        if !self.scope.matches(account, region) {
            return None;
        }
        param(params, R::ON_DEMAND_TYPE.name_param())
            .or_else(|| param(params, "name"))
            .filter(|name| !name.is_empty())
    }

    pub(crate) async fn handle_on_demand(&self, params: &Map<String, Value>) -> Result<OnDemandOutcome> {
        let Some(name) = self.requested_name(params) else {
            debug!(agent = %self.agent_type, "On-demand request for another scope, ignoring");
            return Ok(OnDemandOutcome::not_handled());
        };
        let key = self.resource_key(name);

        // Transport errors propagate; only an explicit absence evicts.
        let Some(resource) = self.api.get_one(&self.scope, name).await? else {
            return self.evict_on_demand(key).await;
        };

        let cache_time = now_millis();
        let mut builder = CacheResultBuilder::new();
        resource.build_cache(&self.build_context(), &mut builder)?;
        let delta = builder.build();

        let ttl = ttl_seconds(self.config.on_demand_ttl);
        let envelope = OnDemandEnvelope::new(key.clone(), cache_time, &delta, ttl)?;

        // The delta is readable right away under its own short-lived source.
        // The envelope is written last so a scan never sees it before the data.
        let mut readable = delta.clone();
        for records in readable.cache_results.values_mut() {
            for record in records.iter_mut() {
                record.ttl_seconds = Some(ttl);
            }
        }
        self.store.apply(&self.on_demand_source(), &readable).await?;
        self.store
            .put_cache_data(Namespace::OnDemand, &self.agent_type, &[envelope.into_record()?])
            .await?;

        info!(agent = %self.agent_type, key = %key, "Stored on-demand result");
        self.audit.on_demand_stored(&self.agent_type, &key);

        Ok(OnDemandOutcome {
            handled: true,
            evicted: false,
            cache_result: delta,
        })
    }

    /// The resource is gone: drop its record and any pending envelope.
    async fn evict_on_demand(&self, key: String) -> Result<OnDemandOutcome> {
        let ids = [key.clone()];
        self.store.evict_deleted_items(R::NAMESPACE, &ids).await?;
        self.store
            .evict_deleted_items(Namespace::OnDemand, &ids)
            .await?;

        info!(agent = %self.agent_type, key = %key, "Resource absent, evicted");
        self.audit.on_demand_evicted(&self.agent_type, &key);

        let mut cache_result = CacheResult::default();
        cache_result.evictions.insert(R::NAMESPACE, vec![key]);
        Ok(OnDemandOutcome {
            handled: true,
            evicted: true,
            cache_result,
        })
    }
}
