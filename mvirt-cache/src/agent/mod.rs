//! Caching agents.
//!
//! One agent exists per (account, region, resource kind). It owns the full
//! scan of its scope and answers on-demand refreshes for single resources
//! of its kind. Agents share nothing but the store.

mod envelope;
mod on_demand;
mod pending;
mod scan;

pub use envelope::OnDemandEnvelope;
pub use on_demand::OnDemandOutcome;
pub use pending::PendingOnDemandRequest;
pub use scan::ScanSummary;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::audit::CacheAuditLogger;
use crate::error::Result;
use crate::keys::Keys;
use crate::provider::CloudApi;
use crate::resource::{BuildContext, OnDemandType, ResourceKind};
use crate::store::CacheStore;

/// Account and region an agent is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentScope {
    pub account: String,
    pub region: String,
}

impl AgentScope {
    pub fn new(account: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            region: region.into(),
        }
    }

    pub fn matches(&self, account: &str, region: &str) -> bool {
        self.account == account && self.region == region
    }
}

impl fmt::Display for AgentScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.account, self.region)
    }
}

/// Parses `account:region`.
impl FromStr for AgentScope {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((account, region))
                if !account.is_empty() && !region.is_empty() && !region.contains(':') =>
            {
                Ok(Self::new(account, region))
            }
            _ => Err(format!("expected account:region, got '{}'", s)),
        }
    }
}

/// Settings shared by every agent of a daemon.
#[derive(Debug, Clone)]
pub struct CachingConfig {
    /// Key prefix.
    pub provider: String,
    /// Lifetime of on-demand envelopes.
    pub on_demand_ttl: Duration,
    /// Lifetime of records an agent contributes to but does not own.
    /// `None` keeps them until evicted.
    pub informative_ttl: Option<Duration>,
}

impl Default for CachingConfig {
    fn default() -> Self {
        Self {
            provider: "mvirt".to_string(),
            on_demand_ttl: Duration::from_secs(600),
            informative_ttl: Some(Duration::from_secs(3600)),
        }
    }
}

/// Whole seconds of `ttl` as stored on records, saturating at `i64::MAX`.
pub(crate) fn ttl_seconds(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX)
}

/// The agent surface used by the scheduler, the dispatcher and the REST API.
#[async_trait]
pub trait Agent: Send + Sync {
    /// `account/region/kind`. Also the source name of every write.
    fn agent_type(&self) -> &str;

    fn scope(&self) -> &AgentScope;

    fn handles(&self, kind: OnDemandType) -> bool;

    /// Refresh one resource named in `params`.
    async fn handle(&self, params: &Map<String, Value>) -> Result<OnDemandOutcome>;

    /// Envelopes owned by this agent that are still in the store.
    async fn pending_on_demand_requests(&self) -> Result<Vec<PendingOnDemandRequest>>;

    /// Run one full scan and commit it.
    async fn run_once(&self) -> Result<ScanSummary>;
}

/// Agent caching one resource kind in one scope.
pub struct CachingAgent<R: ResourceKind> {
    scope: AgentScope,
    agent_type: String,
    config: Arc<CachingConfig>,
    keys: Keys,
    api: Arc<dyn CloudApi<R>>,
    store: Arc<dyn CacheStore>,
    audit: Arc<CacheAuditLogger>,
    _kind: PhantomData<fn() -> R>,
}

impl<R: ResourceKind> CachingAgent<R> {
    pub fn new(
        scope: AgentScope,
        config: Arc<CachingConfig>,
        keys: Keys,
        api: Arc<dyn CloudApi<R>>,
        store: Arc<dyn CacheStore>,
        audit: Arc<CacheAuditLogger>,
    ) -> Self {
        let agent_type = format!("{}/{}/{}", scope.account, scope.region, R::ON_DEMAND_TYPE);
        Self {
            scope,
            agent_type,
            config,
            keys,
            api,
            store,
            audit,
            _kind: PhantomData,
        }
    }

    /// Source name for records written by the on-demand path.
    fn on_demand_source(&self) -> String {
        format!("{}/on-demand", self.agent_type)
    }

    /// Key of a resource of this kind in this scope.
    fn resource_key(&self, name: &str) -> String {
        self.keys
            .regional(R::NAMESPACE, &self.scope.account, &self.scope.region, name)
    }

    /// Glob over every key of this kind in this scope.
    fn resource_pattern(&self) -> String {
        self.keys
            .regional_pattern(R::NAMESPACE, &self.scope.account, &self.scope.region)
    }

    fn build_context(&self) -> BuildContext<'_> {
        BuildContext {
            scope: &self.scope,
            keys: &self.keys,
            informative_ttl: self.config.informative_ttl.map(ttl_seconds),
        }
    }
}

#[async_trait]
impl<R: ResourceKind> Agent for CachingAgent<R> {
    fn agent_type(&self) -> &str {
        &self.agent_type
    }

    fn scope(&self) -> &AgentScope {
        &self.scope
    }

    fn handles(&self, kind: OnDemandType) -> bool {
        kind == R::ON_DEMAND_TYPE
    }

    async fn handle(&self, params: &Map<String, Value>) -> Result<OnDemandOutcome> {
        self.handle_on_demand(params).await
    }

    async fn pending_on_demand_requests(&self) -> Result<Vec<PendingOnDemandRequest>> {
        self.pending().await
    }

    async fn run_once(&self) -> Result<ScanSummary> {
        self.scan_and_commit().await
    }
}
