//! mvirt-cache: relationship-structured cache of cloud resources.
//!
//! Two refresh paths feed the same cache:
//! - a periodic full scan per (account, region, resource type), and
//! - on-demand point refreshes triggered after mutating operations.
//!
//! On-demand results are parked as envelopes in the `on-demand` namespace
//! until a full scan has observed them, which lets both paths run without
//! locks while never losing a fresher view to a slower scan.

pub mod agent;
pub mod audit;
pub mod cache;
pub mod dispatcher;
pub mod error;
pub mod keys;
pub mod naming;
pub mod provider;
pub mod resource;
pub mod rest;
pub mod scheduler;
pub mod store;

pub use agent::{Agent, AgentScope, CachingAgent, CachingConfig};
pub use audit::CacheAuditLogger;
pub use cache::{CacheData, CacheResult, CacheResultBuilder, EntityGraph, Namespace};
pub use dispatcher::OnDemandDispatcher;
pub use error::{CacheError, Result};
pub use keys::{KeyDetails, Keys};
pub use naming::{DefaultNamer, Moniker, Namer};
pub use provider::{CloudApi, FixtureCloud, ProviderError};
pub use resource::{OnDemandType, ResourceKind};
pub use scheduler::AgentScheduler;
pub use store::{CacheStore, MemoryStore, SqliteStore, StoreError};

/// Current wall-clock time in epoch milliseconds.
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
