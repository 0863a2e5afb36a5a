//! Polling view of on-demand envelopes that no scan has retired yet.

use serde::Serialize;
use tracing::warn;

use super::{CachingAgent, OnDemandEnvelope};
use crate::cache::Namespace;
use crate::error::Result;
use crate::keys::KeyDetails;
use crate::resource::ResourceKind;

/// An on-demand envelope as seen by pollers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOnDemandRequest {
    pub id: String,
    pub details: Option<KeyDetails>,
    pub cache_time: i64,
    pub processed_count: u32,
    pub processed_time: Option<i64>,
}

impl<R: ResourceKind> CachingAgent<R> {
    /// Lists this agent's envelopes. Read-only.
    pub(crate) async fn pending(&self) -> Result<Vec<PendingOnDemandRequest>> {
        let ids = self
            .store
            .filter_identifiers(Namespace::OnDemand, &self.resource_pattern())
            .await?;
        let records = self.store.get_all(Namespace::OnDemand, &ids).await?;

        let mut pending = Vec::with_capacity(records.len());
        for record in records {
            match OnDemandEnvelope::from_record(&record) {
                Ok(envelope) => pending.push(PendingOnDemandRequest {
                    details: self.keys.parse(&envelope.id),
                    id: envelope.id,
                    cache_time: envelope.cache_time,
                    processed_count: envelope.processed_count,
                    processed_time: envelope.processed_time,
                }),
                Err(e) => {
                    warn!(agent = %self.agent_type, key = %record.id, error = %e, "Unreadable on-demand envelope");
                }
            }
        }
        Ok(pending)
    }
}
