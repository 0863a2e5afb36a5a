//! Fan-out of on-demand triggers to agents.

use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::warn;

use crate::agent::{Agent, OnDemandOutcome, PendingOnDemandRequest};
use crate::error::Result;
use crate::resource::OnDemandType;

/// Combined outcome of a trigger across all agents.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchOutcome {
    pub handled: bool,
    pub evicted: bool,
    /// Outcomes of the agents that handled the trigger.
    pub results: Vec<OnDemandOutcome>,
}

/// Routes triggers to every agent of the requested type.
///
/// Agents of other scopes answer "not handled", so one trigger can be
/// offered to all of them.
#[derive(Default)]
pub struct OnDemandDispatcher {
    agents: Vec<Arc<dyn Agent>>,
}

impl OnDemandDispatcher {
    pub fn new(agents: Vec<Arc<dyn Agent>>) -> Self {
        Self { agents }
    }

    pub fn agents(&self) -> &[Arc<dyn Agent>] {
        &self.agents
    }

    pub async fn dispatch(
        &self,
        kind: OnDemandType,
        params: &Map<String, Value>,
    ) -> Result<DispatchOutcome> {
        let mut outcome = DispatchOutcome::default();
        for agent in self.agents.iter().filter(|a| a.handles(kind)) {
            let result = agent.handle(params).await.inspect_err(|e| {
                warn!(agent = %agent.agent_type(), error = %e, "On-demand refresh failed");
            })?;
            if result.handled {
                outcome.handled = true;
                outcome.evicted |= result.evicted;
                outcome.results.push(result);
            }
        }
        Ok(outcome)
    }

    /// Pending envelopes of every agent of `kind`, or of all agents.
    pub async fn pending(&self, kind: Option<OnDemandType>) -> Result<Vec<PendingOnDemandRequest>> {
        let mut pending = Vec::new();
        for agent in &self.agents {
            if kind.is_some_and(|kind| !agent.handles(kind)) {
                continue;
            }
            pending.extend(agent.pending_on_demand_requests().await?);
        }
        Ok(pending)
    }
}
