//! Audit events of the cache.
//!
//! Emitted under the `audit` tracing target so they can be routed apart
//! from operational logs.

use crate::agent::ScanSummary;

/// Audit logger for on-demand refreshes and scans.
pub struct CacheAuditLogger {
    component: String,
}

impl CacheAuditLogger {
    pub fn new(component: &str) -> Self {
        Self {
            component: component.to_string(),
        }
    }

    pub fn on_demand_stored(&self, agent: &str, key: &str) {
        tracing::info!(target: "audit", component = %self.component, agent, objects = ?[key], "On-demand result stored");
    }

    pub fn on_demand_evicted(&self, agent: &str, key: &str) {
        tracing::info!(target: "audit", component = %self.component, agent, objects = ?[key], "Resource absent, records evicted");
    }

    /// A processed envelope was removed by a scan.
    pub fn on_demand_processed(&self, agent: &str, key: &str) {
        tracing::debug!(target: "audit", component = %self.component, agent, objects = ?[key], "On-demand envelope retired");
    }

    pub fn scan_committed(&self, agent: &str, summary: &ScanSummary) {
        tracing::info!(
            target: "audit",
            component = %self.component,
            agent,
            kept = summary.kept,
            evicted = summary.evicted,
            spliced = summary.spliced,
            "Scan committed"
        );
    }

    pub fn scan_failed(&self, agent: &str, error: &str) {
        tracing::warn!(target: "audit", component = %self.component, agent, error, "Scan failed");
    }
}
