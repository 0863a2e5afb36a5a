//! In-process cloud backed by a JSON inventory.
//!
//! Used by the daemon for local runs and by the tests to play the part of a
//! remote provider, including outages.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

use super::{CloudApi, ProviderError, Result};
use crate::agent::AgentScope;
use crate::resource::{LoadBalancer, ResourceKind, SecurityGroup, ServerGroup};

/// Resources of one account and region.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionInventory {
    pub account: String,
    pub region: String,
    #[serde(default)]
    pub server_groups: Vec<ServerGroup>,
    #[serde(default)]
    pub load_balancers: Vec<LoadBalancer>,
    #[serde(default)]
    pub security_groups: Vec<SecurityGroup>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(default)]
    pub regions: Vec<RegionInventory>,
}

/// A resource kind stored in a [`RegionInventory`].
pub trait InventoryResource: ResourceKind {
    fn list(region: &RegionInventory) -> &[Self];
    fn list_mut(region: &mut RegionInventory) -> &mut Vec<Self>;
}

impl InventoryResource for ServerGroup {
    fn list(region: &RegionInventory) -> &[Self] {
        &region.server_groups
    }

    fn list_mut(region: &mut RegionInventory) -> &mut Vec<Self> {
        &mut region.server_groups
    }
}

impl InventoryResource for LoadBalancer {
    fn list(region: &RegionInventory) -> &[Self] {
        &region.load_balancers
    }

    fn list_mut(region: &mut RegionInventory) -> &mut Vec<Self> {
        &mut region.load_balancers
    }
}

impl InventoryResource for SecurityGroup {
    fn list(region: &RegionInventory) -> &[Self] {
        &region.security_groups
    }

    fn list_mut(region: &mut RegionInventory) -> &mut Vec<Self> {
        &mut region.security_groups
    }
}

/// Cloud API over an in-memory [`Inventory`].
#[derive(Debug, Default)]
pub struct FixtureCloud {
    inventory: RwLock<Inventory>,
    unavailable: AtomicBool,
}

impl FixtureCloud {
    pub fn new(inventory: Inventory) -> Self {
        Self {
            inventory: RwLock::new(inventory),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Load an inventory from a JSON file.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ProviderError::Unavailable(format!("{}: {}", path.display(), e)))?;
        let inventory: Inventory = serde_json::from_str(&raw)
            .map_err(|e| ProviderError::InvalidResponse(format!("{}: {}", path.display(), e)))?;
        debug!(path = %path.display(), regions = inventory.regions.len(), "Loaded inventory");
        Ok(Self::new(inventory))
    }

    /// Insert or replace a resource, matched by name.
    pub async fn upsert<R: InventoryResource>(&self, scope: &AgentScope, resource: R) {
        let mut inventory = self.inventory.write().await;
        let region = match inventory
            .regions
            .iter()
            .position(|r| scope.matches(&r.account, &r.region))
        {
            Some(index) => &mut inventory.regions[index],
            None => {
                inventory.regions.push(RegionInventory {
                    account: scope.account.clone(),
                    region: scope.region.clone(),
                    ..Default::default()
                });
                let last = inventory.regions.len() - 1;
                &mut inventory.regions[last]
            }
        };

        let resources = R::list_mut(region);
        match resources.iter_mut().find(|r| r.name() == resource.name()) {
            Some(existing) => *existing = resource,
            None => resources.push(resource),
        }
    }

    /// Remove a resource by name. Returns whether it existed.
    pub async fn remove<R: InventoryResource>(&self, scope: &AgentScope, name: &str) -> bool {
        let mut inventory = self.inventory.write().await;
        let Some(region) = inventory
            .regions
            .iter_mut()
            .find(|r| scope.matches(&r.account, &r.region))
        else {
            return false;
        };
        let resources = R::list_mut(region);
        let before = resources.len();
        resources.retain(|r| r.name() != name);
        resources.len() != before
    }

    /// Make every call fail as if the provider were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ProviderError::Unavailable("fixture cloud is offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl<R: InventoryResource> CloudApi<R> for FixtureCloud {
    async fn list_all(&self, scope: &AgentScope) -> Result<Vec<R>> {
        self.check_available()?;
        let inventory = self.inventory.read().await;
        Ok(inventory
            .regions
            .iter()
            .filter(|r| scope.matches(&r.account, &r.region))
            .flat_map(|r| R::list(r).iter().cloned())
            .collect())
    }

    async fn get_one(&self, scope: &AgentScope, name: &str) -> Result<Option<R>> {
        self.check_available()?;
        let inventory = self.inventory.read().await;
        Ok(inventory
            .regions
            .iter()
            .filter(|r| scope.matches(&r.account, &r.region))
            .flat_map(|r| R::list(r).iter())
            .find(|r| r.name() == name)
            .cloned())
    }
}
