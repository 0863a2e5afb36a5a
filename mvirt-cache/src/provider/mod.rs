//! Cloud API contract consumed by the caching agents.

mod fixture;

pub use fixture::{FixtureCloud, Inventory, InventoryResource, RegionInventory};

use async_trait::async_trait;
use thiserror::Error;

use crate::agent::AgentScope;
use crate::resource::ResourceKind;

/// Cloud API errors. Absence of a resource is not an error; see
/// [`CloudApi::get_one`].
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

pub type Result<T> = std::result::Result<T, ProviderError>;

/// Read access to one resource kind of a cloud provider.
///
/// No retries happen behind this trait; a failed call fails the pass.
#[async_trait]
pub trait CloudApi<R: ResourceKind>: Send + Sync {
    /// Every resource of this kind in the scope.
    async fn list_all(&self, scope: &AgentScope) -> Result<Vec<R>>;

    /// One resource by name. `Ok(None)` means the provider reported it absent.
    async fn get_one(&self, scope: &AgentScope, name: &str) -> Result<Option<R>>;
}
