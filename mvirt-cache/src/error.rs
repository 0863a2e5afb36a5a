//! Errors surfaced by caching passes and on-demand refreshes.

use thiserror::Error;

use crate::provider::ProviderError;
use crate::store::StoreError;

/// Errors that abort a caching pass or an on-demand refresh.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The cloud API call failed. Nothing was committed.
    #[error("cloud provider: {0}")]
    Provider(#[from] ProviderError),

    /// The cache store rejected a read or write.
    #[error("store: {0}")]
    Store(#[from] StoreError),

    /// A record could not be projected to or from its attributes.
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for caching operations.
pub type Result<T> = std::result::Result<T, CacheError>;
