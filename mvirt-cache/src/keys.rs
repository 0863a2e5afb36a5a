//! Cache key construction and parsing.
//!
//! Keys are colon separated and always start with the provider prefix and
//! the namespace:
//!
//! ```text
//! mvirt:applications:<app>
//! mvirt:clusters:<account>:<app>:<cluster>
//! mvirt:<namespace>:<account>:<region>:<name>
//! ```
//!
//! On-demand envelopes are stored under the key of the resource they refresh.

use serde::Serialize;
use std::sync::Arc;

use crate::cache::Namespace;
use crate::naming::Namer;

/// Fields recovered from a cache key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyDetails {
    pub provider: String,
    pub namespace: Namespace,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
}

/// Builds and parses keys for one provider prefix.
#[derive(Clone)]
pub struct Keys {
    provider: String,
    namer: Arc<dyn Namer>,
}

impl Keys {
    pub fn new(provider: impl Into<String>, namer: Arc<dyn Namer>) -> Self {
        Self {
            provider: provider.into(),
            namer,
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn namer(&self) -> &dyn Namer {
        self.namer.as_ref()
    }

    pub fn application(&self, app: &str) -> String {
        format!("{}:{}:{}", self.provider, Namespace::Applications, app)
    }

    pub fn cluster(&self, account: &str, app: &str, cluster: &str) -> String {
        format!(
            "{}:{}:{}:{}:{}",
            self.provider,
            Namespace::Clusters,
            account,
            app,
            cluster
        )
    }

    /// Key of a resource living in one account and region.
    pub fn regional(&self, namespace: Namespace, account: &str, region: &str, name: &str) -> String {
        format!(
            "{}:{}:{}:{}:{}",
            self.provider, namespace, account, region, name
        )
    }

    /// Glob matching every regional key of `namespace` in one account and region.
    pub fn regional_pattern(&self, namespace: Namespace, account: &str, region: &str) -> String {
        self.regional(namespace, account, region, "*")
    }

    /// Parses a key produced by this instance. Returns `None` for foreign
    /// providers and malformed keys.
    pub fn parse(&self, key: &str) -> Option<KeyDetails> {
        let parts: Vec<&str> = key.split(':').collect();
        if parts.len() < 3 || parts[0] != self.provider {
            return None;
        }
        let namespace: Namespace = parts[1].parse().ok()?;

        let mut details = KeyDetails {
            provider: self.provider.clone(),
            namespace,
            name: String::new(),
            account: None,
            region: None,
            application: None,
            cluster: None,
        };

        match (namespace, parts.len()) {
            (Namespace::Applications, 3) => {
                details.name = parts[2].to_string();
                details.application = Some(parts[2].to_string());
            }
            (Namespace::Clusters, 5) => {
                details.account = Some(parts[2].to_string());
                details.application = Some(parts[3].to_string());
                details.cluster = Some(parts[4].to_string());
                details.name = parts[4].to_string();
            }
            (Namespace::Applications | Namespace::Clusters | Namespace::OnDemand, _) => return None,
            (_, 5) => {
                details.account = Some(parts[2].to_string());
                details.region = Some(parts[3].to_string());
                details.name = parts[4].to_string();

                if matches!(
                    namespace,
                    Namespace::ServerGroups | Namespace::LoadBalancers | Namespace::SecurityGroups
                ) {
                    let moniker = self.namer.derive(&details.name);
                    if namespace == Namespace::ServerGroups {
                        details.cluster = Some(moniker.cluster);
                    }
                    details.application = Some(moniker.app);
                }
            }
            _ => return None,
        }

        Some(details)
    }
}

impl std::fmt::Debug for Keys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keys")
            .field("provider", &self.provider)
            .finish_non_exhaustive()
    }
}
