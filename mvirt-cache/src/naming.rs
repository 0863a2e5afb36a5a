//! Naming convention: derives application and cluster labels from names.
//!
//! Resource names follow `app-stack-detail-vNNN`. Everything except the
//! version suffix forms the cluster; the first segment is the application.

use serde::{Deserialize, Serialize};

/// Identity labels derived from a resource name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Moniker {
    pub app: String,
    pub cluster: String,
    pub stack: Option<String>,
    pub detail: Option<String>,
    pub sequence: Option<u32>,
}

/// Derives a [`Moniker`] from a resource name. Must be pure.
pub trait Namer: Send + Sync {
    fn derive(&self, name: &str) -> Moniker;
}

/// The `app-stack-detail-vNNN` convention.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultNamer;

impl DefaultNamer {
    fn split_sequence(name: &str) -> (&str, Option<u32>) {
        let Some((cluster, suffix)) = name.rsplit_once('-') else {
            return (name, None);
        };
        match suffix.strip_prefix('v') {
            Some(digits) if digits.len() >= 3 && digits.chars().all(|c| c.is_ascii_digit()) => {
                (cluster, digits.parse().ok())
            }
            _ => (name, None),
        }
    }
}

impl Namer for DefaultNamer {
    fn derive(&self, name: &str) -> Moniker {
        let (cluster, sequence) = Self::split_sequence(name);

        let mut parts = cluster.splitn(3, '-');
        let app = parts.next().unwrap_or_default().to_string();
        let stack = parts.next().filter(|s| !s.is_empty()).map(String::from);
        let detail = parts.next().filter(|s| !s.is_empty()).map(String::from);

        Moniker {
            app,
            cluster: cluster.to_string(),
            stack,
            detail,
            sequence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_name() {
        let m = DefaultNamer.derive("orders-prod-canary-v003");
        assert_eq!(m.app, "orders");
        assert_eq!(m.cluster, "orders-prod-canary");
        assert_eq!(m.stack.as_deref(), Some("prod"));
        assert_eq!(m.detail.as_deref(), Some("canary"));
        assert_eq!(m.sequence, Some(3));
    }

    #[test]
    fn test_app_only() {
        let m = DefaultNamer.derive("orders");
        assert_eq!(m.app, "orders");
        assert_eq!(m.cluster, "orders");
        assert_eq!(m.stack, None);
        assert_eq!(m.sequence, None);
    }

    #[test]
    fn test_detail_without_stack() {
        let m = DefaultNamer.derive("orders--worker-v010");
        assert_eq!(m.stack, None);
        assert_eq!(m.detail.as_deref(), Some("worker"));
        assert_eq!(m.cluster, "orders--worker");
    }

    #[test]
    fn test_detail_keeps_dashes() {
        let m = DefaultNamer.derive("web-stage-blue-green");
        assert_eq!(m.detail.as_deref(), Some("blue-green"));
        assert_eq!(m.sequence, None);
    }

    #[test]
    fn test_short_version_is_not_a_sequence() {
        let m = DefaultNamer.derive("sg-1");
        assert_eq!(m.app, "sg");
        assert_eq!(m.cluster, "sg-1");
        assert_eq!(m.sequence, None);

        let m = DefaultNamer.derive("api-v1");
        assert_eq!(m.cluster, "api-v1");
    }
}
