//! Typed port to the remote secrets provider.
//!
//! The cache depends on this trait, not on an HTTP client, so tests drive
//! it with an in-process fake and the provider SDK's response shapes stay
//! contained in the adapter.

mod remote;

pub use remote::RemoteGateway;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

/// Secret name → value. A `BTreeMap` keeps the JSON form canonical, which
/// the cipher relies on for deterministic serialization.
pub type SecretMap = BTreeMap<String, String>;

/// A project as reported by the provider.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub creation_date: Option<String>,
}

/// A secret record as returned by the provider, before filtering.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretRecord {
    pub id: String,
    pub key: String,
    /// Present only in value-bearing responses (get-by-ids).
    #[serde(default)]
    pub value: Option<String>,
    /// Absent means the secret is unscoped and matches every project.
    #[serde(default)]
    pub project_id: Option<String>,
}

/// Failures at the provider boundary.
///
/// Propagated to callers unchanged; the cache neither retries them nor
/// caches them.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("authentication with the identity endpoint failed: {0}")]
    Auth(String),

    #[error("provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected provider response: {0}")]
    InvalidResponse(String),
}

/// Port to the remote provider.
#[async_trait]
pub trait SecretsGateway: Send + Sync {
    /// Fetch the authoritative secret set for an organization, optionally
    /// filtered to one project.
    async fn fetch(
        &self,
        organization_id: &str,
        project_id: Option<&str>,
    ) -> Result<SecretMap, GatewayError>;

    /// List the organization's projects.
    async fn projects(&self, organization_id: &str) -> Result<Vec<Project>, GatewayError>;
}

/// Reduce provider records to a name → value map, honoring a project
/// filter.
///
/// A record with no project association matches every filter. Tightening
/// this would silently drop provider-side "global" secrets, so the loose
/// behavior is kept deliberately.
pub fn filter_by_project(records: Vec<SecretRecord>, project_id: Option<&str>) -> SecretMap {
    let mut map = SecretMap::new();
    for record in records {
        if let (Some(wanted), Some(scoped)) = (project_id, record.project_id.as_deref()) {
            if wanted != scoped {
                continue;
            }
        }
        if let Some(value) = record.value {
            map.insert(record.key, value);
        }
    }
    map
}
