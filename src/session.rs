//! Scoped vault session.
//!
//! Owns the cache for its lifetime and guarantees teardown: dropping the
//! session clears every entry and wipes plaintext-tier values, on every
//! exit path. Hold one session for the life of the process (or a narrower
//! scope in tests) instead of sharing global mutable state.

use thiserror::Error;
use tracing::info;

use crate::cache::SecretsCache;
use crate::config::{ConfigError, VaultConfig, ENV_ORGANIZATION_ID};
use crate::crypto::MachineId;
use crate::gateway::{GatewayError, Project, RemoteGateway, SecretMap, SecretsGateway};
use crate::store::CredentialStore;

/// Errors a caller can see.
///
/// Cache and crypto degradations never appear here; only configuration
/// gaps and provider failures interrupt a request.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Provider(#[from] GatewayError),
}

pub struct VaultSession {
    config: VaultConfig,
    gateway: Box<dyn SecretsGateway>,
    cache: SecretsCache,
}

impl VaultSession {
    /// Bootstrap from the environment: probe the credential store, resolve
    /// configuration, and connect the HTTP gateway.
    pub fn connect() -> Result<Self, VaultError> {
        let store = CredentialStore::probe();
        let config = VaultConfig::load(&store)?;
        config.remember(&store);
        let gateway = RemoteGateway::new(config.clone());
        Ok(Self::new(config, Box::new(gateway)))
    }

    pub fn new(config: VaultConfig, gateway: Box<dyn SecretsGateway>) -> Self {
        Self::with_cache(config, gateway, SecretsCache::new(MachineId::new()))
    }

    /// Use a caller-built cache (custom TTL or machine identity source).
    pub fn with_cache(
        config: VaultConfig,
        gateway: Box<dyn SecretsGateway>,
        cache: SecretsCache,
    ) -> Self {
        Self {
            config,
            gateway,
            cache,
        }
    }

    /// Secrets for `(organization, project)`, served from cache while
    /// fresh. `refresh` forces a gateway fetch regardless of entry age.
    ///
    /// The organization falls back to the configured id; having neither is
    /// a configuration error.
    pub async fn get(
        &self,
        organization_id: Option<&str>,
        project_id: Option<&str>,
        refresh: bool,
    ) -> Result<SecretMap, VaultError> {
        let org = self.organization(organization_id)?;
        let secrets = self
            .cache
            .get(self.gateway.as_ref(), org, project_id, refresh)
            .await?;
        Ok(secrets)
    }

    /// Load secrets into the process environment. Returns how many
    /// variables were set; existing variables survive unless
    /// `override_existing`.
    pub async fn env_load(
        &self,
        organization_id: Option<&str>,
        project_id: Option<&str>,
        override_existing: bool,
    ) -> Result<usize, VaultError> {
        let secrets = self.get(organization_id, project_id, false).await?;
        Ok(crate::env::apply(&secrets, override_existing))
    }

    /// Load every project's secrets into the environment. Earlier projects
    /// win collisions unless `override_existing`.
    pub async fn env_load_all(
        &self,
        organization_id: Option<&str>,
        override_existing: bool,
    ) -> Result<usize, VaultError> {
        let org = self.organization(organization_id)?.to_string();
        let projects = self.gateway.projects(&org).await?;
        info!("loading secrets from {} project(s)", projects.len());

        let mut applied = 0;
        for project in &projects {
            let secrets = self
                .cache
                .get(self.gateway.as_ref(), &org, Some(&project.id), false)
                .await?;
            applied += crate::env::apply(&secrets, override_existing);
        }
        Ok(applied)
    }

    /// List the organization's projects.
    pub async fn projects(
        &self,
        organization_id: Option<&str>,
    ) -> Result<Vec<Project>, VaultError> {
        let org = self.organization(organization_id)?;
        Ok(self.gateway.projects(org).await?)
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// Drop all cached entries now. Drop does the same.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    fn organization<'a>(&'a self, explicit: Option<&'a str>) -> Result<&'a str, ConfigError> {
        explicit
            .or(self.config.organization_id.as_deref())
            .ok_or(ConfigError::Missing(ENV_ORGANIZATION_ID))
    }
}

impl Drop for VaultSession {
    fn drop(&mut self) {
        self.cache.clear();
    }
}
