//! Bootstrap configuration.
//!
//! Everything the gateway needs before the cache can run. Resolution order
//! per field: credential store (bootstrap keys only) → environment. The
//! four connection values are required; their absence is a configuration
//! error raised before any cache or network activity happens.

use std::path::PathBuf;

use thiserror::Error;

use crate::store::CredentialStore;

pub const ENV_API_URL: &str = "VAULT_API_URL";
pub const ENV_IDENTITY_URL: &str = "VAULT_IDENTITY_URL";
pub const ENV_ACCESS_TOKEN: &str = "VAULT_ACCESS_TOKEN";
pub const ENV_STATE_FILE: &str = "VAULT_STATE_FILE";
pub const ENV_ORGANIZATION_ID: &str = "VAULT_ORGANIZATION_ID";

/// Credential-store service suffix for process-wide bootstrap values.
const STORE_SERVICE: &str = "config";
const STORE_STATE_FILE: &str = "state-file";
const STORE_ORGANIZATION_ID: &str = "organization-id";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is required but not set")]
    Missing(&'static str),
}

/// Bootstrap values for the remote gateway.
#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// Secrets API base URL.
    pub api_url: String,
    /// Identity (token exchange) base URL.
    pub identity_url: String,
    /// Machine access token exchanged for a bearer token at login.
    pub access_token: String,
    /// Durable auth-state file, permission-hardened on write.
    pub state_file: PathBuf,
    /// Default organization; callers may override per request.
    pub organization_id: Option<String>,
}

impl VaultConfig {
    /// Resolve configuration from the credential store and the
    /// environment.
    pub fn load(store: &CredentialStore) -> Result<Self, ConfigError> {
        let state_file = store
            .get(STORE_SERVICE, STORE_STATE_FILE)
            .or_else(|| env_var(ENV_STATE_FILE))
            .ok_or(ConfigError::Missing(ENV_STATE_FILE))?;

        let organization_id = store
            .get(STORE_SERVICE, STORE_ORGANIZATION_ID)
            .or_else(|| env_var(ENV_ORGANIZATION_ID));

        Ok(Self {
            api_url: require_env(ENV_API_URL)?,
            identity_url: require_env(ENV_IDENTITY_URL)?,
            access_token: require_env(ENV_ACCESS_TOKEN)?,
            state_file: PathBuf::from(state_file),
            organization_id,
        })
    }

    /// Persist the values that make sense across invocations. No-op when
    /// the credential store is unavailable.
    pub fn remember(&self, store: &CredentialStore) {
        store.set(
            STORE_SERVICE,
            STORE_STATE_FILE,
            &self.state_file.to_string_lossy(),
        );
        if let Some(org) = &self.organization_id {
            store.set(STORE_SERVICE, STORE_ORGANIZATION_ID, org);
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

fn require_env(name: &'static str) -> Result<String, ConfigError> {
    env_var(name).ok_or(ConfigError::Missing(name))
}
