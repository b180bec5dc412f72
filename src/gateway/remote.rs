//! HTTP adapter for the remote secrets provider.
//!
//! Exchanges the configured access token for a bearer token at the
//! identity endpoint, persists that auth state to the configured state
//! file (owner-only), and talks JSON to the secrets API. The fetch path
//! follows the provider's contract: list the organization's secret ids,
//! fetch the values in one get-by-ids call, filter locally.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{filter_by_project, GatewayError, Project, SecretMap, SecretRecord, SecretsGateway};
use crate::config::VaultConfig;
use crate::infra::permissions;

/// Re-login this close to token expiry.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Durable authentication state, persisted to the configured state file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct AuthState {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl AuthState {
    fn is_fresh(&self) -> bool {
        self.expires_at - Utc::now() > Duration::seconds(EXPIRY_MARGIN_SECS)
    }
}

/// [`SecretsGateway`] implementation over HTTP.
pub struct RemoteGateway {
    http: reqwest::Client,
    config: VaultConfig,
    auth: Mutex<Option<AuthState>>,
}

impl RemoteGateway {
    pub fn new(config: VaultConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            auth: Mutex::new(None),
        }
    }

    /// Bearer token for the next request, logging in when both the cached
    /// and the persisted state are stale.
    async fn bearer(&self) -> Result<String, GatewayError> {
        if let Some(state) = self.auth.lock().clone() {
            if state.is_fresh() {
                return Ok(state.access_token);
            }
        }

        if let Some(state) = read_auth_state(&self.config.state_file) {
            if state.is_fresh() {
                debug!("reusing persisted auth state");
                *self.auth.lock() = Some(state.clone());
                return Ok(state.access_token);
            }
        }

        let state = self.login().await?;
        write_auth_state(&self.config.state_file, &state);
        *self.auth.lock() = Some(state.clone());
        Ok(state.access_token)
    }

    async fn login(&self) -> Result<AuthState, GatewayError> {
        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
            expires_in: i64,
        }

        let url = format!(
            "{}/connect/token",
            self.config.identity_url.trim_end_matches('/')
        );
        let response = self
            .http
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("access_token", self.config.access_token.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(GatewayError::Auth(format!(
                "identity endpoint returned {status}"
            )));
        }

        let token: TokenResponse = response
            .error_for_status()?
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        debug!("authenticated, token valid for {}s", token.expires_in);
        Ok(AuthState {
            access_token: token.access_token,
            expires_at: Utc::now() + Duration::seconds(token.expires_in),
        })
    }

    fn api_base(&self) -> &str {
        self.config.api_url.trim_end_matches('/')
    }
}

#[async_trait]
impl SecretsGateway for RemoteGateway {
    async fn fetch(
        &self,
        organization_id: &str,
        project_id: Option<&str>,
    ) -> Result<SecretMap, GatewayError> {
        #[derive(Deserialize)]
        struct DataResponse {
            data: Vec<SecretRecord>,
        }

        #[derive(Serialize)]
        struct ByIdsRequest<'a> {
            ids: &'a [String],
        }

        let bearer = self.bearer().await?;
        let base = self.api_base();

        let listed: DataResponse = self
            .http
            .get(format!("{base}/organizations/{organization_id}/secrets"))
            .bearer_auth(&bearer)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        let ids: Vec<String> = listed.data.into_iter().map(|record| record.id).collect();
        if ids.is_empty() {
            debug!("organization {organization_id} has no secrets");
            return Ok(SecretMap::new());
        }

        let detailed: DataResponse = self
            .http
            .post(format!("{base}/secrets/get-by-ids"))
            .bearer_auth(&bearer)
            .json(&ByIdsRequest { ids: &ids })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        Ok(filter_by_project(detailed.data, project_id))
    }

    async fn projects(&self, organization_id: &str) -> Result<Vec<Project>, GatewayError> {
        #[derive(Deserialize)]
        struct ProjectsResponse {
            data: Vec<Project>,
        }

        let bearer = self.bearer().await?;
        let response: ProjectsResponse = self
            .http
            .get(format!(
                "{}/organizations/{organization_id}/projects",
                self.api_base()
            ))
            .bearer_auth(&bearer)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        Ok(response.data)
    }
}

fn read_auth_state(path: &Path) -> Option<AuthState> {
    let raw = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&raw).ok()
}

/// Best-effort persistence; a read-only filesystem costs a re-login per
/// process, nothing more.
fn write_auth_state(path: &Path, state: &AuthState) {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            if std::fs::create_dir_all(parent).is_err() {
                warn!("cannot create state dir {}", parent.display());
                return;
            }
            if let Err(e) = permissions::restrict_dir(parent) {
                warn!("could not harden {}: {e}", parent.display());
            }
        }
    }

    let json = match serde_json::to_string(state) {
        Ok(json) => json,
        Err(e) => {
            warn!("could not serialize auth state: {e}");
            return;
        }
    };

    if let Err(e) = std::fs::write(path, json) {
        warn!("could not persist auth state to {}: {e}", path.display());
        return;
    }
    if let Err(e) = permissions::restrict_file(path) {
        warn!("could not harden {}: {e}", path.display());
    }
}
