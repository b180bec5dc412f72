//! Secrets-manager client with a machine-keyed encrypted local cache.
//!
//! Fetches named secrets from a remote secrets-management provider and
//! exposes them to the host process as environment variables or an
//! in-memory map. Fetched sets are cached for a configurable TTL, sealed
//! at rest under a key derived from the executing machine's identity, and
//! degrade gracefully: unavailable crypto falls back to a plaintext cache
//! tier, a payload that will not open is a cache miss, and a missing OS
//! credential store just means configuration comes from the environment.
//!
//! # Modules
//!
//! - [`session`] — scoped [`VaultSession`]: `get`, `env_load`,
//!   `env_load_all`; teardown on drop.
//! - [`cache`] — TTL cache with encrypted and plaintext tiers.
//! - [`crypto`] — machine identity, PBKDF2 key derivation, AEAD sealing.
//! - [`gateway`] — typed provider port and the HTTP adapter.
//! - [`store`] — OS credential store adapter for bootstrap configuration.
//! - [`config`] — environment/credential-store bootstrap resolution.
//! - [`infra`] — permission hardening for on-disk auth state.
//!
//! # Quick start
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), toru_vault::VaultError> {
//! let session = toru_vault::VaultSession::connect()?;
//!
//! // As a map:
//! let secrets = session.get(None, Some("project-id"), false).await?;
//! let api_key = secrets.get("SERVICE_API_KEY");
//!
//! // Or straight into the environment:
//! session.env_load(None, Some("project-id"), false).await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod cli;
pub mod config;
pub mod crypto;
pub mod env;
pub mod gateway;
pub mod infra;
pub mod logging;
pub mod session;
pub mod store;

pub use config::{ConfigError, VaultConfig};
pub use gateway::{GatewayError, Project, RemoteGateway, SecretMap, SecretsGateway};
pub use session::{VaultError, VaultSession};
pub use store::CredentialStore;
