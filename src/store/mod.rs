//! OS credential store adapter.
//!
//! Persists bootstrap configuration (the state-file path, the organization
//! id) across invocations when the platform keyring is present. Cached
//! secret values never go through here. On hosts without a credential
//! facility (headless Linux without a secret service, stripped
//! containers), every operation degrades silently to absent/no-op and configuration
//! comes from the environment instead.

use keyring::Entry;
use tracing::{debug, warn};

/// Service-name prefix for every entry owned by this crate. The full
/// service name is `<prefix>:<suffix>`, where the suffix is the
/// organization id for per-organization entries and `config` for
/// process-wide bootstrap values.
const SERVICE_PREFIX: &str = "toru-vault";

/// Entry name used only to probe store availability.
const PROBE_KEY: &str = "availability-probe";

pub struct CredentialStore {
    available: bool,
}

impl CredentialStore {
    /// Probe the platform store once. A readable store (even one with no
    /// entry under the probe name) counts as available; a platform error
    /// does not.
    pub fn probe() -> Self {
        let available = match Entry::new(SERVICE_PREFIX, PROBE_KEY) {
            Ok(entry) => match entry.get_password() {
                Ok(_) | Err(keyring::Error::NoEntry) => true,
                Err(e) => {
                    debug!("credential store unavailable: {e}");
                    false
                }
            },
            Err(e) => {
                debug!("credential store unavailable: {e}");
                false
            }
        };

        if !available {
            debug!("credential store disabled, falling back to environment configuration");
        }

        Self { available }
    }

    /// A store that always reports absent.
    pub fn disabled() -> Self {
        Self { available: false }
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn get(&self, suffix: &str, key: &str) -> Option<String> {
        if !self.available {
            return None;
        }

        let entry = Entry::new(&service_name(suffix), key).ok()?;
        match entry.get_password() {
            Ok(value) => Some(value),
            Err(keyring::Error::NoEntry) => None,
            Err(e) => {
                debug!("credential store read failed for '{key}': {e}");
                None
            }
        }
    }

    pub fn set(&self, suffix: &str, key: &str, value: &str) {
        if !self.available {
            return;
        }

        match Entry::new(&service_name(suffix), key) {
            Ok(entry) => {
                if let Err(e) = entry.set_password(value) {
                    warn!("credential store write failed for '{key}': {e}");
                }
            }
            Err(e) => warn!("credential store entry for '{key}' failed: {e}"),
        }
    }

    pub fn delete(&self, suffix: &str, key: &str) {
        if !self.available {
            return;
        }

        if let Ok(entry) = Entry::new(&service_name(suffix), key) {
            match entry.delete_password() {
                Ok(()) | Err(keyring::Error::NoEntry) => {}
                Err(e) => warn!("credential store delete failed for '{key}': {e}"),
            }
        }
    }
}

fn service_name(suffix: &str) -> String {
    format!("{SERVICE_PREFIX}:{suffix}")
}

/// Route keyring calls to the in-memory mock store for the whole test
/// binary. Installed once; later callers share the same store.
#[cfg(test)]
pub(crate) fn use_mock_store() {
    use std::sync::Once;

    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        keyring::set_default_credential_builder(keyring::mock::default_credential_builder());
    });
}
