//! Copying secrets into process environment variables.

use tracing::debug;

use crate::gateway::SecretMap;

/// Assign each secret into the environment. Returns how many were set.
///
/// Without `override_existing`, variables that are already present win,
/// so local overrides beat provider values.
pub fn apply(secrets: &SecretMap, override_existing: bool) -> usize {
    let mut applied = 0;
    for (name, value) in secrets {
        if !override_existing && std::env::var_os(name).is_some() {
            debug!("keeping existing value for {name}");
            continue;
        }
        std::env::set_var(name, value);
        applied += 1;
    }
    applied
}
