//! Machine identity resolution.
//!
//! The cache encryption key is derived from a machine-specific string, so a
//! cache payload copied to another host fails authentication on decrypt.
//! Resolution precedence:
//!
//! 1. a well-known OS machine-id file (`/etc/machine-id`, the dbus copy)
//! 2. a platform hardware UUID probe (`ioreg` on macOS, the `MachineGuid`
//!    registry value on Windows), run with a hard deadline so a wedged
//!    probe falls through instead of hanging the caller
//! 3. hostname plus a random token persisted to an owner-only file in the
//!    system temp directory, generated once and reused across runs
//!
//! When the token file cannot be created (read-only filesystem, permission
//! denied), the token lives in process memory only: identity stays stable
//! within the process but changes on restart, which costs a one-time cache
//! miss per run.

use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::infra::permissions;

/// Fixed name of the persisted fallback token inside the temp directory.
const TOKEN_FILE_NAME: &str = "toru-vault.machine-token";

/// Hard deadline for hardware UUID probes.
const PROBE_DEADLINE: Duration = Duration::from_secs(2);

/// Candidate machine-id files, best first.
const MACHINE_ID_FILES: &[&str] = &["/etc/machine-id", "/var/lib/dbus/machine-id"];

/// Process-lifetime token used when the persisted file is unavailable.
static EPHEMERAL_TOKEN: Lazy<String> = Lazy::new(|| Uuid::new_v4().simple().to_string());

/// Resolves the machine identity string used as key-derivation input.
///
/// Carries the directory for the persisted fallback token so tests can
/// isolate it; production use takes the system temp directory.
#[derive(Debug, Clone)]
pub struct MachineId {
    token_dir: PathBuf,
    pinned: Option<String>,
}

impl MachineId {
    pub fn new() -> Self {
        Self {
            token_dir: std::env::temp_dir(),
            pinned: None,
        }
    }

    /// Use a specific directory for the persisted fallback token.
    pub fn with_token_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            token_dir: dir.into(),
            pinned: None,
        }
    }

    /// Skip resolution entirely and use the given identity. For containers
    /// with no stable machine identity, and for tests.
    pub fn fixed(identity: impl Into<String>) -> Self {
        Self {
            token_dir: std::env::temp_dir(),
            pinned: Some(identity.into()),
        }
    }

    /// Resolve the identity. Never fails: the weakest tier is an
    /// in-process random token.
    pub fn resolve(&self) -> String {
        if let Some(pinned) = &self.pinned {
            return pinned.clone();
        }

        if let Some(id) = machine_id_file() {
            return id;
        }

        if let Some(id) = hardware_uuid() {
            return id;
        }

        self.hostname_with_token()
    }

    fn hostname_with_token(&self) -> String {
        let host = hostname();
        match self.persisted_token() {
            Some(token) => format!("{host}-{token}"),
            None => format!("{host}-{}", EPHEMERAL_TOKEN.as_str()),
        }
    }

    /// Read the persisted token, creating it on first use. Returns `None`
    /// only when the file can neither be read nor written.
    fn persisted_token(&self) -> Option<String> {
        let path = self.token_dir.join(TOKEN_FILE_NAME);

        if let Ok(existing) = std::fs::read_to_string(&path) {
            let token = existing.trim();
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }

        let token = Uuid::new_v4().simple().to_string();
        if let Err(e) = std::fs::write(&path, &token) {
            warn!(
                "cannot persist machine token at {}: {e}; identity will not survive restarts",
                path.display()
            );
            return None;
        }
        if let Err(e) = permissions::restrict_file(&path) {
            warn!("could not harden {}: {e}", path.display());
        }

        Some(token)
    }
}

impl Default for MachineId {
    fn default() -> Self {
        Self::new()
    }
}

/// Tier 1: a machine-id file left by the OS.
fn machine_id_file() -> Option<String> {
    for candidate in MACHINE_ID_FILES {
        if let Ok(content) = std::fs::read_to_string(candidate) {
            let id = content.trim();
            if !id.is_empty() {
                return Some(id.to_string());
            }
        }
    }
    None
}

/// Tier 2: platform hardware UUID.
#[cfg(target_os = "macos")]
fn hardware_uuid() -> Option<String> {
    let output = run_probe("ioreg", &["-rd1", "-c", "IOPlatformExpertDevice"])?;
    let line = output.lines().find(|l| l.contains("IOPlatformUUID"))?;
    let uuid = line.split('"').nth(3)?;
    (!uuid.is_empty()).then(|| uuid.to_string())
}

#[cfg(windows)]
fn hardware_uuid() -> Option<String> {
    let output = run_probe(
        "reg",
        &[
            "query",
            r"HKLM\SOFTWARE\Microsoft\Cryptography",
            "/v",
            "MachineGuid",
        ],
    )?;
    let line = output.lines().find(|l| l.contains("MachineGuid"))?;
    let guid = line.split_whitespace().last()?;
    (!guid.is_empty()).then(|| guid.to_string())
}

#[cfg(not(any(target_os = "macos", windows)))]
fn hardware_uuid() -> Option<String> {
    None
}

/// Best-effort hostname for the tier-3 identity.
fn hostname() -> String {
    for var in ["HOSTNAME", "COMPUTERNAME"] {
        if let Ok(name) = std::env::var(var) {
            if !name.is_empty() {
                return name;
            }
        }
    }

    run_probe("hostname", &[])
        .map(|out| out.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

/// Run a probe command with a hard deadline.
///
/// Stdin is closed so an interactive prompt cannot block, and a child that
/// outlives [`PROBE_DEADLINE`] is killed; the caller falls through to the
/// next identity tier.
fn run_probe(program: &str, args: &[&str]) -> Option<String> {
    use std::io::Read;

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .ok()?;

    let deadline = Instant::now() + PROBE_DEADLINE;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                if !status.success() {
                    debug!("machine probe '{program}' exited with {status}");
                    return None;
                }
                let mut out = String::new();
                child.stdout.take()?.read_to_string(&mut out).ok()?;
                return Some(out);
            }
            Ok(None) => {
                if Instant::now() >= deadline {
                    warn!("machine probe '{program}' exceeded {PROBE_DEADLINE:?}, falling through");
                    let _ = child.kill();
                    let _ = child.wait();
                    return None;
                }
                std::thread::sleep(Duration::from_millis(25));
            }
            Err(e) => {
                debug!("machine probe '{program}' failed: {e}");
                return None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn resolve_is_never_empty() {
        let id = MachineId::new().resolve();
        assert!(!id.is_empty());
    }

    #[test]
    fn pinned_identity_wins() {
        let id = MachineId::fixed("test-machine");
        assert_eq!(id.resolve(), "test-machine");
    }

    #[test]
    fn persisted_token_is_stable_across_resolvers() {
        let dir = TempDir::new().unwrap();

        let first = MachineId::with_token_dir(dir.path()).hostname_with_token();
        let second = MachineId::with_token_dir(dir.path()).hostname_with_token();

        assert_eq!(first, second);
        assert!(dir.path().join(TOKEN_FILE_NAME).exists());
    }

    #[test]
    fn deleting_token_file_changes_identity() {
        let dir = TempDir::new().unwrap();
        let resolver = MachineId::with_token_dir(dir.path());

        let first = resolver.hostname_with_token();
        std::fs::remove_file(dir.path().join(TOKEN_FILE_NAME)).unwrap();
        let second = resolver.hostname_with_token();

        assert_ne!(first, second);
    }

    #[cfg(unix)]
    #[test]
    fn token_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let _ = MachineId::with_token_dir(dir.path()).hostname_with_token();

        let mode = std::fs::metadata(dir.path().join(TOKEN_FILE_NAME))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn unwritable_token_dir_falls_back_to_ephemeral() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("does-not-exist");

        // Two resolvers over the same broken dir share the process token.
        let first = MachineId::with_token_dir(&missing).hostname_with_token();
        let second = MachineId::with_token_dir(&missing).hostname_with_token();

        assert_eq!(first, second);
        assert!(first.contains(EPHEMERAL_TOKEN.as_str()));
    }

    #[cfg(unix)]
    #[test]
    fn hanging_probe_is_abandoned() {
        let start = Instant::now();
        let result = run_probe("sleep", &["30"]);

        assert!(result.is_none());
        assert!(start.elapsed() < PROBE_DEADLINE + Duration::from_secs(2));
    }

    #[cfg(unix)]
    #[test]
    fn failing_probe_returns_none() {
        assert!(run_probe("false", &[]).is_none());
    }

    #[cfg(unix)]
    #[test]
    fn successful_probe_captures_output() {
        let out = run_probe("echo", &["probe-ok"]).unwrap();
        assert_eq!(out.trim(), "probe-ok");
    }
}
