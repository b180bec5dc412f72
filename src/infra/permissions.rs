//! On-disk permission hardening for durable authentication state.
//!
//! The gateway's auth-state file and the machine-token fallback must be
//! readable by the owning user only. POSIX systems get mode bits; Windows
//! gets an ACL rewrite through `icacls`. Hardening failures are returned to
//! the caller, who logs and continues; a file with default permissions is
//! still usable, just not hardened.

use std::io;
use std::path::Path;

/// Restrict a file to owner read/write.
#[cfg(unix)]
pub fn restrict_file(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

/// Restrict a directory to owner read/write/execute.
#[cfg(unix)]
pub fn restrict_dir(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
}

#[cfg(windows)]
pub fn restrict_file(path: &Path) -> io::Result<()> {
    grant_current_user_only(path)
}

#[cfg(windows)]
pub fn restrict_dir(path: &Path) -> io::Result<()> {
    grant_current_user_only(path)
}

/// Strip inherited access entries and grant full control to the current
/// user only.
#[cfg(windows)]
fn grant_current_user_only(path: &Path) -> io::Result<()> {
    use std::process::{Command, Stdio};

    let user = std::env::var("USERNAME")
        .map_err(|_| io::Error::new(io::ErrorKind::NotFound, "USERNAME is not set"))?;

    let status = Command::new("icacls")
        .arg(path)
        .args(["/inheritance:r", "/grant:r"])
        .arg(format!("{user}:(F)"))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()?;

    if !status.success() {
        return Err(io::Error::other(format!("icacls exited with {status}")));
    }

    Ok(())
}

#[cfg(not(any(unix, windows)))]
pub fn restrict_file(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(not(any(unix, windows)))]
pub fn restrict_dir(_path: &Path) -> io::Result<()> {
    Ok(())
}
