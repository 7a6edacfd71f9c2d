//! Socket and PID file locations.
//!
//! Several game windows can be automated at once, one daemon per window.
//! Each daemon is an *instance* with its own socket and PID file:
//! `{runtime_dir}/{instance}.sock` and `{runtime_dir}/{instance}.pid`.
//!
//! Runtime directory priority:
//! 1. `HARVESTER_SOCKET_DIR` (explicit override)
//! 2. `XDG_RUNTIME_DIR/harvester`
//! 3. `~/.harvester`
//! 4. `{temp_dir}/harvester`
//!
//! The instance comes from `--instance`, then `HARVESTER_INSTANCE`, then
//! `default`.

use std::env;
use std::path::PathBuf;

use tracing::warn;

const DEFAULT_INSTANCE: &str = "default";

/// Resolved file locations for one daemon instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonPaths {
    pub socket: PathBuf,
    pub pid: PathBuf,
}

impl DaemonPaths {
    /// Resolve paths for `instance`, falling back to the environment.
    pub fn resolve(instance: Option<&str>) -> Self {
        let name = instance
            .map(String::from)
            .or_else(|| non_empty_var("HARVESTER_INSTANCE"))
            .unwrap_or_else(|| DEFAULT_INSTANCE.to_string());
        Self::in_dir(runtime_dir(), &name)
    }

    pub fn in_dir(dir: PathBuf, instance: &str) -> Self {
        let name = instance_file_stem(instance);
        Self {
            socket: dir.join(format!("{}.sock", name)),
            pid: dir.join(format!("{}.pid", name)),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

/// Directory holding sockets and PID files.
pub fn runtime_dir() -> PathBuf {
    if let Some(dir) = non_empty_var("HARVESTER_SOCKET_DIR") {
        return PathBuf::from(dir);
    }
    if let Some(dir) = non_empty_var("XDG_RUNTIME_DIR") {
        return PathBuf::from(dir).join("harvester");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".harvester");
    }
    env::temp_dir().join("harvester")
}

/// Map an instance name to a safe file stem.
///
/// Names must be non-empty ASCII alphanumerics, `-` or `_`, and must not
/// start with `-`. Anything else (path separators, `..`, shell metacharacters)
/// falls back to the default instance.
fn instance_file_stem(name: &str) -> &str {
    let valid = !name.is_empty()
        && !name.starts_with('-')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        name
    } else {
        warn!(
            "Invalid instance name '{}', using '{}'",
            name, DEFAULT_INSTANCE
        );
        DEFAULT_INSTANCE
    }
}

/// Create the runtime directory with owner-only permissions.
pub fn ensure_runtime_dir(dir: &std::path::Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))?;
    }

    Ok(())
}
