//! Mount helper (sshfs) discovery and invocation building

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::ssh::{AuthMethod, TransferCredentials};

use super::error::MountError;

/// Executable name looked up on `PATH`
pub const HELPER_NAME: &str = "sshfs";

/// Environment variable holding an explicit helper path
pub const HELPER_ENV: &str = "SITEFERRY_SSHFS";

/// Install locations tried after `PATH`
pub const FALLBACK_LOCATIONS: &[&str] = &[
    "/usr/local/bin/sshfs",
    "/opt/homebrew/bin/sshfs",
    "/usr/bin/sshfs",
];

/// Where to look for the helper, in order
#[derive(Debug, Clone, Default)]
pub struct HelperSearch {
    pub override_path: Option<PathBuf>,
    pub path_var: Option<OsString>,
    pub fallbacks: Vec<PathBuf>,
}

impl HelperSearch {
    /// Explicit override (argument, else `SITEFERRY_SSHFS`), then `PATH`, then
    /// the fixed install locations
    pub fn system(override_path: Option<PathBuf>) -> Self {
        let override_path =
            override_path.or_else(|| std::env::var_os(HELPER_ENV).map(PathBuf::from));
        Self {
            override_path,
            path_var: std::env::var_os("PATH"),
            fallbacks: FALLBACK_LOCATIONS.iter().map(PathBuf::from).collect(),
        }
    }

    /// First executable candidate
    pub fn discover(&self) -> Result<PathBuf, MountError> {
        if let Some(explicit) = &self.override_path {
            return if is_executable(explicit) {
                Ok(explicit.clone())
            } else {
                Err(MountError::HelperUnavailable(format!(
                    "{} is not an executable file",
                    explicit.display()
                )))
            };
        }

        let on_path = self
            .path_var
            .as_ref()
            .map(|p| std::env::split_paths(p).map(|dir| dir.join(HELPER_NAME)).collect::<Vec<_>>())
            .unwrap_or_default();

        on_path
            .into_iter()
            .chain(self.fallbacks.iter().cloned())
            .find(|candidate| is_executable(candidate))
            .ok_or_else(|| {
                MountError::HelperUnavailable(format!(
                    "{} not found on PATH or in {}; install it or set {}",
                    HELPER_NAME,
                    FALLBACK_LOCATIONS.join(", "),
                    HELPER_ENV
                ))
            })
    }
}

/// Regular file with at least one execute bit
pub fn is_executable(path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }

    #[cfg(not(unix))]
    {
        true
    }
}

/// A fully built helper command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperInvocation {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl HelperInvocation {
    /// Shell-pasteable rendering, for diagnostics
    pub fn display(&self) -> String {
        std::iter::once(self.program.to_string_lossy().to_string())
            .chain(self.args.iter().cloned())
            .map(|part| {
                if part.is_empty() || part.contains(char::is_whitespace) || part.contains('\'') {
                    format!("'{}'", part.replace('\'', r"'\''"))
                } else {
                    part
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Finder/Explorer label for the mounted volume
pub fn volume_label(domain: &str, remote_path: &str, root: &str) -> String {
    let trimmed = remote_path.trim_end_matches('/');
    let label = if trimmed.is_empty() || trimmed == root.trim_end_matches('/') {
        domain.to_string()
    } else {
        match trimmed.rsplit('/').next() {
            Some(last) if !last.is_empty() => format!("{}-{}", domain, last),
            _ => domain.to_string(),
        }
    };
    // `-o` values are comma separated
    label.replace(',', "_")
}

/// `user@host:remote mountpoint -p port -o ...`
pub fn build_invocation(
    program: &Path,
    credentials: &TransferCredentials,
    remote_path: &str,
    mountpoint: &Path,
    label: &str,
) -> HelperInvocation {
    let mut args = vec![
        format!(
            "{}@{}:{}",
            credentials.username, credentials.host, remote_path
        ),
        mountpoint.to_string_lossy().to_string(),
        "-p".to_string(),
        credentials.port.to_string(),
        "-o".to_string(),
        "reconnect,ServerAliveInterval=15,ServerAliveCountMax=3".to_string(),
        "-o".to_string(),
        "auto_cache,defer_permissions,noappledouble".to_string(),
        "-o".to_string(),
        format!("volname={}", label),
        "-o".to_string(),
        "StrictHostKeyChecking=accept-new".to_string(),
    ];

    if let AuthMethod::Key { key_path, .. } = &credentials.auth {
        args.push("-o".to_string());
        args.push(format!("IdentityFile={}", key_path));
        args.push("-o".to_string());
        args.push("IdentitiesOnly=yes".to_string());
    }

    HelperInvocation {
        program: program.to_path_buf(),
        args,
    }
}
